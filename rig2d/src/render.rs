//! Drawable quad and bounds derivation.
//!
//! The runtime emits one textured quad per visible region attachment, in draw
//! order, together with a tight axis-aligned bounding box over all emitted
//! geometry. The host forwards quads to its own GPU pipeline; nothing here
//! touches a graphics API.

use crate::{BlendMode, RegionAttachmentData, TextureHandle};
use crate::runtime::BonePose;

/// Axis-aligned bounding box in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    /// The empty box; `union_point` on it starts a fresh accumulation.
    pub const EMPTY: Bounds = Bounds {
        min_x: f32::INFINITY,
        min_y: f32::INFINITY,
        max_x: f32::NEG_INFINITY,
        max_y: f32::NEG_INFINITY,
    };

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn union_point(&mut self, x: f32, y: f32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> f32 {
        if self.is_empty() { 0.0 } else { self.max_x - self.min_x }
    }

    pub fn height(&self) -> f32 {
        if self.is_empty() { 0.0 } else { self.max_y - self.min_y }
    }
}

/// One renderable quad: four world-space corners with matching texture
/// coordinates, a flat tint and the slot's blend mode.
///
/// Corner order is bottom-left, bottom-right, top-right, top-left in the
/// attachment's local frame; flips and negative scales may invert the
/// winding but never reorder the UV pairing.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Quad {
    pub texture: TextureHandle,
    pub vertices: [[f32; 2]; 4],
    pub uvs: [[f32; 2]; 4],
    pub color: [f32; 4],
    pub blend: BlendMode,
}

/// Computes the four world-space corners of a region attachment under the
/// owning bone's current world transform.
pub(crate) fn region_world_vertices(
    region: &RegionAttachmentData,
    bone: &BonePose,
) -> [[f32; 2]; 4] {
    let half_w = region.width * 0.5 * region.scale_x;
    let half_h = region.height * 0.5 * region.scale_y;

    let r = region.rotation.to_radians();
    let cos = r.cos();
    let sin = r.sin();

    // Local corners after the attachment's own offset and rotation:
    // bottom-left, bottom-right, top-right, top-left.
    let local = [
        (-half_w, -half_h),
        (half_w, -half_h),
        (half_w, half_h),
        (-half_w, half_h),
    ];

    local.map(|(lx, ly)| {
        let x = lx * cos - ly * sin + region.x;
        let y = lx * sin + ly * cos + region.y;
        [
            bone.a * x + bone.b * y + bone.world_x,
            bone.c * x + bone.d * y + bone.world_y,
        ]
    })
}

pub(crate) fn multiply_rgba(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [a[0] * b[0], a[1] * b[1], a[2] * b[2], a[3] * b[3]]
}
