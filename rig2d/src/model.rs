//! Immutable skeleton template data.
//!
//! A [`SkeletonTemplate`] is built once from decoded asset data by the host
//! and shared across instances behind an `Arc`. Nothing in here is mutated by
//! the runtime.

use crate::{Error, TextureHandle};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct BoneDef {
    pub name: String,
    /// Index of the parent bone. `None` only for the root at index 0;
    /// parents always precede their children.
    pub parent: Option<usize>,
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
}

impl BoneDef {
    /// A bone at the setup origin with identity scale.
    pub fn with_name(name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent,
            length: 0.0,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
}

#[derive(Clone, Debug)]
pub struct SlotDef {
    pub name: String,
    pub bone: usize,
    /// Setup-pose attachment name, resolved through the active skin.
    pub attachment: Option<String>,
    pub color: [f32; 4],
    pub blend: BlendMode,
}

/// Page of the packed texture atlas an attachment's region lives on.
#[derive(Clone, Debug)]
pub struct TexturePage {
    pub name: String,
    pub texture: TextureHandle,
}

#[derive(Clone, Debug)]
pub struct RegionAttachmentData {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub width: f32,
    pub height: f32,
    /// Texture coordinates per corner, same order as the emitted quad
    /// vertices (bottom-left, bottom-right, top-right, top-left).
    pub uvs: [[f32; 2]; 4],
    /// Index into [`SkeletonTemplate::pages`].
    pub page: usize,
}

#[derive(Clone, Debug)]
pub struct MeshAttachmentData {
    pub name: String,
    pub vertices: Vec<[f32; 2]>,
    pub uvs: Vec<[f32; 2]>,
    pub triangles: Vec<u16>,
    pub page: usize,
}

#[derive(Clone, Debug)]
pub struct BoundingBoxAttachmentData {
    pub name: String,
    pub vertices: Vec<[f32; 2]>,
}

#[derive(Clone, Debug)]
pub struct PointAttachmentData {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

#[derive(Clone, Debug)]
pub struct ClippingAttachmentData {
    pub name: String,
    pub vertices: Vec<[f32; 2]>,
    pub end_slot: Option<usize>,
}

/// Closed set of attachment shapes a slot can hold.
#[derive(Clone, Debug)]
pub enum AttachmentData {
    Region(RegionAttachmentData),
    Mesh(MeshAttachmentData),
    BoundingBox(BoundingBoxAttachmentData),
    Point(PointAttachmentData),
    Clipping(ClippingAttachmentData),
}

impl AttachmentData {
    pub fn name(&self) -> &str {
        match self {
            AttachmentData::Region(a) => a.name.as_str(),
            AttachmentData::Mesh(a) => a.name.as_str(),
            AttachmentData::BoundingBox(a) => a.name.as_str(),
            AttachmentData::Point(a) => a.name.as_str(),
            AttachmentData::Clipping(a) => a.name.as_str(),
        }
    }

    /// Whether the attachment contributes a quad to rendering and bounds.
    pub fn is_renderable(&self) -> bool {
        matches!(self, AttachmentData::Region(_))
    }
}

#[derive(Clone, Debug)]
pub struct SkinData {
    pub name: String,
    /// Attachment name -> data, one map per slot index.
    pub attachments: Vec<HashMap<String, AttachmentData>>,
}

impl SkinData {
    pub fn attachment(&self, slot_index: usize, attachment_name: &str) -> Option<&AttachmentData> {
        self.attachments
            .get(slot_index)
            .and_then(|slot_map| slot_map.get(attachment_name))
    }
}

/// Default payload for a named custom event.
#[derive(Clone, Debug)]
pub struct EventDef {
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: String,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Curve {
    Linear,
    Stepped,
    Bezier { cx1: f32, cy1: f32, cx2: f32, cy2: f32 },
}

/// Rotation keyframe. `angle` is an offset in degrees from the setup rotation.
#[derive(Clone, Debug)]
pub struct RotateFrame {
    pub time: f32,
    pub angle: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct RotateTimeline {
    pub bone_index: usize,
    pub frames: Vec<RotateFrame>,
}

#[derive(Clone, Debug)]
pub struct Vec2Frame {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    pub curve: [Curve; 2],
}

/// Translation offsets from the setup position.
#[derive(Clone, Debug)]
pub struct TranslateTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

/// Scale factors multiplied with the setup scale.
#[derive(Clone, Debug)]
pub struct ScaleTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

/// Shear offsets in degrees from the setup shear.
#[derive(Clone, Debug)]
pub struct ShearTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub enum BoneTimeline {
    Rotate(RotateTimeline),
    Translate(TranslateTimeline),
    Scale(ScaleTimeline),
    Shear(ShearTimeline),
}

impl BoneTimeline {
    pub fn bone_index(&self) -> usize {
        match self {
            BoneTimeline::Rotate(t) => t.bone_index,
            BoneTimeline::Translate(t) => t.bone_index,
            BoneTimeline::Scale(t) => t.bone_index,
            BoneTimeline::Shear(t) => t.bone_index,
        }
    }
}

/// Absolute RGBA keyframe for a slot tint.
#[derive(Clone, Debug)]
pub struct ColorFrame {
    pub time: f32,
    pub color: [f32; 4],
    pub curve: [Curve; 4],
}

#[derive(Clone, Debug)]
pub struct ColorTimeline {
    pub slot_index: usize,
    pub frames: Vec<ColorFrame>,
}

/// Stepped attachment switch; `None` clears the slot.
#[derive(Clone, Debug)]
pub struct AttachmentFrame {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AttachmentTimeline {
    pub slot_index: usize,
    pub frames: Vec<AttachmentFrame>,
}

/// Stepped draw-order switch. `None` restores the setup order; otherwise the
/// value lists the slot index drawn at each position.
#[derive(Clone, Debug)]
pub struct DrawOrderFrame {
    pub time: f32,
    pub draw_order: Option<Vec<usize>>,
}

#[derive(Clone, Debug)]
pub struct DrawOrderTimeline {
    pub frames: Vec<DrawOrderFrame>,
}

/// Custom event key carrying the payload delivered to the host listener.
#[derive(Clone, Debug, PartialEq)]
pub struct EventKey {
    pub time: f32,
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: String,
}

#[derive(Clone, Debug)]
pub struct EventTimeline {
    /// Keys sorted by ascending time.
    pub keys: Vec<EventKey>,
}

#[derive(Clone, Debug)]
pub struct Animation {
    pub name: String,
    pub duration: f32,
    pub bone_timelines: Vec<BoneTimeline>,
    pub slot_color_timelines: Vec<ColorTimeline>,
    pub slot_attachment_timelines: Vec<AttachmentTimeline>,
    pub draw_order_timeline: Option<DrawOrderTimeline>,
    pub event_timeline: Option<EventTimeline>,
}

impl Animation {
    /// An animation with the given name and duration and no timelines.
    pub fn with_name(name: impl Into<String>, duration: f32) -> Self {
        Self {
            name: name.into(),
            duration,
            bone_timelines: Vec::new(),
            slot_color_timelines: Vec::new(),
            slot_attachment_timelines: Vec::new(),
            draw_order_timeline: None,
            event_timeline: None,
        }
    }
}

/// Immutable description of a rigged skeleton: bones, slots, skins,
/// attachments and animations. Shared by reference across instances.
#[derive(Clone, Debug)]
pub struct SkeletonTemplate {
    pub bones: Vec<BoneDef>,
    pub slots: Vec<SlotDef>,
    pub skins: HashMap<String, SkinData>,
    pub events: HashMap<String, EventDef>,
    pub animations: Vec<Animation>,
    pub animation_index: HashMap<String, usize>,
    pub pages: Vec<TexturePage>,
}

impl SkeletonTemplate {
    pub fn animation(&self, name: &str) -> Option<(usize, &Animation)> {
        let index = *self.animation_index.get(name)?;
        Some((index, &self.animations[index]))
    }

    pub fn skin(&self, name: &str) -> Option<&SkinData> {
        self.skins.get(name)
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    /// Checks the structural invariants instances rely on: a single root at
    /// index 0, parents preceding children (which rules out cycles), and all
    /// cross-references in range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.bones.is_empty() {
            return Err(Error::InvalidTemplate {
                message: "template has no bones".to_string(),
            });
        }
        if self.bones[0].parent.is_some() {
            return Err(Error::InvalidTemplate {
                message: format!("bone 0 '{}' must be the root", self.bones[0].name),
            });
        }
        for (i, bone) in self.bones.iter().enumerate().skip(1) {
            match bone.parent {
                None => {
                    return Err(Error::InvalidTemplate {
                        message: format!("bone '{}' is a second root", bone.name),
                    });
                }
                Some(parent) if parent >= i => {
                    return Err(Error::InvalidTemplate {
                        message: format!(
                            "bone '{}' has parent index {parent} that does not precede it",
                            bone.name
                        ),
                    });
                }
                Some(_) => {}
            }
        }

        for slot in &self.slots {
            if slot.bone >= self.bones.len() {
                return Err(Error::InvalidTemplate {
                    message: format!("slot '{}' references bone {}", slot.name, slot.bone),
                });
            }
        }

        for skin in self.skins.values() {
            for slot_map in &skin.attachments {
                for attachment in slot_map.values() {
                    if let AttachmentData::Region(region) = attachment {
                        if region.page >= self.pages.len() {
                            return Err(Error::InvalidTemplate {
                                message: format!(
                                    "attachment '{}' references texture page {}",
                                    region.name, region.page
                                ),
                            });
                        }
                    }
                }
            }
        }

        for animation in &self.animations {
            for timeline in &animation.bone_timelines {
                if timeline.bone_index() >= self.bones.len() {
                    return Err(Error::InvalidTemplate {
                        message: format!(
                            "animation '{}' keys bone {}",
                            animation.name,
                            timeline.bone_index()
                        ),
                    });
                }
            }
            for timeline in &animation.slot_color_timelines {
                if timeline.slot_index >= self.slots.len() {
                    return Err(Error::InvalidTemplate {
                        message: format!(
                            "animation '{}' keys slot {}",
                            animation.name, timeline.slot_index
                        ),
                    });
                }
            }
            for timeline in &animation.slot_attachment_timelines {
                if timeline.slot_index >= self.slots.len() {
                    return Err(Error::InvalidTemplate {
                        message: format!(
                            "animation '{}' keys slot {}",
                            animation.name, timeline.slot_index
                        ),
                    });
                }
            }
            if let Some(timeline) = &animation.draw_order_timeline {
                for frame in &timeline.frames {
                    if let Some(order) = &frame.draw_order {
                        if order.len() != self.slots.len()
                            || order.iter().any(|&s| s >= self.slots.len())
                        {
                            return Err(Error::InvalidTemplate {
                                message: format!(
                                    "animation '{}' has a draw order frame that is not a \
                                     permutation of the slots",
                                    animation.name
                                ),
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
