//! Bone and slot proxies handed out to the host.
//!
//! Proxies are materialized lazily, live in an arena owned by the instance
//! and are shared with the host through cheap reference-counted handles. A
//! handle stays valid after the owning instance is dropped but reports itself
//! as unbound instead of dangling.

use crate::Error;
use std::cell::RefCell;
use std::rc::Rc;

/// Local bone transform relative to the parent bone.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LocalTransform {
    pub x: f32,
    pub y: f32,
    /// Degrees, counter-clockwise positive.
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
}

impl LocalTransform {
    pub const IDENTITY: LocalTransform = LocalTransform {
        x: 0.0,
        y: 0.0,
        rotation: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
        shear_x: 0.0,
        shear_y: 0.0,
    };
}

/// World affine transform as a 2x3 matrix: `[a b x; c d y]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WorldTransform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub x: f32,
    pub y: f32,
}

impl WorldTransform {
    pub const IDENTITY: WorldTransform = WorldTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        x: 0.0,
        y: 0.0,
    };

    /// Transforms a local point into world space.
    pub fn apply(&self, x: f32, y: f32) -> [f32; 2] {
        [
            self.a * x + self.b * y + self.x,
            self.c * x + self.d * y + self.y,
        ]
    }

    pub fn position(&self) -> [f32; 2] {
        [self.x, self.y]
    }

    /// World rotation of the X axis in degrees.
    pub fn rotation(&self) -> f32 {
        self.c.atan2(self.a).to_degrees()
    }
}

/// Mutable per-instance proxy for one bone.
#[derive(Debug)]
pub struct BoneNode {
    pub(crate) name: String,
    pub(crate) bone_index: usize,
    /// Transform-inheritance link; `None` for the hierarchy root.
    pub(crate) parent: Option<Rc<RefCell<BoneNode>>>,
    pub(crate) local: LocalTransform,
    pub(crate) local_dirty: bool,
    pub(crate) world: WorldTransform,
    pub(crate) flip_x: bool,
    pub(crate) flip_y: bool,
    pub(crate) root: bool,
    pub(crate) bound: bool,
}

/// Shared handle to a [`BoneNode`].
///
/// Cloning is cheap; all clones observe the same node. Every accessor fails
/// with [`Error::UnboundHandle`] once the owning instance has been dropped.
#[derive(Clone, Debug)]
pub struct BoneHandle {
    pub(crate) node: Rc<RefCell<BoneNode>>,
}

impl BoneHandle {
    pub fn name(&self) -> String {
        self.node.borrow().name.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.node.borrow().bound
    }

    pub fn is_root(&self) -> bool {
        self.node.borrow().root
    }

    /// Handle to the parent node this bone inherits its transform from, or
    /// `None` on the hierarchy root.
    pub fn parent(&self) -> Result<Option<BoneHandle>, Error> {
        let node = self.node.borrow();
        if !node.bound {
            return Err(Error::UnboundHandle);
        }
        Ok(node.parent.as_ref().map(|parent| BoneHandle {
            node: Rc::clone(parent),
        }))
    }

    fn with_node<R>(&self, f: impl FnOnce(&mut BoneNode) -> R) -> Result<R, Error> {
        let mut node = self.node.borrow_mut();
        if !node.bound {
            return Err(Error::UnboundHandle);
        }
        Ok(f(&mut node))
    }

    /// Sets the local translation. Takes effect at the next pose application
    /// and invalidates the instance's bounds cache.
    pub fn set_position(&self, x: f32, y: f32) -> Result<(), Error> {
        self.with_node(|node| {
            node.local.x = x;
            node.local.y = y;
            node.local_dirty = true;
        })
    }

    /// Sets the local rotation in degrees, counter-clockwise positive.
    pub fn set_rotation(&self, degrees: f32) -> Result<(), Error> {
        self.with_node(|node| {
            node.local.rotation = degrees;
            node.local_dirty = true;
        })
    }

    pub fn set_scale(&self, scale_x: f32, scale_y: f32) -> Result<(), Error> {
        self.with_node(|node| {
            node.local.scale_x = scale_x;
            node.local.scale_y = scale_y;
            node.local_dirty = true;
        })
    }

    pub fn set_shear(&self, shear_x: f32, shear_y: f32) -> Result<(), Error> {
        self.with_node(|node| {
            node.local.shear_x = shear_x;
            node.local.shear_y = shear_y;
            node.local_dirty = true;
        })
    }

    pub fn local(&self) -> Result<LocalTransform, Error> {
        self.with_node(|node| node.local)
    }

    pub fn world_transform(&self) -> Result<WorldTransform, Error> {
        self.with_node(|node| node.world)
    }

    pub fn world_position(&self) -> Result<[f32; 2], Error> {
        self.with_node(|node| node.world.position())
    }

    /// Current horizontal/vertical flip flags mirrored from the skeleton.
    pub fn flip(&self) -> Result<(bool, bool), Error> {
        self.with_node(|node| (node.flip_x, node.flip_y))
    }
}

/// Mutable per-instance proxy for one slot's tint.
#[derive(Debug)]
pub struct SlotNode {
    pub(crate) name: String,
    pub(crate) slot_index: usize,
    /// Host-bound override; wins over timeline-driven color while set.
    pub(crate) color_override: Option<[f32; 4]>,
    /// Effective tint after the last pose application.
    pub(crate) color: [f32; 4],
    pub(crate) dirty: bool,
    pub(crate) bound: bool,
}

/// Shared handle to a [`SlotNode`].
#[derive(Clone, Debug)]
pub struct SlotHandle {
    pub(crate) node: Rc<RefCell<SlotNode>>,
}

impl SlotHandle {
    pub fn name(&self) -> String {
        self.node.borrow().name.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.node.borrow().bound
    }

    fn with_node<R>(&self, f: impl FnOnce(&mut SlotNode) -> R) -> Result<R, Error> {
        let mut node = self.node.borrow_mut();
        if !node.bound {
            return Err(Error::UnboundHandle);
        }
        Ok(f(&mut node))
    }

    /// Binds a color override that replaces the timeline-driven slot tint
    /// until cleared.
    pub fn set_color(&self, color: [f32; 4]) -> Result<(), Error> {
        self.with_node(|node| {
            node.color_override = Some(color);
            node.color = color;
            node.dirty = true;
        })
    }

    pub fn clear_color(&self) -> Result<(), Error> {
        self.with_node(|node| {
            node.color_override = None;
            node.dirty = true;
        })
    }

    /// Effective slot tint after the last pose application.
    pub fn color(&self) -> Result<[f32; 4], Error> {
        self.with_node(|node| node.color)
    }
}
