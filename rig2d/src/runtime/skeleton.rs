//! Skeleton instance: the live pose and its lifecycle.
//!
//! An instance starts uninitialized, binds a template on `initialize`, and
//! becomes animatable once `attach_animation_mixer` is called. All pose
//! mutation happens synchronously inside `advance` or explicit setters;
//! drawable quads and bounds are derived lazily on query and cached until
//! the pose changes.
//!
//! Conventions: rotations are degrees, counter-clockwise positive. A bone's
//! world transform is its parent's world transform composed with its local
//! transform, root to leaf; the root composes with the instance's own
//! position and flip state.

use crate::runtime::{
    BoneHandle, BoneNode, LocalTransform, MixerData, SlotHandle, SlotNode, TrackEventListener,
    TrackMixer, WorldTransform,
};
use crate::render::{multiply_rgba, region_world_vertices};
use crate::{AttachmentData, BlendMode, Bounds, Error, Quad, SkeletonTemplate};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Live transform state for one bone: the local pose the timelines write to
/// and the derived world matrix.
#[derive(Copy, Clone, Debug)]
pub struct BonePose {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,

    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,
}

/// Live draw state for one slot.
#[derive(Clone, Debug)]
pub struct SlotPose {
    pub attachment: Option<String>,
    pub color: [f32; 4],
    pub blend: BlendMode,
}

/// The working pose: everything the mixer samples into and the renderer
/// reads from.
#[derive(Clone, Debug)]
pub struct Pose {
    pub template: Arc<SkeletonTemplate>,
    pub bones: Vec<BonePose>,
    pub slots: Vec<SlotPose>,
    /// Slot indices in the order they are drawn; a permutation independent
    /// of the bone hierarchy.
    pub draw_order: Vec<usize>,
    pub skin: Option<String>,
    /// Skeleton-level tint multiplied into every quad.
    pub color: [f32; 4],
    pub x: f32,
    pub y: f32,
    pub flip_x: bool,
    pub flip_y: bool,
}

impl Pose {
    pub fn new(template: Arc<SkeletonTemplate>) -> Self {
        let bones = template
            .bones
            .iter()
            .map(|def| BonePose {
                x: def.x,
                y: def.y,
                rotation: def.rotation,
                scale_x: def.scale_x,
                scale_y: def.scale_y,
                shear_x: def.shear_x,
                shear_y: def.shear_y,
                a: 1.0,
                b: 0.0,
                c: 0.0,
                d: 1.0,
                world_x: 0.0,
                world_y: 0.0,
            })
            .collect();
        let slots = template
            .slots
            .iter()
            .map(|def| SlotPose {
                attachment: def.attachment.clone(),
                color: def.color,
                blend: def.blend,
            })
            .collect();
        let draw_order = (0..template.slots.len()).collect();
        Self {
            template,
            bones,
            slots,
            draw_order,
            skin: None,
            color: [1.0, 1.0, 1.0, 1.0],
            x: 0.0,
            y: 0.0,
            flip_x: false,
            flip_y: false,
        }
    }

    pub fn set_bones_to_setup(&mut self) {
        for (i, bone) in self.bones.iter_mut().enumerate() {
            let Some(def) = self.template.bones.get(i) else {
                continue;
            };
            bone.x = def.x;
            bone.y = def.y;
            bone.rotation = def.rotation;
            bone.scale_x = def.scale_x;
            bone.scale_y = def.scale_y;
            bone.shear_x = def.shear_x;
            bone.shear_y = def.shear_y;
        }
    }

    pub fn set_slots_to_setup(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let Some(def) = self.template.slots.get(i) else {
                continue;
            };
            slot.attachment = def.attachment.clone();
            slot.color = def.color;
            slot.blend = def.blend;
        }
        self.draw_order.clear();
        self.draw_order.extend(0..self.slots.len());
    }

    /// Resolves a named attachment for a slot through the active skin, then
    /// the `"default"` skin.
    pub fn resolve_attachment(&self, slot_index: usize, name: &str) -> Option<&AttachmentData> {
        if let Some(skin_name) = self.skin.as_deref() {
            if let Some(attachment) = self
                .template
                .skin(skin_name)
                .and_then(|s| s.attachment(slot_index, name))
            {
                return Some(attachment);
            }
        }
        self.template
            .skin("default")
            .and_then(|s| s.attachment(slot_index, name))
    }

    /// The slot's currently active attachment data, if any.
    pub fn attachment_data(&self, slot_index: usize) -> Option<&AttachmentData> {
        let slot = self.slots.get(slot_index)?;
        let name = slot.attachment.as_deref()?;
        self.resolve_attachment(slot_index, name)
    }

    /// Recomposes every bone's world matrix top-down. Bone order is a valid
    /// evaluation order because parents always precede children.
    pub fn update_world_transforms(&mut self) {
        let scale_x = if self.flip_x { -1.0 } else { 1.0 };
        let scale_y = if self.flip_y { -1.0 } else { 1.0 };

        for index in 0..self.bones.len() {
            let parent = self.template.bones.get(index).and_then(|b| b.parent);
            match parent {
                None => {
                    let x = self.x;
                    let y = self.y;
                    if let Some(bone) = self.bones.get_mut(index) {
                        update_world_transform_root(bone, x, y, scale_x, scale_y);
                    }
                }
                Some(parent_index) => {
                    let parent = match self.bones.get(parent_index) {
                        Some(p) => ParentTransform {
                            a: p.a,
                            b: p.b,
                            c: p.c,
                            d: p.d,
                            world_x: p.world_x,
                            world_y: p.world_y,
                        },
                        None => continue,
                    };
                    if let Some(bone) = self.bones.get_mut(index) {
                        update_world_transform_child(bone, &parent);
                    }
                }
            }
        }
    }
}

struct ParentTransform {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    world_x: f32,
    world_y: f32,
}

fn local_matrix(bone: &BonePose) -> (f32, f32, f32, f32) {
    let rotation_x = (bone.rotation + bone.shear_x).to_radians();
    let rotation_y = (bone.rotation + 90.0 + bone.shear_y).to_radians();
    (
        rotation_x.cos() * bone.scale_x,
        rotation_y.cos() * bone.scale_y,
        rotation_x.sin() * bone.scale_x,
        rotation_y.sin() * bone.scale_y,
    )
}

fn update_world_transform_root(bone: &mut BonePose, x: f32, y: f32, scale_x: f32, scale_y: f32) {
    let (la, lb, lc, ld) = local_matrix(bone);
    bone.a = la * scale_x;
    bone.b = lb * scale_x;
    bone.c = lc * scale_y;
    bone.d = ld * scale_y;
    bone.world_x = bone.x * scale_x + x;
    bone.world_y = bone.y * scale_y + y;
}

fn update_world_transform_child(bone: &mut BonePose, parent: &ParentTransform) {
    bone.world_x = parent.a * bone.x + parent.b * bone.y + parent.world_x;
    bone.world_y = parent.c * bone.x + parent.d * bone.y + parent.world_y;

    let (la, lb, lc, ld) = local_matrix(bone);
    bone.a = parent.a * la + parent.b * lc;
    bone.b = parent.a * lb + parent.b * ld;
    bone.c = parent.c * la + parent.d * lc;
    bone.d = parent.c * lb + parent.d * ld;
}

/// A rigged skeleton instance bound to a shared immutable template.
///
/// See the module docs for the lifecycle. Instances are single-threaded;
/// the template may be shared across threads.
pub struct SkeletonInstance {
    pose: Option<Pose>,
    mixer: Option<TrackMixer>,
    listener: Option<Box<dyn TrackEventListener>>,

    bone_nodes: Vec<Rc<RefCell<BoneNode>>>,
    bone_node_ids: HashMap<String, usize>,
    slot_nodes: Vec<Rc<RefCell<SlotNode>>>,
    slot_node_ids: HashMap<String, usize>,

    /// Instance base tint, multiplied into every quad after the skeleton
    /// and slot tints.
    base_color: [f32; 4],
    time: f32,

    quads: Vec<Option<Quad>>,
    bounds: Bounds,
    bounds_override: Option<Bounds>,
    bounds_dirty: bool,
    pub(crate) rebuild_count: u64,
}

impl SkeletonInstance {
    pub fn new() -> Self {
        Self {
            pose: None,
            mixer: None,
            listener: None,
            bone_nodes: Vec::new(),
            bone_node_ids: HashMap::new(),
            slot_nodes: Vec::new(),
            slot_node_ids: HashMap::new(),
            base_color: [1.0, 1.0, 1.0, 1.0],
            time: 0.0,
            quads: Vec::new(),
            bounds: Bounds::EMPTY,
            bounds_override: None,
            bounds_dirty: false,
            rebuild_count: 0,
        }
    }

    /// Binds a template, allocates the working pose and the quad cache and
    /// resolves the setup pose.
    pub fn initialize(&mut self, template: Arc<SkeletonTemplate>) -> Result<(), Error> {
        if self.pose.is_some() {
            return Err(Error::InvalidValue {
                message: "skeleton instance is already initialized".to_string(),
            });
        }
        template.validate()?;

        let mut pose = Pose::new(template);
        pose.update_world_transforms();
        self.quads = vec![None; pose.slots.len()];
        self.pose = Some(pose);
        self.bounds_dirty = true;
        Ok(())
    }

    /// Attaches an animation track mixer with mixing data derived from the
    /// bound template. Replaces any previously attached mixer.
    pub fn attach_animation_mixer(&mut self) -> Result<(), Error> {
        let Some(pose) = self.pose.as_ref() else {
            log::warn!("skeleton instance not initialized; attach_animation_mixer is a no-op");
            return Err(Error::NotInitialized {
                operation: "attach_animation_mixer",
            });
        };
        if self.mixer.is_some() {
            log::debug!("replacing previously attached animation mixer");
        }
        self.mixer = Some(TrackMixer::new(MixerData::new(pose.template.clone())));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.pose.is_some()
    }

    pub fn has_mixer(&self) -> bool {
        self.mixer.is_some()
    }

    /// Seconds accumulated across all `advance` calls.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn pose(&self) -> Option<&Pose> {
        self.pose.as_ref()
    }

    pub fn mixer(&self) -> Option<&TrackMixer> {
        self.mixer.as_ref()
    }

    pub fn mixer_mut(&mut self) -> Option<&mut TrackMixer> {
        self.mixer.as_mut()
    }

    pub fn set_event_listener<L: TrackEventListener + 'static>(&mut self, listener: L) {
        self.listener = Some(Box::new(listener));
    }

    /// Advances skeleton time, samples and blends all active tracks, pulls
    /// bone proxy overrides into the pose, recomposes world transforms and
    /// delivers queued track events.
    pub fn advance(&mut self, dt: f32) -> Result<(), Error> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(Error::InvalidValue {
                message: format!("advance step must be finite and >= 0, got {dt}"),
            });
        }
        if self.pose.is_none() {
            log::warn!("skeleton instance not initialized; advance is a no-op");
            return Err(Error::NotInitialized {
                operation: "advance",
            });
        }
        if self.mixer.is_none() {
            log::warn!("animation mixer not attached; advance is a no-op");
            return Err(Error::NotInitialized {
                operation: "advance",
            });
        }

        self.time += dt;
        if let (Some(pose), Some(mixer)) = (self.pose.as_mut(), self.mixer.as_mut()) {
            mixer.update(pose, dt);
        }
        self.apply_pose();
        self.bounds_dirty = true;
        self.dispatch_events();
        Ok(())
    }

    /// Applies pending proxy mutations and recomposes world transforms
    /// without advancing animation time. Bone handles observe the result.
    pub fn refresh_pose(&mut self) -> Result<(), Error> {
        if self.pose.is_none() {
            log::warn!("skeleton instance not initialized; refresh_pose is a no-op");
            return Err(Error::NotInitialized {
                operation: "refresh_pose",
            });
        }
        if self.has_dirty_nodes() {
            self.bounds_dirty = true;
        }
        self.apply_pose();
        Ok(())
    }

    pub fn set_animation(
        &mut self,
        track: usize,
        name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<(), Error> {
        let Some(mixer) = self.mixer.as_mut() else {
            log::warn!("animation mixer not attached; set_animation is a no-op");
            return Err(Error::NotInitialized {
                operation: "set_animation",
            });
        };
        mixer.set_animation(track, name, looped, delay)?;
        self.dispatch_events();
        Ok(())
    }

    pub fn add_animation(
        &mut self,
        track: usize,
        name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<(), Error> {
        let Some(mixer) = self.mixer.as_mut() else {
            log::warn!("animation mixer not attached; add_animation is a no-op");
            return Err(Error::NotInitialized {
                operation: "add_animation",
            });
        };
        mixer.add_animation(track, name, looped, delay)
    }

    /// Registers the crossfade duration used whenever `to` follows `from`
    /// on the same track.
    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        let Some(mixer) = self.mixer.as_mut() else {
            log::warn!("animation mixer not attached; set_mix is a no-op");
            return Err(Error::NotInitialized {
                operation: "set_mix",
            });
        };
        mixer.set_mix(from, to, duration)
    }

    pub fn set_default_mix(&mut self, duration: f32) -> Result<(), Error> {
        let Some(mixer) = self.mixer.as_mut() else {
            log::warn!("animation mixer not attached; set_default_mix is a no-op");
            return Err(Error::NotInitialized {
                operation: "set_default_mix",
            });
        };
        mixer.data_mut().set_default_mix(duration)
    }

    pub fn clear_track(&mut self, track: usize) -> Result<(), Error> {
        let Some(mixer) = self.mixer.as_mut() else {
            log::warn!("animation mixer not attached; clear_track is a no-op");
            return Err(Error::NotInitialized {
                operation: "clear_track",
            });
        };
        mixer.clear_track(track);
        self.dispatch_events();
        Ok(())
    }

    pub fn clear_all_tracks(&mut self) -> Result<(), Error> {
        let Some(mixer) = self.mixer.as_mut() else {
            log::warn!("animation mixer not attached; clear_all_tracks is a no-op");
            return Err(Error::NotInitialized {
                operation: "clear_all_tracks",
            });
        };
        mixer.clear_all_tracks();
        self.dispatch_events();
        Ok(())
    }

    /// Returns a shared handle to the named bone, materializing the proxy
    /// hierarchy from that bone up to the root on first query.
    pub fn get_bone(&mut self, name: &str) -> Result<BoneHandle, Error> {
        let Some(pose) = self.pose.as_ref() else {
            log::warn!("skeleton instance not initialized; get_bone is a no-op");
            return Err(Error::NotInitialized {
                operation: "get_bone",
            });
        };
        if let Some(node) = self
            .bone_node_ids
            .get(name)
            .and_then(|&id| self.bone_nodes.get(id))
        {
            return Ok(BoneHandle {
                node: Rc::clone(node),
            });
        }
        let Some(bone_index) = pose.template.bone_index(name) else {
            return Err(Error::UnknownBone {
                name: name.to_string(),
            });
        };

        // Walk from the queried bone to the root, creating every missing
        // node. Existing ancestors are reused, never duplicated.
        let mut chain = Vec::new();
        let mut cursor = Some(bone_index);
        while let Some(index) = cursor {
            chain.push(index);
            cursor = pose.template.bones.get(index).and_then(|b| b.parent);
        }
        for &index in &chain {
            let Some(def) = pose.template.bones.get(index) else {
                continue;
            };
            if self.bone_node_ids.contains_key(&def.name) {
                continue;
            }
            let bone = pose.bones.get(index);
            let node = BoneNode {
                name: def.name.clone(),
                bone_index: index,
                parent: None,
                local: bone.map_or(LocalTransform::IDENTITY, |b| LocalTransform {
                    x: b.x,
                    y: b.y,
                    rotation: b.rotation,
                    scale_x: b.scale_x,
                    scale_y: b.scale_y,
                    shear_x: b.shear_x,
                    shear_y: b.shear_y,
                }),
                local_dirty: false,
                world: bone.map_or(WorldTransform::IDENTITY, |b| WorldTransform {
                    a: b.a,
                    b: b.b,
                    c: b.c,
                    d: b.d,
                    x: b.world_x,
                    y: b.world_y,
                }),
                flip_x: pose.flip_x,
                flip_y: pose.flip_y,
                root: def.parent.is_none(),
                bound: true,
            };
            let id = self.bone_nodes.len();
            self.bone_nodes.push(Rc::new(RefCell::new(node)));
            self.bone_node_ids.insert(def.name.clone(), id);
        }
        // Second pass: attach parent links, from the queried bone upward.
        for &index in &chain {
            let Some(def) = pose.template.bones.get(index) else {
                continue;
            };
            let Some(parent_index) = def.parent else {
                continue;
            };
            let parent_node = pose
                .template
                .bones
                .get(parent_index)
                .and_then(|p| self.bone_node_ids.get(p.name.as_str()))
                .and_then(|&id| self.bone_nodes.get(id))
                .map(Rc::clone);
            let node = self
                .bone_node_ids
                .get(def.name.as_str())
                .and_then(|&id| self.bone_nodes.get(id));
            if let (Some(node), Some(parent_node)) = (node, parent_node) {
                node.borrow_mut().parent = Some(parent_node);
            }
        }
        log::debug!("materialized bone proxy hierarchy for '{name}'");

        self.bone_node_ids
            .get(name)
            .and_then(|&id| self.bone_nodes.get(id))
            .map(|node| BoneHandle {
                node: Rc::clone(node),
            })
            .ok_or_else(|| Error::UnknownBone {
                name: name.to_string(),
            })
    }

    /// Returns a shared handle to the named slot's tint, created lazily on
    /// first query.
    pub fn get_slot(&mut self, name: &str) -> Result<SlotHandle, Error> {
        let Some(pose) = self.pose.as_ref() else {
            log::warn!("skeleton instance not initialized; get_slot is a no-op");
            return Err(Error::NotInitialized {
                operation: "get_slot",
            });
        };
        if let Some(node) = self
            .slot_node_ids
            .get(name)
            .and_then(|&id| self.slot_nodes.get(id))
        {
            return Ok(SlotHandle {
                node: Rc::clone(node),
            });
        }
        let Some(slot_index) = pose.template.slot_index(name) else {
            return Err(Error::UnknownSlot {
                name: name.to_string(),
            });
        };

        let color = pose
            .slots
            .get(slot_index)
            .map_or([1.0, 1.0, 1.0, 1.0], |s| s.color);
        let node = Rc::new(RefCell::new(SlotNode {
            name: name.to_string(),
            slot_index,
            color_override: None,
            color,
            dirty: false,
            bound: true,
        }));
        let id = self.slot_nodes.len();
        self.slot_nodes.push(Rc::clone(&node));
        self.slot_node_ids.insert(name.to_string(), id);
        Ok(SlotHandle { node })
    }

    /// Switches the active skin and re-resolves slot attachments from the
    /// setup pose.
    pub fn set_skin(&mut self, name: &str) -> Result<(), Error> {
        let Some(pose) = self.pose.as_mut() else {
            log::warn!("skeleton instance not initialized; set_skin is a no-op");
            return Err(Error::NotInitialized {
                operation: "set_skin",
            });
        };
        if !pose.template.skins.contains_key(name) {
            return Err(Error::UnknownSkin {
                name: name.to_string(),
            });
        }
        pose.skin = Some(name.to_string());
        pose.set_slots_to_setup();
        self.apply_pose();
        self.bounds_dirty = true;
        Ok(())
    }

    /// Sets or clears a slot's active attachment. Returns false (with a
    /// diagnostic, keeping the previous attachment) when the slot or the
    /// named attachment does not exist.
    pub fn set_attachment(&mut self, slot_name: &str, attachment_name: Option<&str>) -> bool {
        let Some(pose) = self.pose.as_mut() else {
            log::warn!("skeleton instance not initialized; set_attachment is a no-op");
            return false;
        };
        let Some(slot_index) = pose.template.slot_index(slot_name) else {
            log::warn!("set_attachment: unknown slot '{slot_name}'");
            return false;
        };
        match attachment_name {
            None => {
                if let Some(slot) = pose.slots.get_mut(slot_index) {
                    slot.attachment = None;
                }
            }
            Some(name) => {
                if pose.resolve_attachment(slot_index, name).is_none() {
                    log::warn!("set_attachment: unknown attachment '{name}' for slot '{slot_name}'");
                    return false;
                }
                if let Some(slot) = pose.slots.get_mut(slot_index) {
                    slot.attachment = Some(name.to_string());
                }
            }
        }
        self.bounds_dirty = true;
        true
    }

    pub fn set_to_setup_pose(&mut self) -> Result<(), Error> {
        self.set_bones_to_setup_pose()?;
        self.set_slots_to_setup_pose()
    }

    pub fn set_bones_to_setup_pose(&mut self) -> Result<(), Error> {
        let Some(pose) = self.pose.as_mut() else {
            log::warn!("skeleton instance not initialized; set_bones_to_setup_pose is a no-op");
            return Err(Error::NotInitialized {
                operation: "set_bones_to_setup_pose",
            });
        };
        pose.set_bones_to_setup();
        // The reset wins over pending proxy mutations.
        for node in &self.bone_nodes {
            node.borrow_mut().local_dirty = false;
        }
        self.apply_pose();
        self.bounds_dirty = true;
        Ok(())
    }

    pub fn set_slots_to_setup_pose(&mut self) -> Result<(), Error> {
        let Some(pose) = self.pose.as_mut() else {
            log::warn!("skeleton instance not initialized; set_slots_to_setup_pose is a no-op");
            return Err(Error::NotInitialized {
                operation: "set_slots_to_setup_pose",
            });
        };
        pose.set_slots_to_setup();
        self.apply_pose();
        self.bounds_dirty = true;
        Ok(())
    }

    /// Mirrors the axes of the whole skeleton. Every materialized bone proxy
    /// observes the new flip state; proxies created later inherit it.
    pub fn set_flip(&mut self, flip_x: bool, flip_y: bool) -> Result<(), Error> {
        let Some(pose) = self.pose.as_mut() else {
            log::warn!("skeleton instance not initialized; set_flip is a no-op");
            return Err(Error::NotInitialized {
                operation: "set_flip",
            });
        };
        pose.flip_x = flip_x;
        pose.flip_y = flip_y;
        for node in &self.bone_nodes {
            let mut node = node.borrow_mut();
            node.flip_x = flip_x;
            node.flip_y = flip_y;
        }
        self.apply_pose();
        self.bounds_dirty = true;
        Ok(())
    }

    /// Places the skeleton in the host's world; the root bone composes with
    /// this position.
    pub fn set_position(&mut self, x: f32, y: f32) -> Result<(), Error> {
        let Some(pose) = self.pose.as_mut() else {
            log::warn!("skeleton instance not initialized; set_position is a no-op");
            return Err(Error::NotInitialized {
                operation: "set_position",
            });
        };
        pose.x = x;
        pose.y = y;
        self.apply_pose();
        self.bounds_dirty = true;
        Ok(())
    }

    /// Skeleton-level tint.
    pub fn set_color(&mut self, color: [f32; 4]) -> Result<(), Error> {
        let Some(pose) = self.pose.as_mut() else {
            log::warn!("skeleton instance not initialized; set_color is a no-op");
            return Err(Error::NotInitialized {
                operation: "set_color",
            });
        };
        pose.color = color;
        self.bounds_dirty = true;
        Ok(())
    }

    /// Instance base tint, multiplied into quads after skeleton and slot
    /// tints.
    pub fn set_base_color(&mut self, color: [f32; 4]) {
        self.base_color = color;
        self.bounds_dirty = true;
    }

    /// Fixed box returned by `bounds` instead of accumulating quad corners.
    pub fn set_bounds_override(&mut self, bounds: Option<Bounds>) {
        self.bounds_override = bounds;
    }

    /// The tight axis-aligned box over all drawable quads for the current
    /// pose, or the override if one is set. Cached until the pose changes.
    pub fn bounds(&mut self) -> Result<Bounds, Error> {
        if self.pose.is_none() {
            log::warn!("skeleton instance not initialized; bounds is a no-op");
            return Err(Error::NotInitialized { operation: "bounds" });
        }
        if let Some(bounds) = self.bounds_override {
            return Ok(bounds);
        }
        self.refresh_cache();
        Ok(self.bounds)
    }

    /// The drawable quads for the current pose in draw order. Cached until
    /// the pose changes.
    pub fn drawable_quads(&mut self) -> Result<Vec<Quad>, Error> {
        if self.pose.is_none() {
            log::warn!("skeleton instance not initialized; drawable_quads is a no-op");
            return Err(Error::NotInitialized {
                operation: "drawable_quads",
            });
        }
        self.refresh_cache();
        Ok(self.quads.iter().flatten().copied().collect())
    }

    fn dispatch_events(&mut self) {
        let Some(mixer) = self.mixer.as_mut() else {
            return;
        };
        let events = mixer.drain_events();
        if events.is_empty() {
            return;
        }
        // Mixer state is fully committed before the listener runs.
        if let Some(listener) = self.listener.as_mut() {
            for event in &events {
                listener.on_track_event(event);
            }
        }
    }

    /// Pulls pending proxy overrides into the pose, recomposes world
    /// transforms and mirrors the result back into every materialized proxy.
    fn apply_pose(&mut self) {
        let Some(pose) = self.pose.as_mut() else {
            return;
        };
        for node in &self.bone_nodes {
            let mut node = node.borrow_mut();
            if !node.local_dirty {
                continue;
            }
            node.local_dirty = false;
            if let Some(bone) = pose.bones.get_mut(node.bone_index) {
                bone.x = node.local.x;
                bone.y = node.local.y;
                bone.rotation = node.local.rotation;
                bone.scale_x = node.local.scale_x;
                bone.scale_y = node.local.scale_y;
                bone.shear_x = node.local.shear_x;
                bone.shear_y = node.local.shear_y;
            }
        }

        pose.update_world_transforms();

        for node in &self.bone_nodes {
            let mut node = node.borrow_mut();
            if let Some(bone) = pose.bones.get(node.bone_index) {
                node.local = LocalTransform {
                    x: bone.x,
                    y: bone.y,
                    rotation: bone.rotation,
                    scale_x: bone.scale_x,
                    scale_y: bone.scale_y,
                    shear_x: bone.shear_x,
                    shear_y: bone.shear_y,
                };
                node.world = WorldTransform {
                    a: bone.a,
                    b: bone.b,
                    c: bone.c,
                    d: bone.d,
                    x: bone.world_x,
                    y: bone.world_y,
                };
            }
        }
        for node in &self.slot_nodes {
            let mut node = node.borrow_mut();
            node.dirty = false;
            if let Some(slot) = pose.slots.get(node.slot_index) {
                node.color = node.color_override.unwrap_or(slot.color);
            }
        }
    }

    fn has_dirty_nodes(&self) -> bool {
        self.bone_nodes.iter().any(|node| node.borrow().local_dirty)
            || self.slot_nodes.iter().any(|node| node.borrow().dirty)
    }

    fn refresh_cache(&mut self) {
        if self.has_dirty_nodes() {
            self.apply_pose();
            self.bounds_dirty = true;
        }
        if !self.bounds_dirty {
            return;
        }
        self.rebuild_quads_and_bounds();
    }

    fn rebuild_quads_and_bounds(&mut self) {
        let Some(pose) = self.pose.as_ref() else {
            return;
        };

        let mut quads: Vec<Option<Quad>> = vec![None; pose.draw_order.len()];
        let mut bounds = Bounds::EMPTY;

        for (position, &slot_index) in pose.draw_order.iter().enumerate() {
            let Some(slot) = pose.slots.get(slot_index) else {
                continue;
            };
            // Only region attachments are drawable; everything else is
            // skipped for both rendering and bounds.
            let Some(AttachmentData::Region(region)) = pose.attachment_data(slot_index) else {
                continue;
            };
            let Some(bone) = pose
                .template
                .slots
                .get(slot_index)
                .and_then(|def| pose.bones.get(def.bone))
            else {
                continue;
            };
            let Some(texture) = pose.template.pages.get(region.page).map(|p| p.texture) else {
                continue;
            };

            let slot_color = self.slot_override_color(slot_index).unwrap_or(slot.color);
            let color = multiply_rgba(multiply_rgba(pose.color, slot_color), self.base_color);
            let vertices = region_world_vertices(region, bone);
            for vertex in &vertices {
                bounds.union_point(vertex[0], vertex[1]);
            }
            quads[position] = Some(Quad {
                texture,
                vertices,
                uvs: region.uvs,
                color,
                blend: slot.blend,
            });
        }

        self.quads = quads;
        self.bounds = bounds;
        self.bounds_dirty = false;
        self.rebuild_count += 1;
        log::debug!("rebuilt quad and bounds cache (revision {})", self.rebuild_count);
    }

    fn slot_override_color(&self, slot_index: usize) -> Option<[f32; 4]> {
        self.slot_nodes.iter().find_map(|node| {
            let node = node.borrow();
            if node.slot_index == slot_index {
                node.color_override
            } else {
                None
            }
        })
    }
}

impl Default for SkeletonInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SkeletonInstance {
    fn drop(&mut self) {
        // Handles held by the host outlive the instance but must observe
        // themselves as unbound, never dangle.
        for node in &self.bone_nodes {
            node.borrow_mut().bound = false;
        }
        for node in &self.slot_nodes {
            node.borrow_mut().bound = false;
        }
    }
}

impl std::fmt::Debug for SkeletonInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkeletonInstance")
            .field("initialized", &self.pose.is_some())
            .field("mixer", &self.mixer.is_some())
            .field("bone_nodes", &self.bone_nodes.len())
            .field("slot_nodes", &self.slot_nodes.len())
            .field("time", &self.time)
            .finish()
    }
}
