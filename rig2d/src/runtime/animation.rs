//! Timeline sampling and pose application.
//!
//! Frame lookup is a binary search over times; values between frames follow
//! the frame's curve (linear, stepped or a sampled cubic Bezier). `alpha`
//! blends the sampled target with whatever is already in the pose, which is
//! how track crossfades are realized.

use crate::runtime::Pose;
use crate::{
    Animation, AttachmentTimeline, ColorFrame, ColorTimeline, Curve, DrawOrderTimeline, EventKey,
    EventTimeline, RotateFrame, RotateTimeline, ScaleTimeline, ShearTimeline, TranslateTimeline,
    Vec2Frame,
};

/// Applies every pose-affecting timeline of `animation` at `time`.
///
/// Bone timelines run first, then slot colors, then the stepped attachment
/// and draw-order switches. `alpha` is the blend weight toward the sampled
/// values; 1.0 overwrites the pose.
pub fn apply_animation(animation: &Animation, pose: &mut Pose, time: f32, alpha: f32) {
    for timeline in &animation.bone_timelines {
        match timeline {
            crate::BoneTimeline::Rotate(t) => apply_rotate(t, pose, time, alpha),
            crate::BoneTimeline::Translate(t) => apply_translate(t, pose, time, alpha),
            crate::BoneTimeline::Scale(t) => apply_scale(t, pose, time, alpha),
            crate::BoneTimeline::Shear(t) => apply_shear(t, pose, time, alpha),
        }
    }

    for timeline in &animation.slot_color_timelines {
        apply_slot_color(timeline, pose, time, alpha);
    }

    for timeline in &animation.slot_attachment_timelines {
        apply_attachment(timeline, pose, time);
    }

    if let Some(timeline) = animation.draw_order_timeline.as_ref() {
        apply_draw_order(timeline, pose, time);
    }
}

pub(crate) fn apply_rotate(timeline: &RotateTimeline, pose: &mut Pose, time: f32, alpha: f32) {
    if timeline.frames.is_empty() || time < timeline.frames[0].time {
        return;
    }
    let setup = pose
        .template
        .bones
        .get(timeline.bone_index)
        .map(|b| b.rotation)
        .unwrap_or(0.0);
    let Some(bone) = pose.bones.get_mut(timeline.bone_index) else {
        return;
    };

    let target = setup + sample_rotate(&timeline.frames, time);
    bone.rotation += (target - bone.rotation) * alpha;
}

pub(crate) fn apply_translate(
    timeline: &TranslateTimeline,
    pose: &mut Pose,
    time: f32,
    alpha: f32,
) {
    if timeline.frames.is_empty() || time < timeline.frames[0].time {
        return;
    }
    let setup = pose
        .template
        .bones
        .get(timeline.bone_index)
        .map(|b| (b.x, b.y))
        .unwrap_or((0.0, 0.0));
    let Some(bone) = pose.bones.get_mut(timeline.bone_index) else {
        return;
    };

    let (dx, dy) = sample_vec2(&timeline.frames, time);
    bone.x += (setup.0 + dx - bone.x) * alpha;
    bone.y += (setup.1 + dy - bone.y) * alpha;
}

pub(crate) fn apply_scale(timeline: &ScaleTimeline, pose: &mut Pose, time: f32, alpha: f32) {
    if timeline.frames.is_empty() || time < timeline.frames[0].time {
        return;
    }
    let setup = pose
        .template
        .bones
        .get(timeline.bone_index)
        .map(|b| (b.scale_x, b.scale_y))
        .unwrap_or((1.0, 1.0));
    let Some(bone) = pose.bones.get_mut(timeline.bone_index) else {
        return;
    };

    // Scale frames are factors relative to the setup scale.
    let (fx, fy) = sample_vec2(&timeline.frames, time);
    bone.scale_x += (setup.0 * fx - bone.scale_x) * alpha;
    bone.scale_y += (setup.1 * fy - bone.scale_y) * alpha;
}

pub(crate) fn apply_shear(timeline: &ShearTimeline, pose: &mut Pose, time: f32, alpha: f32) {
    if timeline.frames.is_empty() || time < timeline.frames[0].time {
        return;
    }
    let setup = pose
        .template
        .bones
        .get(timeline.bone_index)
        .map(|b| (b.shear_x, b.shear_y))
        .unwrap_or((0.0, 0.0));
    let Some(bone) = pose.bones.get_mut(timeline.bone_index) else {
        return;
    };

    let (dx, dy) = sample_vec2(&timeline.frames, time);
    bone.shear_x += (setup.0 + dx - bone.shear_x) * alpha;
    bone.shear_y += (setup.1 + dy - bone.shear_y) * alpha;
}

pub(crate) fn apply_slot_color(timeline: &ColorTimeline, pose: &mut Pose, time: f32, alpha: f32) {
    if timeline.frames.is_empty() || time < timeline.frames[0].time {
        return;
    }
    let Some(slot) = pose.slots.get_mut(timeline.slot_index) else {
        return;
    };

    let color = sample_color(&timeline.frames, time);
    for channel in 0..4 {
        slot.color[channel] += (color[channel] - slot.color[channel]) * alpha;
    }
}

/// Attachment switches are discrete; they apply at full strength whenever the
/// owning entry is sampled, regardless of the crossfade weight.
pub(crate) fn apply_attachment(timeline: &AttachmentTimeline, pose: &mut Pose, time: f32) {
    if timeline.frames.is_empty() || time < timeline.frames[0].time {
        return;
    }
    let Some(slot) = pose.slots.get_mut(timeline.slot_index) else {
        return;
    };

    let index = timeline.frames.partition_point(|f| f.time <= time);
    let frame = &timeline.frames[index.saturating_sub(1)];
    slot.attachment = frame.name.clone();
}

pub(crate) fn apply_draw_order(timeline: &DrawOrderTimeline, pose: &mut Pose, time: f32) {
    if timeline.frames.is_empty() || time < timeline.frames[0].time {
        return;
    }

    let index = timeline.frames.partition_point(|f| f.time <= time);
    let frame = &timeline.frames[index.saturating_sub(1)];
    match &frame.draw_order {
        Some(order) => {
            pose.draw_order.clear();
            pose.draw_order.extend_from_slice(order);
        }
        None => {
            pose.draw_order.clear();
            pose.draw_order.extend(0..pose.slots.len());
        }
    }
}

/// Collects event keys with `from < key.time <= to` into `out`, preserving
/// ascending time order. The caller splits wrapped loop intervals into two
/// calls.
pub(crate) fn collect_events(timeline: &EventTimeline, from: f32, to: f32, out: &mut Vec<EventKey>) {
    for key in &timeline.keys {
        if key.time > to {
            break;
        }
        if key.time > from {
            out.push(key.clone());
        }
    }
}

fn sample_rotate(frames: &[RotateFrame], time: f32) -> f32 {
    let index = frames.partition_point(|f| f.time <= time);
    if index == 0 {
        return frames[0].angle;
    }
    if index >= frames.len() {
        return frames[frames.len() - 1].angle;
    }
    let prev = &frames[index - 1];
    let next = &frames[index];
    curve_value(
        prev.curve, time, prev.time, prev.angle, next.time, next.angle,
    )
}

fn sample_vec2(frames: &[Vec2Frame], time: f32) -> (f32, f32) {
    let index = frames.partition_point(|f| f.time <= time);
    if index == 0 {
        let f = &frames[0];
        return (f.x, f.y);
    }
    if index >= frames.len() {
        let f = &frames[frames.len() - 1];
        return (f.x, f.y);
    }
    let prev = &frames[index - 1];
    let next = &frames[index];
    (
        curve_value(prev.curve[0], time, prev.time, prev.x, next.time, next.x),
        curve_value(prev.curve[1], time, prev.time, prev.y, next.time, next.y),
    )
}

fn sample_color(frames: &[ColorFrame], time: f32) -> [f32; 4] {
    let index = frames.partition_point(|f| f.time <= time);
    if index == 0 {
        return frames[0].color;
    }
    if index >= frames.len() {
        return frames[frames.len() - 1].color;
    }
    let prev = &frames[index - 1];
    let next = &frames[index];
    let mut out = [0.0; 4];
    for channel in 0..4 {
        out[channel] = curve_value(
            prev.curve[channel],
            time,
            prev.time,
            prev.color[channel],
            next.time,
            next.color[channel],
        );
    }
    out
}

fn curve_value(curve: Curve, time: f32, time1: f32, value1: f32, time2: f32, value2: f32) -> f32 {
    let denom = time2 - time1;
    if denom.abs() <= 1.0e-12 {
        return value2;
    }

    match curve {
        Curve::Linear => {
            let t = (time - time1) / denom;
            value1 + (value2 - value1) * t
        }
        Curve::Stepped => value1,
        Curve::Bezier { cx1, cy1, cx2, cy2 } => {
            bezier_value(time, time1, value1, cx1, cy1, cx2, cy2, time2, value2)
        }
    }
}

// Forward-difference sampling of the curve into a small lookup table, then
// linear interpolation between table points.
#[allow(clippy::too_many_arguments)]
fn bezier_value(
    time: f32,
    time1: f32,
    value1: f32,
    cx1: f32,
    cy1: f32,
    cx2: f32,
    cy2: f32,
    time2: f32,
    value2: f32,
) -> f32 {
    const BEZIER_SIZE: usize = 18;

    let tmpx = (time1 - cx1 * 2.0 + cx2) * 0.03;
    let tmpy = (value1 - cy1 * 2.0 + cy2) * 0.03;
    let dddx = ((cx1 - cx2) * 3.0 - time1 + time2) * 0.006;
    let dddy = ((cy1 - cy2) * 3.0 - value1 + value2) * 0.006;
    let mut ddx = tmpx * 2.0 + dddx;
    let mut ddy = tmpy * 2.0 + dddy;
    let mut dx = (cx1 - time1) * 0.3 + tmpx + dddx * 0.16666667;
    let mut dy = (cy1 - value1) * 0.3 + tmpy + dddy * 0.16666667;

    let mut x = time1 + dx;
    let mut y = value1 + dy;

    let mut points = [0.0f32; BEZIER_SIZE];
    for i in (0..BEZIER_SIZE).step_by(2) {
        points[i] = x;
        points[i + 1] = y;
        dx += ddx;
        dy += ddy;
        ddx += dddx;
        ddy += dddy;
        x += dx;
        y += dy;
    }

    if points[0] > time {
        let denom = points[0] - time1;
        if denom.abs() <= 1.0e-12 {
            return value1;
        }
        return value1 + (time - time1) / denom * (points[1] - value1);
    }

    for i in (2..BEZIER_SIZE).step_by(2) {
        if points[i] >= time {
            let x = points[i - 2];
            let y = points[i - 1];
            let denom = points[i] - x;
            if denom.abs() <= 1.0e-12 {
                return y;
            }
            return y + (time - x) / denom * (points[i + 1] - y);
        }
    }

    let x = points[BEZIER_SIZE - 2];
    let y = points[BEZIER_SIZE - 1];
    let denom = time2 - x;
    if denom.abs() <= 1.0e-12 {
        return y;
    }
    y + (time - x) / denom * (value2 - y)
}
