use crate::{
    Animation, AttachmentData, BoneDef, BoneTimeline, Curve, DrawOrderFrame, DrawOrderTimeline,
    Error, PointAttachmentData, RotateFrame, RotateTimeline, SkeletonTemplate, SlotDef,
};
use std::collections::HashMap;

fn base_template() -> SkeletonTemplate {
    SkeletonTemplate {
        bones: vec![
            BoneDef::with_name("root", None),
            BoneDef::with_name("child", Some(0)),
        ],
        slots: vec![SlotDef {
            name: "body".to_string(),
            bone: 1,
            attachment: None,
            color: [1.0, 1.0, 1.0, 1.0],
            blend: Default::default(),
        }],
        skins: HashMap::new(),
        events: HashMap::new(),
        animations: Vec::new(),
        animation_index: HashMap::new(),
        pages: Vec::new(),
    }
}

#[test]
fn well_formed_template_validates() {
    assert!(base_template().validate().is_ok());
}

#[test]
fn template_without_bones_is_rejected() {
    let mut template = base_template();
    template.bones.clear();
    template.slots.clear();
    assert!(matches!(
        template.validate(),
        Err(Error::InvalidTemplate { .. })
    ));
}

#[test]
fn second_root_is_rejected() {
    let mut template = base_template();
    template.bones.push(BoneDef::with_name("stray", None));
    assert!(matches!(
        template.validate(),
        Err(Error::InvalidTemplate { .. })
    ));
}

#[test]
fn parent_must_precede_child() {
    let mut template = base_template();
    // A forward (or self) parent reference would allow cycles.
    template.bones.push(BoneDef::with_name("a", Some(3)));
    template.bones.push(BoneDef::with_name("b", Some(2)));
    assert!(matches!(
        template.validate(),
        Err(Error::InvalidTemplate { .. })
    ));
}

#[test]
fn slot_bone_reference_must_exist() {
    let mut template = base_template();
    template.slots[0].bone = 9;
    assert!(matches!(
        template.validate(),
        Err(Error::InvalidTemplate { .. })
    ));
}

#[test]
fn animation_bone_indices_are_checked() {
    let mut template = base_template();
    let mut animation = Animation::with_name("wave", 1.0);
    animation.bone_timelines = vec![BoneTimeline::Rotate(RotateTimeline {
        bone_index: 5,
        frames: vec![RotateFrame {
            time: 0.0,
            angle: 0.0,
            curve: Curve::Linear,
        }],
    })];
    template.animation_index.insert("wave".to_string(), 0);
    template.animations.push(animation);
    assert!(matches!(
        template.validate(),
        Err(Error::InvalidTemplate { .. })
    ));
}

#[test]
fn draw_order_frames_must_be_slot_permutations() {
    let mut template = base_template();
    let mut animation = Animation::with_name("shuffle", 1.0);
    animation.draw_order_timeline = Some(DrawOrderTimeline {
        frames: vec![DrawOrderFrame {
            time: 0.0,
            draw_order: Some(vec![0, 1]),
        }],
    });
    template.animation_index.insert("shuffle".to_string(), 0);
    template.animations.push(animation);
    // Two entries for a single slot.
    assert!(matches!(
        template.validate(),
        Err(Error::InvalidTemplate { .. })
    ));
}

#[test]
fn lookups_resolve_by_name() {
    let mut template = base_template();
    let animation = Animation::with_name("idle", 2.0);
    template.animations.push(animation);
    template.animation_index.insert("idle".to_string(), 0);

    assert_eq!(template.bone_index("child"), Some(1));
    assert_eq!(template.bone_index("tail"), None);
    assert_eq!(template.slot_index("body"), Some(0));

    let (index, animation) = template.animation("idle").unwrap();
    assert_eq!(index, 0);
    assert_eq!(animation.duration, 2.0);
    assert!(template.animation("sprint").is_none());
}

#[test]
fn only_region_attachments_are_renderable() {
    let point = AttachmentData::Point(PointAttachmentData {
        name: "muzzle".to_string(),
        x: 1.0,
        y: 2.0,
        rotation: 0.0,
    });
    assert!(!point.is_renderable());
    assert_eq!(point.name(), "muzzle");
}
