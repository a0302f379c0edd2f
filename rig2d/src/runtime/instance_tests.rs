use crate::{
    AttachmentData, BoneDef, BoundingBoxAttachmentData, Error, RegionAttachmentData,
    SkeletonInstance, SkeletonTemplate, SkinData, SlotDef, TextureHandle, TexturePage,
};
use std::collections::HashMap;
use std::sync::Arc;

fn region(name: &str, size: f32) -> AttachmentData {
    AttachmentData::Region(RegionAttachmentData {
        name: name.to_string(),
        x: 0.0,
        y: 0.0,
        rotation: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
        width: size,
        height: size,
        uvs: [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]],
        page: 0,
    })
}

/// One bone, one slot. The default skin carries a 2x2 "blob"; the "alt"
/// skin carries a 4x4 "blob" plus a "spike" only it knows about.
fn template() -> Arc<SkeletonTemplate> {
    let mut default_attachments = HashMap::new();
    default_attachments.insert("blob".to_string(), region("blob", 2.0));

    let mut alt_attachments = HashMap::new();
    alt_attachments.insert("blob".to_string(), region("blob", 4.0));
    alt_attachments.insert("spike".to_string(), region("spike", 1.0));

    let mut skins = HashMap::new();
    skins.insert(
        "default".to_string(),
        SkinData {
            name: "default".to_string(),
            attachments: vec![default_attachments],
        },
    );
    skins.insert(
        "alt".to_string(),
        SkinData {
            name: "alt".to_string(),
            attachments: vec![alt_attachments],
        },
    );

    Arc::new(SkeletonTemplate {
        bones: vec![BoneDef::with_name("root", None)],
        slots: vec![SlotDef {
            name: "body".to_string(),
            bone: 0,
            attachment: Some("blob".to_string()),
            color: [1.0, 1.0, 1.0, 1.0],
            blend: Default::default(),
        }],
        skins,
        events: HashMap::new(),
        animations: Vec::new(),
        animation_index: HashMap::new(),
        pages: vec![TexturePage {
            name: "page0".to_string(),
            texture: TextureHandle(7),
        }],
    })
}

fn initialized_instance() -> SkeletonInstance {
    let mut instance = SkeletonInstance::new();
    instance.initialize(template()).unwrap();
    instance
}

#[test]
fn uninitialized_operations_are_noops_with_errors() {
    let mut instance = SkeletonInstance::new();
    assert!(!instance.is_initialized());

    assert!(matches!(
        instance.get_bone("root"),
        Err(Error::NotInitialized { .. })
    ));
    assert!(matches!(
        instance.get_slot("body"),
        Err(Error::NotInitialized { .. })
    ));
    assert!(matches!(
        instance.advance(0.1),
        Err(Error::NotInitialized { .. })
    ));
    assert!(matches!(
        instance.bounds(),
        Err(Error::NotInitialized { .. })
    ));
    assert!(matches!(
        instance.set_skin("alt"),
        Err(Error::NotInitialized { .. })
    ));
    assert!(matches!(
        instance.set_to_setup_pose(),
        Err(Error::NotInitialized { .. })
    ));
    assert!(!instance.set_attachment("body", Some("blob")));
}

#[test]
fn initialize_twice_fails() {
    let mut instance = initialized_instance();
    assert!(matches!(
        instance.initialize(template()),
        Err(Error::InvalidValue { .. })
    ));
}

#[test]
fn initialize_rejects_a_malformed_template() {
    let template = Arc::new(SkeletonTemplate {
        bones: vec![
            BoneDef::with_name("root", None),
            BoneDef::with_name("loose", None),
        ],
        slots: Vec::new(),
        skins: HashMap::new(),
        events: HashMap::new(),
        animations: Vec::new(),
        animation_index: HashMap::new(),
        pages: Vec::new(),
    });

    let mut instance = SkeletonInstance::new();
    assert!(matches!(
        instance.initialize(template),
        Err(Error::InvalidTemplate { .. })
    ));
    assert!(!instance.is_initialized());
}

#[test]
fn playback_operations_require_an_attached_mixer() {
    let mut instance = initialized_instance();
    assert!(!instance.has_mixer());

    assert!(matches!(
        instance.advance(0.1),
        Err(Error::NotInitialized { .. })
    ));
    assert!(matches!(
        instance.set_animation(0, "walk", false, 0.0),
        Err(Error::NotInitialized { .. })
    ));
    assert!(matches!(
        instance.clear_all_tracks(),
        Err(Error::NotInitialized { .. })
    ));

    // Pose and proxy queries work without a mixer.
    assert!(instance.get_bone("root").is_ok());
    assert!(instance.set_to_setup_pose().is_ok());

    instance.attach_animation_mixer().unwrap();
    assert!(instance.has_mixer());
    instance.advance(0.1).unwrap();
    assert!((instance.time() - 0.1).abs() <= 1.0e-6);
}

#[test]
fn advance_rejects_negative_or_non_finite_steps() {
    let mut instance = initialized_instance();
    instance.attach_animation_mixer().unwrap();
    assert!(matches!(
        instance.advance(-0.1),
        Err(Error::InvalidValue { .. })
    ));
    assert!(matches!(
        instance.advance(f32::NAN),
        Err(Error::InvalidValue { .. })
    ));
}

#[test]
fn set_skin_switches_attachment_resolution() {
    let mut instance = initialized_instance();

    let width_of_active = |instance: &SkeletonInstance| {
        match instance.pose().unwrap().attachment_data(0) {
            Some(AttachmentData::Region(region)) => region.width,
            other => panic!("expected a region attachment, got {other:?}"),
        }
    };

    assert_eq!(width_of_active(&instance), 2.0);

    instance.set_skin("alt").unwrap();
    assert_eq!(width_of_active(&instance), 4.0);

    assert!(matches!(
        instance.set_skin("winter"),
        Err(Error::UnknownSkin { .. })
    ));
}

#[test]
fn set_attachment_validates_against_the_template() {
    let mut instance = initialized_instance();

    // "spike" only exists in the "alt" skin; with no skin active the lookup
    // falls back to "default" and fails, keeping the previous attachment.
    assert!(!instance.set_attachment("body", Some("spike")));
    assert_eq!(
        instance.pose().unwrap().slots[0].attachment.as_deref(),
        Some("blob")
    );

    instance.set_skin("alt").unwrap();
    assert!(instance.set_attachment("body", Some("spike")));
    assert_eq!(
        instance.pose().unwrap().slots[0].attachment.as_deref(),
        Some("spike")
    );

    assert!(!instance.set_attachment("tail", Some("blob")));

    // Clearing is always valid.
    assert!(instance.set_attachment("body", None));
    assert!(instance.pose().unwrap().slots[0].attachment.is_none());
}

#[test]
fn slot_handles_are_lazy_idempotent_and_unbind_on_drop() {
    let handle = {
        let mut instance = initialized_instance();
        assert!(matches!(
            instance.get_slot("tail"),
            Err(Error::UnknownSlot { .. })
        ));

        let a = instance.get_slot("body").unwrap();
        let b = instance.get_slot("body").unwrap();
        assert!(std::rc::Rc::ptr_eq(&a.node, &b.node));

        a.set_color([1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(a.color().unwrap(), [1.0, 0.0, 0.0, 1.0]);
        a
    };

    assert!(!handle.is_bound());
    assert!(matches!(
        handle.set_color([0.0; 4]),
        Err(Error::UnboundHandle)
    ));
}

#[test]
fn setup_pose_reset_overrides_pending_proxy_mutations() {
    let mut instance = initialized_instance();
    let root = instance.get_bone("root").unwrap();

    root.set_rotation(45.0).unwrap();
    root.set_position(3.0, 4.0).unwrap();
    instance.set_to_setup_pose().unwrap();

    let local = root.local().unwrap();
    assert_eq!(local.rotation, 0.0);
    assert_eq!((local.x, local.y), (0.0, 0.0));
}

#[test]
fn non_renderable_attachment_types_are_recognized() {
    let bounding_box = AttachmentData::BoundingBox(BoundingBoxAttachmentData {
        name: "hit".to_string(),
        vertices: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
    });
    assert!(!bounding_box.is_renderable());
    assert!(region("blob", 2.0).is_renderable());
}
