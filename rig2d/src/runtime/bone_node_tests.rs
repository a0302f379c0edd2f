use crate::{BoneDef, Error, SkeletonInstance, SkeletonTemplate};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

/// root -> torso -> arm, with the arm offset 10 units along the torso's
/// local X axis.
fn arm_template() -> Arc<SkeletonTemplate> {
    let mut arm = BoneDef::with_name("arm", Some(1));
    arm.x = 10.0;
    Arc::new(SkeletonTemplate {
        bones: vec![
            BoneDef::with_name("root", None),
            BoneDef::with_name("torso", Some(0)),
            arm,
        ],
        slots: Vec::new(),
        skins: HashMap::new(),
        events: HashMap::new(),
        animations: Vec::new(),
        animation_index: HashMap::new(),
        pages: Vec::new(),
    })
}

fn initialized_instance() -> SkeletonInstance {
    let mut instance = SkeletonInstance::new();
    instance.initialize(arm_template()).unwrap();
    instance
}

#[test]
fn get_bone_unknown_name_fails() {
    let mut instance = initialized_instance();
    assert!(matches!(
        instance.get_bone("tail"),
        Err(Error::UnknownBone { .. })
    ));
}

#[test]
fn get_bone_is_idempotent_and_reuses_ancestors() {
    let mut instance = initialized_instance();

    let arm_a = instance.get_bone("arm").unwrap();
    let arm_b = instance.get_bone("arm").unwrap();
    assert!(Rc::ptr_eq(&arm_a.node, &arm_b.node));

    // The chain walk created root and torso as a side effect; asking for
    // them returns the same nodes, never duplicates.
    let root_a = instance.get_bone("root").unwrap();
    let root_b = instance.get_bone("root").unwrap();
    assert!(Rc::ptr_eq(&root_a.node, &root_b.node));
    assert!(root_a.is_root());
    assert!(!arm_a.is_root());
}

#[test]
fn parent_links_follow_the_template_hierarchy() {
    let mut instance = initialized_instance();
    let arm = instance.get_bone("arm").unwrap();

    let torso = arm.parent().unwrap().unwrap();
    assert_eq!(torso.name(), "torso");
    let root = torso.parent().unwrap().unwrap();
    assert_eq!(root.name(), "root");
    assert!(root.parent().unwrap().is_none());

    // The linked ancestors are the same nodes the arena hands out.
    let root_again = instance.get_bone("root").unwrap();
    assert!(Rc::ptr_eq(&root.node, &root_again.node));
}

#[test]
fn materialization_extends_an_existing_partial_chain() {
    let mut instance = initialized_instance();

    let torso_before = instance.get_bone("torso").unwrap();
    let arm = instance.get_bone("arm").unwrap();
    let torso_after = instance.get_bone("torso").unwrap();

    assert!(Rc::ptr_eq(&torso_before.node, &torso_after.node));
    assert!(arm.is_bound());
}

#[test]
fn world_transform_composes_root_to_leaf() {
    let mut instance = initialized_instance();
    let root = instance.get_bone("root").unwrap();
    let arm = instance.get_bone("arm").unwrap();

    // Setup pose: every local transform is identity except the arm's
    // translation, so the arm sits at (10, 0).
    let position = arm.world_position().unwrap();
    assert_approx(position[0], 10.0);
    assert_approx(position[1], 0.0);

    // Rotations are counter-clockwise positive: a 90 degree root rotation
    // carries (10, 0) to (0, 10).
    root.set_rotation(90.0).unwrap();
    instance.refresh_pose().unwrap();

    let position = arm.world_position().unwrap();
    assert_approx(position[0], 0.0);
    assert_approx(position[1], 10.0);
    assert_approx(arm.world_transform().unwrap().rotation(), 90.0);
}

#[test]
fn local_mutation_of_an_inner_bone_moves_descendants() {
    let mut instance = initialized_instance();
    let torso = instance.get_bone("torso").unwrap();
    let arm = instance.get_bone("arm").unwrap();

    torso.set_position(0.0, 5.0).unwrap();
    instance.refresh_pose().unwrap();

    let position = arm.world_position().unwrap();
    assert_approx(position[0], 10.0);
    assert_approx(position[1], 5.0);
}

#[test]
fn set_flip_updates_every_materialized_node_and_new_ones_inherit_it() {
    let mut instance = initialized_instance();
    let root = instance.get_bone("root").unwrap();

    assert_eq!(root.flip().unwrap(), (false, false));
    instance.set_flip(true, false).unwrap();
    assert_eq!(root.flip().unwrap(), (true, false));

    // A node created after the flip was set starts with the current state.
    let arm = instance.get_bone("arm").unwrap();
    assert_eq!(arm.flip().unwrap(), (true, false));

    // Horizontal flip mirrors world X.
    instance.refresh_pose().unwrap();
    let position = arm.world_position().unwrap();
    assert_approx(position[0], -10.0);
    assert_approx(position[1], 0.0);
}

#[test]
fn instance_position_moves_the_hierarchy() {
    let mut instance = initialized_instance();
    let arm = instance.get_bone("arm").unwrap();

    instance.set_position(100.0, -20.0).unwrap();
    let position = arm.world_position().unwrap();
    assert_approx(position[0], 110.0);
    assert_approx(position[1], -20.0);
}

#[test]
fn handles_report_unbound_after_instance_drop() {
    let arm = {
        let mut instance = initialized_instance();
        instance.get_bone("arm").unwrap()
    };

    assert!(!arm.is_bound());
    assert!(matches!(arm.set_rotation(45.0), Err(Error::UnboundHandle)));
    assert!(matches!(arm.world_position(), Err(Error::UnboundHandle)));
    assert!(matches!(arm.local(), Err(Error::UnboundHandle)));
}

#[test]
fn scale_and_shear_compose_into_the_world_matrix() {
    let mut instance = initialized_instance();
    let root = instance.get_bone("root").unwrap();
    let arm = instance.get_bone("arm").unwrap();

    root.set_scale(2.0, 1.0).unwrap();
    instance.refresh_pose().unwrap();

    let position = arm.world_position().unwrap();
    assert_approx(position[0], 20.0);
    assert_approx(position[1], 0.0);

    let world = arm.world_transform().unwrap();
    let mapped = world.apply(1.0, 0.0);
    assert_approx(mapped[0], 22.0);
    assert_approx(mapped[1], 0.0);
}
