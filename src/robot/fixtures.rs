//! Small robot models shared by the unit tests

use nalgebra::{Isometry3, Point3, Vector3};

use crate::robot::model::{CollisionShape, Joint, RobotModel, RobotModelBuilder};

pub const GROUP: &str = "arm";
pub const LINK_RADIUS: f64 = 0.05;
pub const BASE_RADIUS: f64 = 0.1;
pub const UPPER_ARM_LENGTH: f64 = 0.5;

/// One revolute link on a geometry-free root; nothing to collide with
pub fn single_link_robot() -> RobotModel {
    RobotModelBuilder::new("single_link")
        .link("world", vec![])
        .link(
            "link",
            vec![CollisionShape::capsule(Point3::origin(), Point3::new(0.5, 0.0, 0.0), LINK_RADIUS)],
        )
        .joint(Joint::revolute("joint1", "world", "link", Isometry3::identity(), Vector3::z()))
        .group(GROUP, &["joint1"])
        .build()
        .unwrap()
}

/// Planar arm over a spherical base
///
/// With joint2 = pi the forearm folds back toward the base; the gap between
/// the forearm tip and the base surface is
/// `UPPER_ARM_LENGTH - forearm_length - LINK_RADIUS - BASE_RADIUS`.
pub fn two_link_arm(forearm_length: f64) -> RobotModel {
    RobotModelBuilder::new("two_link_arm")
        .link("base", vec![CollisionShape::sphere(Point3::origin(), BASE_RADIUS)])
        .link(
            "link1",
            vec![CollisionShape::capsule(
                Point3::origin(),
                Point3::new(UPPER_ARM_LENGTH, 0.0, 0.0),
                LINK_RADIUS,
            )],
        )
        .link(
            "link2",
            vec![CollisionShape::capsule(
                Point3::origin(),
                Point3::new(forearm_length, 0.0, 0.0),
                LINK_RADIUS,
            )],
        )
        .joint(Joint::revolute("joint1", "base", "link1", Isometry3::identity(), Vector3::z()))
        .joint(Joint::revolute(
            "joint2",
            "link1",
            "link2",
            Isometry3::translation(UPPER_ARM_LENGTH, 0.0, 0.0),
            Vector3::z(),
        ))
        .group(GROUP, &["joint1", "joint2"])
        .build()
        .unwrap()
}
