//! Planning-attempt inputs: scene, request and optimizer configuration

pub mod allowed_collision;
pub mod planning_scene;

pub use allowed_collision::*;
pub use planning_scene::*;
