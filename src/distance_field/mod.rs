//! Voxelized self-distance field of a robot model

pub mod cache;
pub mod collision_robot;
pub mod voxel_grid;

pub use cache::*;
pub use collision_robot::*;
pub use voxel_grid::*;
