//! stomp_costs - trajectory cost functions for a STOMP motion planner
//!
//! This crate scores joint-space trajectories by how close a robot comes to
//! colliding with itself. A voxelized distance field of the robot's links is
//! built once per configuration and queried for every waypoint of every
//! rollout.

// Core modules
pub mod common;
pub mod robot;
pub mod scene;

// Distance queries and cost functions
pub mod distance_field;
pub mod cost_functions;

// Re-export common types for convenience
pub use common::{CostEvaluation, CostFunction, DistanceResult};
pub use common::{CostFunctionError, CostFunctionResult, ErrorCode, ErrorKind};
pub use cost_functions::{CollisionCheck, CostFunctionRegistry, ObstacleDistanceGradient};
