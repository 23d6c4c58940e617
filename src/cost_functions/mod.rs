//! Trajectory cost functions evaluated by the optimizer

pub mod collision_check;
pub mod lifecycle;
pub mod obstacle_distance_gradient;
pub mod params;
pub mod registry;

pub use collision_check::*;
pub use lifecycle::PlanningContext;
pub use obstacle_distance_gradient::*;
pub use params::CostFunctionParams;
pub use registry::*;
