//! Common traits defining the cost function interface

use std::sync::Arc;

use nalgebra::DMatrix;
use serde_json::Value;

use crate::common::error::CostFunctionResult;
use crate::common::types::CostEvaluation;
use crate::robot::RobotModel;
use crate::scene::{MotionPlanRequest, PlanningScene, StompConfiguration};

/// A per-waypoint cost term driven by the optimizer
///
/// Lifecycle: `initialize` / `configure` once, then for every planning attempt
/// one `set_motion_plan_request`, any number of `compute_costs`, and one
/// `done`. The scene passed at bind time is borrowed for `'scene`; it is
/// released by `done` or by the next bind.
pub trait CostFunction<'scene> {
    fn name(&self) -> &str;

    /// Weight the optimizer applies when summing cost terms
    fn weight(&self) -> f64;

    /// Attach the robot model and joint group, then `configure`
    fn initialize(
        &mut self,
        robot_model: Arc<RobotModel>,
        group_name: &str,
        config: &Value,
    ) -> CostFunctionResult<()>;

    /// Validate parameters and acquire heavyweight resources
    fn configure(&mut self, config: &Value) -> CostFunctionResult<()>;

    /// Bind a planning attempt
    fn set_motion_plan_request(
        &mut self,
        planning_scene: &'scene PlanningScene,
        request: &MotionPlanRequest,
        config: &StompConfiguration,
    ) -> CostFunctionResult<()>;

    /// Score `num_timesteps` waypoints (columns) of `parameters` starting at `start_timestep`
    ///
    /// `iteration_number` and `rollout_number` are diagnostic only.
    fn compute_costs(
        &mut self,
        parameters: &DMatrix<f64>,
        start_timestep: usize,
        num_timesteps: usize,
        iteration_number: usize,
        rollout_number: usize,
    ) -> CostFunctionResult<CostEvaluation>;

    /// End of the planning attempt
    fn done(&mut self, success: bool, total_iterations: usize, final_cost: f64);
}
