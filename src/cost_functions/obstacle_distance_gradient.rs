//! Obstacle distance gradient cost function
//!
//! Scores each waypoint by how close the robot comes to itself, using a
//! voxelized signed distance field of its links:
//!
//! - distance >= max_distance: 0 (out of range)
//! - distance < 0: 1 (in collision, regardless of depth)
//! - otherwise: (max_distance - distance) / max_distance
//!
//! The configured `cost_weight` is not applied here; the optimizer reads it
//! through `CostFunction::weight` when combining cost terms.

use std::sync::Arc;

use nalgebra::DMatrix;
use serde_json::Value;

use crate::common::{CostEvaluation, CostFunction, CostFunctionResult};
use crate::cost_functions::lifecycle::{DistanceCostCore, PlanningContext};
use crate::cost_functions::CostFunctionParams;
use crate::distance_field::VoxelDistanceField;
use crate::robot::RobotModel;
use crate::scene::{MotionPlanRequest, PlanningScene, StompConfiguration};

pub const OBSTACLE_DISTANCE_GRADIENT: &str = "ObstacleDistanceGradient";

/// Map a signed distance to a cost in [0, 1]
pub fn distance_to_cost(distance: f64, max_distance: f64) -> f64 {
    if distance >= max_distance {
        0.0
    } else if distance < 0.0 {
        1.0
    } else {
        (max_distance - distance) / max_distance
    }
}

#[derive(Debug)]
pub struct ObstacleDistanceGradient<'scene> {
    core: DistanceCostCore<'scene>,
}

impl<'scene> ObstacleDistanceGradient<'scene> {
    pub fn new() -> Self {
        Self { core: DistanceCostCore::new(OBSTACLE_DISTANCE_GRADIENT) }
    }

    /// Unbound instance sharing this one's parameters and distance field
    ///
    /// Forks can score rollouts on other threads; each owns its robot state.
    pub fn fork(&self) -> Self {
        Self { core: self.core.fork() }
    }

    pub fn params(&self) -> Option<&CostFunctionParams> {
        self.core.params()
    }

    pub fn distance_field(&self) -> Option<&Arc<VoxelDistanceField>> {
        self.core.distance_field()
    }

    pub fn distance_field_builds(&self) -> usize {
        self.core.distance_field_builds()
    }

    pub fn context(&self) -> Option<&PlanningContext<'scene>> {
        self.core.context()
    }

    pub fn is_bound(&self) -> bool {
        self.core.context().is_some()
    }
}

impl Default for ObstacleDistanceGradient<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'scene> CostFunction<'scene> for ObstacleDistanceGradient<'scene> {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn weight(&self) -> f64 {
        self.core.params().map(|p| p.cost_weight).unwrap_or(0.0)
    }

    fn initialize(
        &mut self,
        robot_model: Arc<RobotModel>,
        group_name: &str,
        config: &Value,
    ) -> CostFunctionResult<()> {
        self.core.set_robot_model(robot_model, group_name);
        self.configure(config)
    }

    fn configure(&mut self, config: &Value) -> CostFunctionResult<()> {
        let params = CostFunctionParams::from_config(self.core.name(), config)?;
        self.core.apply_params(params)
    }

    fn set_motion_plan_request(
        &mut self,
        planning_scene: &'scene PlanningScene,
        request: &MotionPlanRequest,
        config: &StompConfiguration,
    ) -> CostFunctionResult<()> {
        self.core.bind(planning_scene, request, config)
    }

    fn compute_costs(
        &mut self,
        parameters: &DMatrix<f64>,
        start_timestep: usize,
        num_timesteps: usize,
        iteration_number: usize,
        rollout_number: usize,
    ) -> CostFunctionResult<CostEvaluation> {
        let distances = self.core.minimum_distances(
            parameters,
            start_timestep,
            num_timesteps,
            iteration_number,
            rollout_number,
        )?;
        let max_distance = self.core.params().map(|p| p.max_distance).unwrap_or(0.0);
        let costs = distances.map(|d| distance_to_cost(d, max_distance));
        Ok(CostEvaluation::new(costs, true))
    }

    fn done(&mut self, success: bool, total_iterations: usize, final_cost: f64) {
        self.core.release(success, total_iterations, final_cost);
    }
}
