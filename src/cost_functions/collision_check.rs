//! Binary self-collision cost function
//!
//! Each waypoint costs 1 when the robot is closer to itself than
//! `collision_padding` (0 by default) and 0 otherwise. Any colliding waypoint
//! makes the evaluation invalid.

use std::sync::Arc;

use log::debug;
use nalgebra::DMatrix;
use serde_json::Value;

use crate::common::{CostEvaluation, CostFunction, CostFunctionResult};
use crate::cost_functions::lifecycle::DistanceCostCore;
use crate::cost_functions::params::{as_map, invalid, optional_real};
use crate::cost_functions::CostFunctionParams;
use crate::robot::RobotModel;
use crate::scene::{MotionPlanRequest, PlanningScene, StompConfiguration};

pub const COLLISION_CHECK: &str = "CollisionCheck";
pub const COLLISION_PADDING: &str = "collision_padding";

#[derive(Debug)]
pub struct CollisionCheck<'scene> {
    core: DistanceCostCore<'scene>,
    collision_padding: f64,
}

impl<'scene> CollisionCheck<'scene> {
    pub fn new() -> Self {
        Self { core: DistanceCostCore::new(COLLISION_CHECK), collision_padding: 0.0 }
    }

    pub fn fork(&self) -> Self {
        Self { core: self.core.fork(), collision_padding: self.collision_padding }
    }

    pub fn params(&self) -> Option<&CostFunctionParams> {
        self.core.params()
    }

    pub fn collision_padding(&self) -> f64 {
        self.collision_padding
    }

    pub fn is_bound(&self) -> bool {
        self.core.context().is_some()
    }
}

impl Default for CollisionCheck<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'scene> CostFunction<'scene> for CollisionCheck<'scene> {
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
        let name = self.core.name();
        let params = CostFunctionParams::from_config(name, config)?;
        let padding = optional_real(name, as_map(name, config)?, COLLISION_PADDING, 0.0)?;
        if !(padding.is_finite() && padding >= 0.0 && padding < params.max_distance) {
            return Err(invalid(
                name,
                COLLISION_PADDING,
                format!("must lie in [0, max_distance), got {}", padding),
            ));
        }
        self.core.apply_params(params)?;
        self.collision_padding = padding;
        Ok(())
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
        let padding = self.collision_padding;
        let costs = distances.map(|d| if d < padding { 1.0 } else { 0.0 });
        let collisions = costs.iter().filter(|&&c| c > 0.0).count();
        if collisions > 0 {
            debug!(
                "{} found {} colliding waypoints in rollout {} of iteration {}",
                self.core.name(),
                collisions,
                rollout_number,
                iteration_number
            );
        }
        Ok(CostEvaluation::new(costs, collisions == 0))
    }

    fn done(&mut self, success: bool, total_iterations: usize, final_cost: f64) {
        self.core.release(success, total_iterations, final_cost);
    }
}
