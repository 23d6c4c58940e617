//! Planning scene, motion plan request and optimizer configuration

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::robot::{RobotModel, RobotStateMsg};
use crate::scene::AllowedCollisionMatrix;

/// Robot model plus the collision exemptions in effect for a planning attempt
#[derive(Debug, Clone)]
pub struct PlanningScene {
    robot_model: Arc<RobotModel>,
    acm: AllowedCollisionMatrix,
}

impl PlanningScene {
    /// Scene whose matrix allows every pair of adjacent links
    pub fn new(robot_model: Arc<RobotModel>) -> Self {
        let acm = AllowedCollisionMatrix::from_adjacent_links(&robot_model);
        Self { robot_model, acm }
    }

    pub fn with_acm(robot_model: Arc<RobotModel>, acm: AllowedCollisionMatrix) -> Self {
        Self { robot_model, acm }
    }

    pub fn robot_model(&self) -> &Arc<RobotModel> {
        &self.robot_model
    }

    pub fn allowed_collision_matrix(&self) -> &AllowedCollisionMatrix {
        &self.acm
    }

    pub fn allowed_collision_matrix_mut(&mut self) -> &mut AllowedCollisionMatrix {
        &mut self.acm
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionPlanRequest {
    /// Empty means the group the cost function was initialized with
    pub group_name: String,
    pub start_state: RobotStateMsg,
}

impl MotionPlanRequest {
    pub fn new(group_name: &str, start_state: RobotStateMsg) -> Self {
        Self { group_name: group_name.to_string(), start_state }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializationMethod {
    LinearInterpolation,
    CubicPolynomialInterpolation,
    MinimumControlCost,
}

/// Optimizer-level parameters handed to every cost function at bind time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StompConfiguration {
    pub num_iterations: usize,
    /// Extra iterations run after the first valid trajectory
    pub num_iterations_after_valid: usize,
    pub num_timesteps: usize,
    /// Rows of every trajectory batch; must match the bound joint group
    pub num_dimensions: usize,
    pub delta_t: f64,
    pub initialization_method: InitializationMethod,
    pub num_rollouts: usize,
    pub max_rollouts: usize,
    pub exponentiated_cost_sensitivity: f64,
    pub control_cost_weight: f64,
}

impl Default for StompConfiguration {
    fn default() -> Self {
        Self {
            num_iterations: 40,
            num_iterations_after_valid: 0,
            num_timesteps: 40,
            num_dimensions: 0,
            delta_t: 0.1,
            initialization_method: InitializationMethod::LinearInterpolation,
            num_rollouts: 10,
            max_rollouts: 100,
            exponentiated_cost_sensitivity: 10.0,
            control_cost_weight: 0.0,
        }
    }
}

impl StompConfiguration {
    pub fn with_dimensions(num_dimensions: usize) -> Self {
        Self { num_dimensions, ..Default::default() }
    }
}
