//! Tagged set of cost functions owned by the optimizer
//!
//! The registry is built from a configuration such as
//!
//! ```json
//! { "cost_functions": [
//!     { "class": "ObstacleDistanceGradient", "cost_weight": 1.0, "voxel_size": 0.05, "max_distance": 0.1 },
//!     { "class": "CollisionCheck", "cost_weight": 100.0, "voxel_size": 0.05, "max_distance": 0.1 }
//! ] }
//! ```
//!
//! and combines the members' raw costs with their weights.

use std::sync::Arc;

use log::{error, info};
use nalgebra::{DMatrix, DVector};
use serde_json::Value;

use crate::common::{CostEvaluation, CostFunction, CostFunctionError, CostFunctionResult};
use crate::cost_functions::collision_check::{CollisionCheck, COLLISION_CHECK};
use crate::cost_functions::obstacle_distance_gradient::{ObstacleDistanceGradient, OBSTACLE_DISTANCE_GRADIENT};
use crate::cost_functions::params::invalid;
use crate::robot::RobotModel;
use crate::scene::{MotionPlanRequest, PlanningScene, StompConfiguration};

pub const CLASS_KEY: &str = "class";
pub const COST_FUNCTIONS_KEY: &str = "cost_functions";

const REGISTRY: &str = "CostFunctionRegistry";

#[derive(Debug)]
pub enum CostFunctionVariant<'scene> {
    ObstacleDistanceGradient(ObstacleDistanceGradient<'scene>),
    CollisionCheck(CollisionCheck<'scene>),
}

impl<'scene> CostFunctionVariant<'scene> {
    /// Unconfigured cost function for a class name
    pub fn from_class(class: &str) -> CostFunctionResult<Self> {
        match class {
            OBSTACLE_DISTANCE_GRADIENT => Ok(Self::ObstacleDistanceGradient(ObstacleDistanceGradient::new())),
            COLLISION_CHECK => Ok(Self::CollisionCheck(CollisionCheck::new())),
            _ => Err(CostFunctionError::UnknownCostFunction(class.to_string())),
        }
    }

    pub fn fork(&self) -> Self {
        match self {
            Self::ObstacleDistanceGradient(cf) => Self::ObstacleDistanceGradient(cf.fork()),
            Self::CollisionCheck(cf) => Self::CollisionCheck(cf.fork()),
        }
    }

    fn inner(&self) -> &dyn CostFunction<'scene> {
        match self {
            Self::ObstacleDistanceGradient(cf) => cf,
            Self::CollisionCheck(cf) => cf,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn CostFunction<'scene> {
        match self {
            Self::ObstacleDistanceGradient(cf) => cf,
            Self::CollisionCheck(cf) => cf,
        }
    }
}

impl<'scene> CostFunction<'scene> for CostFunctionVariant<'scene> {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn weight(&self) -> f64 {
        self.inner().weight()
    }

    fn initialize(
        &mut self,
        robot_model: Arc<RobotModel>,
        group_name: &str,
        config: &Value,
    ) -> CostFunctionResult<()> {
        self.inner_mut().initialize(robot_model, group_name, config)
    }

    fn configure(&mut self, config: &Value) -> CostFunctionResult<()> {
        self.inner_mut().configure(config)
    }

    fn set_motion_plan_request(
        &mut self,
        planning_scene: &'scene PlanningScene,
        request: &MotionPlanRequest,
        config: &StompConfiguration,
    ) -> CostFunctionResult<()> {
        self.inner_mut().set_motion_plan_request(planning_scene, request, config)
    }

    fn compute_costs(
        &mut self,
        parameters: &DMatrix<f64>,
        start_timestep: usize,
        num_timesteps: usize,
        iteration_number: usize,
        rollout_number: usize,
    ) -> CostFunctionResult<CostEvaluation> {
        self.inner_mut().compute_costs(
            parameters,
            start_timestep,
            num_timesteps,
            iteration_number,
            rollout_number,
        )
    }

    fn done(&mut self, success: bool, total_iterations: usize, final_cost: f64) {
        self.inner_mut().done(success, total_iterations, final_cost)
    }
}

#[derive(Debug, Default)]
pub struct CostFunctionRegistry<'scene> {
    cost_functions: Vec<CostFunctionVariant<'scene>>,
}

impl<'scene> CostFunctionRegistry<'scene> {
    pub fn new() -> Self {
        Self { cost_functions: Vec::new() }
    }

    /// Build and initialize every entry of `config["cost_functions"]`
    pub fn from_config(robot_model: Arc<RobotModel>, group_name: &str, config: &Value) -> CostFunctionResult<Self> {
        let entries = config.get(COST_FUNCTIONS_KEY).ok_or_else(|| {
            error!("{} failed to find the '{}' parameter", REGISTRY, COST_FUNCTIONS_KEY);
            CostFunctionError::MissingParameter { key: COST_FUNCTIONS_KEY.to_string() }
        })?;
        let entries = entries.as_array().ok_or_else(|| {
            invalid(REGISTRY, COST_FUNCTIONS_KEY, "expected a list of cost function entries".to_string())
        })?;

        let mut registry = Self::new();
        for (i, entry) in entries.iter().enumerate() {
            let class = entry.get(CLASS_KEY).ok_or_else(|| {
                error!("{} entry {} has no '{}' parameter", REGISTRY, i, CLASS_KEY);
                CostFunctionError::MissingParameter { key: CLASS_KEY.to_string() }
            })?;
            let class = class.as_str().ok_or_else(|| {
                invalid(REGISTRY, CLASS_KEY, format!("entry {} expected a class name, found {}", i, class))
            })?;
            let mut cost_function = CostFunctionVariant::from_class(class).map_err(|e| {
                error!("{}", e);
                e
            })?;
            cost_function.initialize(Arc::clone(&robot_model), group_name, entry)?;
            info!("loaded cost function {} (weight {})", cost_function.name(), cost_function.weight());
            registry.push(cost_function);
        }
        Ok(registry)
    }

    pub fn push(&mut self, cost_function: CostFunctionVariant<'scene>) {
        self.cost_functions.push(cost_function);
    }

    pub fn len(&self) -> usize {
        self.cost_functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cost_functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CostFunctionVariant<'scene>> {
        self.cost_functions.iter()
    }

    /// Unbound copy of every member for a parallel rollout worker
    pub fn fork(&self) -> Self {
        Self { cost_functions: self.cost_functions.iter().map(|cf| cf.fork()).collect() }
    }

    /// Bind every member; stops at the first failure
    pub fn set_motion_plan_request(
        &mut self,
        planning_scene: &'scene PlanningScene,
        request: &MotionPlanRequest,
        config: &StompConfiguration,
    ) -> CostFunctionResult<()> {
        for cost_function in &mut self.cost_functions {
            cost_function.set_motion_plan_request(planning_scene, request, config)?;
        }
        Ok(())
    }

    /// Weighted sum of the members' costs; valid only if every member says so
    pub fn compute_costs(
        &mut self,
        parameters: &DMatrix<f64>,
        start_timestep: usize,
        num_timesteps: usize,
        iteration_number: usize,
        rollout_number: usize,
    ) -> CostFunctionResult<CostEvaluation> {
        let mut total = DVector::zeros(num_timesteps);
        let mut validity = true;
        for cost_function in &mut self.cost_functions {
            let eval = cost_function.compute_costs(
                parameters,
                start_timestep,
                num_timesteps,
                iteration_number,
                rollout_number,
            )?;
            total += eval.costs * cost_function.weight();
            validity &= eval.validity;
        }
        Ok(CostEvaluation::new(total, validity))
    }

    pub fn done(&mut self, success: bool, total_iterations: usize, final_cost: f64) {
        for cost_function in &mut self.cost_functions {
            cost_function.done(success, total_iterations, final_cost);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::{fixtures, RobotStateMsg};
    use serde_json::json;
    use std::f64::consts::PI;

    fn config() -> Value {
        json!({
            "cost_functions": [
                {"class": "ObstacleDistanceGradient", "cost_weight": 2.0, "voxel_size": 0.05, "max_distance": 0.1},
                {"class": "CollisionCheck", "cost_weight": 10.0, "voxel_size": 0.05, "max_distance": 0.1}
            ]
        })
    }

    fn request() -> MotionPlanRequest {
        MotionPlanRequest::new(fixtures::GROUP, RobotStateMsg::new(&["joint1", "joint2"], &[0.0, 0.0]))
    }

    #[test]
    fn test_registry_from_config() {
        let model = Arc::new(fixtures::two_link_arm(0.45));
        let registry = CostFunctionRegistry::from_config(model, fixtures::GROUP, &config()).unwrap();
        let names: Vec<&str> = registry.iter().map(|cf| cf.name()).collect();
        assert_eq!(names, vec!["ObstacleDistanceGradient", "CollisionCheck"]);
        let weights: Vec<f64> = registry.iter().map(|cf| cf.weight()).collect();
        assert_eq!(weights, vec![2.0, 10.0]);
    }

    #[test]
    fn test_unknown_class() {
        let model = Arc::new(fixtures::two_link_arm(0.45));
        let result = CostFunctionRegistry::from_config(
            model,
            fixtures::GROUP,
            &json!({"cost_functions": [{"class": "ToolGoalPose"}]}),
        );
        assert!(matches!(result, Err(CostFunctionError::UnknownCostFunction(_))));
    }

    #[test]
    fn test_malformed_entries() {
        let model = Arc::new(fixtures::two_link_arm(0.45));

        let missing = CostFunctionRegistry::from_config(
            model.clone(),
            fixtures::GROUP,
            &json!({"cost_functions": [{"cost_weight": 1.0}]}),
        );
        match missing {
            Err(CostFunctionError::MissingParameter { key }) => assert_eq!(key, "class"),
            other => panic!("unexpected result {:?}", other),
        }

        let not_a_name = CostFunctionRegistry::from_config(
            model.clone(),
            fixtures::GROUP,
            &json!({"cost_functions": [{"class": 7}]}),
        );
        assert!(matches!(not_a_name, Err(CostFunctionError::InvalidParameter { .. })));

        let not_a_list = CostFunctionRegistry::from_config(model, fixtures::GROUP, &json!({"cost_functions": {}}));
        assert!(matches!(not_a_list, Err(CostFunctionError::InvalidParameter { .. })));
    }

    #[test]
    fn test_member_configuration_errors_propagate() {
        let model = Arc::new(fixtures::two_link_arm(0.45));
        let result = CostFunctionRegistry::from_config(
            model,
            fixtures::GROUP,
            &json!({"cost_functions": [{"class": "ObstacleDistanceGradient", "cost_weight": 1.0}]}),
        );
        assert!(matches!(result, Err(CostFunctionError::MissingParameter { .. })));
    }

    #[test]
    fn test_weighted_aggregation() {
        let model = Arc::new(fixtures::two_link_arm(0.45));
        let scene = PlanningScene::new(model.clone());
        let mut registry = CostFunctionRegistry::from_config(model, fixtures::GROUP, &config()).unwrap();
        registry
            .set_motion_plan_request(&scene, &request(), &StompConfiguration::with_dimensions(2))
            .unwrap();

        let trajectory = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 0.0, PI]);
        let eval = registry.compute_costs(&trajectory, 0, 2, 0, 0).unwrap();
        assert_eq!(eval.costs[0], 0.0);
        // 2.0 * 1.0 + 10.0 * 1.0
        assert!((eval.costs[1] - 12.0).abs() < 1e-12);
        assert!(!eval.validity);

        registry.done(false, 1, eval.total());
        assert!(registry.compute_costs(&trajectory, 0, 2, 1, 0).is_err());
    }

    #[test]
    fn test_forked_registry_is_unbound() {
        let model = Arc::new(fixtures::two_link_arm(0.45));
        let scene = PlanningScene::new(model.clone());
        let mut registry = CostFunctionRegistry::from_config(model, fixtures::GROUP, &config()).unwrap();
        registry
            .set_motion_plan_request(&scene, &request(), &StompConfiguration::with_dimensions(2))
            .unwrap();

        let mut fork = registry.fork();
        assert_eq!(fork.len(), 2);
        let trajectory = DMatrix::zeros(2, 1);
        assert!(matches!(
            fork.compute_costs(&trajectory, 0, 1, 0, 0),
            Err(CostFunctionError::NotBound)
        ));
        fork.set_motion_plan_request(&scene, &request(), &StompConfiguration::with_dimensions(2))
            .unwrap();
        assert_eq!(
            fork.compute_costs(&trajectory, 0, 1, 0, 0).unwrap(),
            registry.compute_costs(&trajectory, 0, 1, 0, 0).unwrap()
        );
    }
}
