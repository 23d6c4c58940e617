//! Lifecycle shared by the distance based cost functions
//!
//! Holds the process-lifetime state (model, parameters, cached distance
//! field) and the attempt-lifetime `PlanningContext`, and runs the
//! pose-update-query loop over a trajectory batch.

use std::sync::Arc;

use log::{debug, error, trace};
use nalgebra::{DMatrix, DVector};

use crate::common::{CostFunctionError, CostFunctionResult};
use crate::cost_functions::CostFunctionParams;
use crate::distance_field::{DistanceFieldCache, DistanceRequest, VoxelDistanceField};
use crate::robot::{JointGroup, RobotModel, RobotState};
use crate::scene::{AllowedCollisionMatrix, MotionPlanRequest, PlanningScene, StompConfiguration};

/// State bound for one planning attempt
#[derive(Debug)]
pub struct PlanningContext<'scene> {
    group: JointGroup,
    acm: &'scene AllowedCollisionMatrix,
    state: RobotState,
}

impl<'scene> PlanningContext<'scene> {
    pub fn group(&self) -> &JointGroup {
        &self.group
    }

    pub fn allowed_collision_matrix(&self) -> &'scene AllowedCollisionMatrix {
        self.acm
    }

    pub fn robot_state(&self) -> &RobotState {
        &self.state
    }
}

#[derive(Debug)]
pub(crate) struct DistanceCostCore<'scene> {
    name: &'static str,
    robot_model: Option<Arc<RobotModel>>,
    group_name: String,
    params: Option<CostFunctionParams>,
    field_cache: DistanceFieldCache,
    context: Option<PlanningContext<'scene>>,
    joint_scratch: Vec<f64>,
}

impl<'scene> DistanceCostCore<'scene> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            robot_model: None,
            group_name: String::new(),
            params: None,
            field_cache: DistanceFieldCache::new(),
            context: None,
            joint_scratch: Vec::new(),
        }
    }

    /// Unbound copy sharing the model, parameters and field
    pub fn fork(&self) -> Self {
        Self {
            name: self.name,
            robot_model: self.robot_model.clone(),
            group_name: self.group_name.clone(),
            params: self.params,
            field_cache: self.field_cache.clone(),
            context: None,
            joint_scratch: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> Option<&CostFunctionParams> {
        self.params.as_ref()
    }

    pub fn distance_field(&self) -> Option<&Arc<VoxelDistanceField>> {
        self.params.and(self.field_cache.current())
    }

    pub fn distance_field_builds(&self) -> usize {
        self.field_cache.builds()
    }

    pub fn context(&self) -> Option<&PlanningContext<'scene>> {
        self.context.as_ref()
    }

    pub fn set_robot_model(&mut self, robot_model: Arc<RobotModel>, group_name: &str) {
        self.robot_model = Some(robot_model);
        self.group_name = group_name.to_string();
    }

    /// Acquire the field for `params`, committing both only on success
    pub fn apply_params(&mut self, params: CostFunctionParams) -> CostFunctionResult<()> {
        let model = self.robot_model.as_ref().ok_or_else(|| {
            error!("{} has no robot model, call initialize first", self.name);
            CostFunctionError::NotConfigured
        })?;
        self.field_cache
            .acquire(self.name, model, params.voxel_size, params.max_distance)?;
        self.params = Some(params);
        Ok(())
    }

    pub fn bind(
        &mut self,
        planning_scene: &'scene PlanningScene,
        request: &MotionPlanRequest,
        config: &StompConfiguration,
    ) -> CostFunctionResult<()> {
        // a failed bind must not leave the previous attempt usable
        self.context = None;

        let model = match (&self.robot_model, &self.params) {
            (Some(model), Some(_)) => Arc::clone(model),
            _ => {
                error!("{} received a motion plan request before being configured", self.name);
                return Err(CostFunctionError::NotConfigured);
            }
        };

        let scene_model = planning_scene.robot_model();
        if scene_model.fingerprint() != model.fingerprint() {
            error!(
                "{} was configured for robot model '{}' but the planning scene uses '{}'",
                self.name,
                model.name(),
                scene_model.name()
            );
            return Err(CostFunctionError::RobotModelMismatch {
                expected: model.name().to_string(),
                actual: scene_model.name().to_string(),
            });
        }

        let group_name = if request.group_name.is_empty() {
            self.group_name.as_str()
        } else {
            request.group_name.as_str()
        };
        let group = model.joint_group(group_name).cloned().ok_or_else(|| {
            error!("{} cannot find joint group '{}'", self.name, group_name);
            CostFunctionError::UnknownGroup(group_name.to_string())
        })?;

        if config.num_dimensions != group.variable_count() {
            error!(
                "{} expects {} dimensions for group '{}' but the optimizer uses {}",
                self.name,
                group.variable_count(),
                group.name(),
                config.num_dimensions
            );
            return Err(CostFunctionError::DimensionMismatch {
                expected: group.variable_count(),
                actual: config.num_dimensions,
            });
        }

        let state = RobotState::from_msg(model, &request.start_state).map_err(|e| {
            error!("{} failed to get current robot state from request: {}", self.name, e);
            e
        })?;

        debug!(
            "{} bound group '{}' for {} timesteps",
            self.name,
            group.name(),
            config.num_timesteps
        );
        self.context = Some(PlanningContext {
            group,
            acm: planning_scene.allowed_collision_matrix(),
            state,
        });
        Ok(())
    }

    /// Minimum self distance at each requested waypoint
    pub fn minimum_distances(
        &mut self,
        parameters: &DMatrix<f64>,
        start_timestep: usize,
        num_timesteps: usize,
        iteration_number: usize,
        rollout_number: usize,
    ) -> CostFunctionResult<DVector<f64>> {
        let name = self.name;
        let context = self.context.as_mut().ok_or_else(|| {
            error!("{} robot state has not been updated", name);
            CostFunctionError::NotBound
        })?;
        let field = self.field_cache.current().ok_or(CostFunctionError::NotConfigured)?;

        let needed = start_timestep.checked_add(num_timesteps).unwrap_or(usize::MAX);
        if parameters.ncols() < needed {
            error!(
                "{} size in the 'parameters' matrix is less than required: needed {} waypoints, available {}",
                name,
                needed,
                parameters.ncols()
            );
            return Err(CostFunctionError::SizeMismatch { needed, available: parameters.ncols() });
        }
        if parameters.nrows() != context.group.variable_count() {
            error!(
                "{} 'parameters' matrix has {} rows but group '{}' has {} joints",
                name,
                parameters.nrows(),
                context.group.name(),
                context.group.variable_count()
            );
            return Err(CostFunctionError::DimensionMismatch {
                expected: context.group.variable_count(),
                actual: parameters.nrows(),
            });
        }

        // NaN poses would sample outside every grid and read as far away
        for t in start_timestep..needed {
            let bad = parameters.column(t).iter().position(|v| !v.is_finite());
            if let Some(row) = bad {
                let joint = context.group.joint_names()[row].clone();
                let value = parameters[(row, t)];
                error!(
                    "{} waypoint {} has non-finite value {} for joint '{}'",
                    name, t, value, joint
                );
                return Err(CostFunctionError::NonFiniteWaypoint { timestep: t, joint, value });
            }
        }

        let request = DistanceRequest { group: &context.group, acm: context.acm };
        let mut distances = DVector::zeros(num_timesteps);
        for (i, t) in (start_timestep..needed).enumerate() {
            self.joint_scratch.clear();
            self.joint_scratch.extend(parameters.column(t).iter().copied());
            context.state.set_joint_group_positions(&context.group, &self.joint_scratch)?;
            context.state.update();

            let result = field.distance_self(&request, &context.state)?;
            trace!(
                "{} iteration {} rollout {} timestep {}: distance {:.4} {:?}",
                name,
                iteration_number,
                rollout_number,
                t,
                result.min_distance,
                result.nearest_links
            );
            distances[i] = result.min_distance;
        }
        Ok(distances)
    }

    pub fn release(&mut self, success: bool, total_iterations: usize, final_cost: f64) {
        debug!(
            "{} attempt finished (success: {}, iterations: {}, cost: {:.4})",
            self.name, success, total_iterations, final_cost
        );
        self.context = None;
    }
}
