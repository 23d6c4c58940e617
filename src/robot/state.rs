//! Mutable posed state of a robot model

use std::sync::Arc;

use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::common::{CostFunctionError, CostFunctionResult};
use crate::robot::model::{JointGroup, JointType, RobotModel};

/// Joint values as they arrive in a planning request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotStateMsg {
    pub name: Vec<String>,
    pub position: Vec<f64>,
}

impl RobotStateMsg {
    pub fn new(name: &[&str], position: &[f64]) -> Self {
        Self {
            name: name.iter().map(|s| s.to_string()).collect(),
            position: position.to_vec(),
        }
    }
}

/// Joint positions plus the link transforms derived from them
///
/// Setting any position marks the state dirty; `update()` recomputes forward
/// kinematics. Transforms of a dirty state are not handed out.
#[derive(Debug, Clone)]
pub struct RobotState {
    model: Arc<RobotModel>,
    positions: Vec<f64>,
    link_transforms: Vec<Isometry3<f64>>,
    dirty: bool,
}

impl RobotState {
    /// All joints at zero, transforms not yet computed
    pub fn new(model: Arc<RobotModel>) -> Self {
        let positions = vec![0.0; model.variable_count()];
        let link_transforms = vec![Isometry3::identity(); model.links().len()];
        Self { model, positions, link_transforms, dirty: true }
    }

    /// Build a state from a request message; every movable joint must be given exactly
    pub fn from_msg(model: Arc<RobotModel>, msg: &RobotStateMsg) -> CostFunctionResult<Self> {
        let invalid = |msg: String| CostFunctionError::InvalidStartState(msg);

        if msg.name.len() != msg.position.len() {
            return Err(invalid(format!(
                "{} joint names but {} positions",
                msg.name.len(),
                msg.position.len()
            )));
        }

        let mut state = Self::new(model);
        let mut seen = vec![false; state.positions.len()];
        for (name, &value) in msg.name.iter().zip(msg.position.iter()) {
            let index = state
                .model
                .variable_index(name)
                .ok_or_else(|| invalid(format!("unknown joint '{}'", name)))?;
            if !value.is_finite() {
                return Err(invalid(format!("joint '{}' has non-finite position {}", name, value)));
            }
            state.positions[index] = value;
            seen[index] = true;
        }

        let missing: Vec<&str> = state
            .model
            .variable_names()
            .iter()
            .zip(seen.iter())
            .filter(|(_, &s)| !s)
            .map(|(n, _)| n.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(invalid(format!("missing values for joints {:?}", missing)));
        }

        state.update();
        Ok(state)
    }

    pub fn model(&self) -> &Arc<RobotModel> {
        &self.model
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_variable_position(&mut self, joint_name: &str, value: f64) -> CostFunctionResult<()> {
        let index = self
            .model
            .variable_index(joint_name)
            .ok_or_else(|| CostFunctionError::InvalidStartState(format!("unknown joint '{}'", joint_name)))?;
        self.positions[index] = value;
        self.dirty = true;
        Ok(())
    }

    pub fn set_joint_group_positions(&mut self, group: &JointGroup, values: &[f64]) -> CostFunctionResult<()> {
        if values.len() != group.variable_count() {
            return Err(CostFunctionError::DimensionMismatch {
                expected: group.variable_count(),
                actual: values.len(),
            });
        }
        for (&index, &value) in group.variable_indices().iter().zip(values.iter()) {
            self.positions[index] = value;
        }
        self.dirty = true;
        Ok(())
    }

    /// Recompute every link transform from the current joint positions
    pub fn update(&mut self) {
        let model = Arc::clone(&self.model);
        self.link_transforms[model.root_link()] = Isometry3::identity();
        for (i, joint) in model.joints().iter().enumerate() {
            let (parent, child, variable) = model.joint_topology(i);
            let q = variable.map(|v| self.positions[v]).unwrap_or(0.0);
            let motion = match joint.joint_type {
                JointType::Revolute { axis } => {
                    Isometry3::from_parts(Translation3::identity(), UnitQuaternion::from_axis_angle(&axis, q))
                }
                JointType::Prismatic { axis } => {
                    Isometry3::from_parts(Translation3::from(axis.into_inner() * q), UnitQuaternion::identity())
                }
                JointType::Fixed => Isometry3::identity(),
            };
            self.link_transforms[child] = self.link_transforms[parent] * joint.origin * motion;
        }
        self.dirty = false;
    }

    /// World transforms of all links, indexed like `RobotModel::links`
    pub fn link_transforms(&self) -> CostFunctionResult<&[Isometry3<f64>]> {
        if self.dirty {
            return Err(CostFunctionError::StaleRobotState);
        }
        Ok(&self.link_transforms)
    }

    pub fn link_transform(&self, link_name: &str) -> CostFunctionResult<Isometry3<f64>> {
        let index = self.model.link_index(link_name).ok_or_else(|| {
            CostFunctionError::InvalidRobotModel(format!("unknown link '{}'", link_name))
        })?;
        Ok(self.link_transforms()?[index])
    }
}
