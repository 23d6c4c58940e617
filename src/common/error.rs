//! Error types for stomp_costs

use thiserror::Error;

/// Which stage of the cost-function lifecycle an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Parameter parsing or distance field construction failed; setup is aborted
    Configuration,
    /// The planning attempt could not be bound; the optimizer must not evaluate
    Bind,
    /// A single evaluation call was rejected; evaluator state is untouched
    Evaluation,
}

/// Main error type for the cost functions
#[derive(Debug, Error)]
pub enum CostFunctionError {
    /// A recognized configuration key is absent
    #[error("missing required parameter '{key}'")]
    MissingParameter { key: String },
    /// A configuration value could not be coerced or is out of range
    #[error("invalid parameter '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },
    /// Distance field construction failed
    #[error("distance field construction failed: {0}")]
    DistanceField(String),
    /// Robot model description is inconsistent
    #[error("invalid robot model: {0}")]
    InvalidRobotModel(String),
    /// Registry was asked for a class it does not know
    #[error("unknown cost function class '{0}'")]
    UnknownCostFunction(String),
    /// A bind or evaluate call arrived before a successful configure
    #[error("cost function has not been configured")]
    NotConfigured,
    /// The requested joint group does not exist in the robot model
    #[error("unknown joint group '{0}'")]
    UnknownGroup(String),
    /// The start state in the request is malformed or incomplete
    #[error("invalid start state: {0}")]
    InvalidStartState(String),
    /// Evaluation was requested without a bound planning context
    #[error("robot state has not been set, bind a motion plan request first")]
    NotBound,
    /// The trajectory batch has fewer columns than requested
    #[error("trajectory has {available} waypoints but {needed} are required")]
    SizeMismatch { needed: usize, available: usize },
    /// Joint vector length does not match the group
    #[error("expected {expected} joint values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// A trajectory waypoint holds a NaN or infinite joint value
    #[error("waypoint {timestep} has non-finite value {value} for joint '{joint}'")]
    NonFiniteWaypoint { timestep: usize, joint: String, value: f64 },
    /// The scene's robot model differs from the one the cost function was configured for
    #[error("planning scene uses robot model '{actual}' but the cost function was configured for '{expected}'")]
    RobotModelMismatch { expected: String, actual: String },
    /// Distance query on a state whose transforms were not updated
    #[error("robot state transforms are stale, call update() before querying")]
    StaleRobotState,
}

impl CostFunctionError {
    /// Lifecycle stage the error is reported against
    pub fn kind(&self) -> ErrorKind {
        match self {
            CostFunctionError::MissingParameter { .. }
            | CostFunctionError::InvalidParameter { .. }
            | CostFunctionError::DistanceField(_)
            | CostFunctionError::InvalidRobotModel(_)
            | CostFunctionError::UnknownCostFunction(_)
            | CostFunctionError::NotConfigured => ErrorKind::Configuration,
            CostFunctionError::UnknownGroup(_)
            | CostFunctionError::InvalidStartState(_)
            | CostFunctionError::RobotModelMismatch { .. } => ErrorKind::Bind,
            CostFunctionError::NotBound
            | CostFunctionError::SizeMismatch { .. }
            | CostFunctionError::DimensionMismatch { .. }
            | CostFunctionError::NonFiniteWaypoint { .. }
            | CostFunctionError::StaleRobotState => ErrorKind::Evaluation,
        }
    }

    /// Status code reported upstream to the planner
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CostFunctionError::UnknownGroup(_) => ErrorCode::InvalidGroupName,
            CostFunctionError::InvalidStartState(_) => ErrorCode::InvalidRobotState,
            CostFunctionError::DimensionMismatch { .. }
            | CostFunctionError::SizeMismatch { .. }
            | CostFunctionError::NonFiniteWaypoint { .. } => ErrorCode::InvalidMotionPlan,
            CostFunctionError::NotBound | CostFunctionError::NotConfigured => {
                ErrorCode::PlanningFailed
            }
            _ => ErrorCode::Failure,
        }
    }
}

/// Out-of-band status code returned alongside a bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    Failure,
    PlanningFailed,
    InvalidMotionPlan,
    InvalidGroupName,
    InvalidRobotState,
}

impl ErrorCode {
    pub fn from_result<T>(result: &CostFunctionResult<T>) -> Self {
        match result {
            Ok(_) => ErrorCode::Success,
            Err(e) => e.error_code(),
        }
    }

    pub fn is_success(&self) -> bool {
        *self == ErrorCode::Success
    }
}

/// Result type alias for cost function operations
pub type CostFunctionResult<T> = Result<T, CostFunctionError>;
