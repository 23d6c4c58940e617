//! Validation of raw cost function parameters

use log::error;
use serde_json::{Map, Value};

use crate::common::{CostFunctionError, CostFunctionResult};

pub const COST_WEIGHT: &str = "cost_weight";
pub const VOXEL_SIZE: &str = "voxel_size";
pub const MAX_DISTANCE: &str = "max_distance";

/// Keys every distance based cost function requires
pub const REQUIRED_KEYS: [&str; 3] = [COST_WEIGHT, VOXEL_SIZE, MAX_DISTANCE];

/// Validated parameters shared by the distance based cost functions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostFunctionParams {
    pub cost_weight: f64,
    pub voxel_size: f64,
    pub max_distance: f64,
}

impl CostFunctionParams {
    /// Parse `config`, a key/value map; unknown keys are ignored
    ///
    /// Every required key is checked for presence before any value is read,
    /// so a missing key is always reported as such.
    pub fn from_config(name: &str, config: &Value) -> CostFunctionResult<Self> {
        let map = as_map(name, config)?;

        for key in REQUIRED_KEYS {
            if !map.contains_key(key) {
                error!("{} failed to find the '{}' parameter", name, key);
                return Err(CostFunctionError::MissingParameter { key: key.to_string() });
            }
        }

        let params = Self {
            cost_weight: positive_real(name, map, COST_WEIGHT)?,
            voxel_size: positive_real(name, map, VOXEL_SIZE)?,
            max_distance: positive_real(name, map, MAX_DISTANCE)?,
        };

        if params.max_distance <= params.voxel_size {
            return Err(invalid(
                name,
                MAX_DISTANCE,
                format!(
                    "must exceed {} ({}) to give a distance band of at least one voxel, got {}",
                    VOXEL_SIZE, params.voxel_size, params.max_distance
                ),
            ));
        }
        Ok(params)
    }

    /// Truncation band of the distance field in voxels
    pub fn bandwidth(&self) -> f64 {
        self.max_distance / self.voxel_size
    }
}

pub(crate) fn as_map<'a>(name: &str, config: &'a Value) -> CostFunctionResult<&'a Map<String, Value>> {
    config.as_object().ok_or_else(|| {
        invalid(name, "config", format!("expected a key/value map, found {}", json_type(config)))
    })
}

/// Coerce `map[key]` to a real number; integers are accepted
pub(crate) fn real(name: &str, map: &Map<String, Value>, key: &str) -> CostFunctionResult<f64> {
    let value = map.get(key).ok_or_else(|| {
        error!("{} failed to find the '{}' parameter", name, key);
        CostFunctionError::MissingParameter { key: key.to_string() }
    })?;
    value
        .as_f64()
        .ok_or_else(|| invalid(name, key, format!("expected a real number, found {}", json_type(value))))
}

fn positive_real(name: &str, map: &Map<String, Value>, key: &str) -> CostFunctionResult<f64> {
    let value = real(name, map, key)?;
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(name, key, format!("must be positive, got {}", value)));
    }
    Ok(value)
}

/// Optional real parameter falling back to `default` when absent
pub(crate) fn optional_real(
    name: &str,
    map: &Map<String, Value>,
    key: &str,
    default: f64,
) -> CostFunctionResult<f64> {
    if map.contains_key(key) {
        real(name, map, key)
    } else {
        Ok(default)
    }
}

pub(crate) fn invalid(name: &str, key: &str, reason: String) -> CostFunctionError {
    error!("{} failed to parse parameter '{}': {}", name, key, reason);
    CostFunctionError::InvalidParameter { key: key.to_string(), reason }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_config() {
        let params = CostFunctionParams::from_config(
            "test",
            &json!({"cost_weight": 1.0, "voxel_size": 0.05, "max_distance": 0.1, "class": "ignored"}),
        )
        .unwrap();
        assert_eq!(params.cost_weight, 1.0);
        assert_eq!(params.voxel_size, 0.05);
        assert_eq!(params.max_distance, 0.1);
        assert!((params.bandwidth() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_integers_are_coerced() {
        let params =
            CostFunctionParams::from_config("test", &json!({"cost_weight": 2, "voxel_size": 1, "max_distance": 3}))
                .unwrap();
        assert_eq!(params.cost_weight, 2.0);
        assert_eq!(params.max_distance, 3.0);
    }

    #[test]
    fn test_missing_key_is_named() {
        let result = CostFunctionParams::from_config("test", &json!({"cost_weight": 1.0, "max_distance": 0.1}));
        match result {
            Err(CostFunctionError::MissingParameter { key }) => assert_eq!(key, "voxel_size"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_missing_key_wins_over_bad_type() {
        let result = CostFunctionParams::from_config("test", &json!({"cost_weight": "heavy", "max_distance": 0.1}));
        assert!(matches!(result, Err(CostFunctionError::MissingParameter { .. })));
    }

    #[test]
    fn test_type_mismatch_is_distinct() {
        let result = CostFunctionParams::from_config(
            "test",
            &json!({"cost_weight": 1.0, "voxel_size": "fine", "max_distance": 0.1}),
        );
        match result {
            Err(CostFunctionError::InvalidParameter { key, .. }) => assert_eq!(key, "voxel_size"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_range_checks() {
        let negative = CostFunctionParams::from_config(
            "test",
            &json!({"cost_weight": -1.0, "voxel_size": 0.05, "max_distance": 0.1}),
        );
        assert!(matches!(negative, Err(CostFunctionError::InvalidParameter { .. })));

        let narrow = CostFunctionParams::from_config(
            "test",
            &json!({"cost_weight": 1.0, "voxel_size": 0.1, "max_distance": 0.1}),
        );
        assert!(matches!(narrow, Err(CostFunctionError::InvalidParameter { .. })));
    }

    #[test]
    fn test_non_map_config() {
        let result = CostFunctionParams::from_config("test", &json!([1, 2, 3]));
        assert!(matches!(result, Err(CostFunctionError::InvalidParameter { .. })));
    }
}
