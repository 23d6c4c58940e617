//! Common types used throughout stomp_costs

use nalgebra::DVector;

/// Outcome of a distance query on a posed robot
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceResult {
    pub min_distance: f64,
    /// Link pair that produced `min_distance`, if any pair came within the band
    pub nearest_links: Option<(String, String)>,
}

impl DistanceResult {
    pub fn new(min_distance: f64) -> Self {
        Self { min_distance, nearest_links: None }
    }
}

/// Per-waypoint costs of one evaluated rollout
#[derive(Debug, Clone, PartialEq)]
pub struct CostEvaluation {
    /// One value per requested waypoint, in request order
    pub costs: DVector<f64>,
    /// Whether the cost function considers the scored waypoints acceptable
    pub validity: bool,
}

impl CostEvaluation {
    pub fn new(costs: DVector<f64>, validity: bool) -> Self {
        Self { costs, validity }
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.costs.sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_evaluation_total() {
        let eval = CostEvaluation::new(DVector::from_vec(vec![0.0, 0.5, 1.0]), true);
        assert_eq!(eval.len(), 3);
        assert!((eval.total() - 1.5).abs() < 1e-12);
    }
}
