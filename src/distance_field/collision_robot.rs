//! Self-distance queries against per-link voxelized signed distance fields
//!
//! Each link with geometry gets a `VoxelGrid` in its own frame holding the
//! truncated signed distance to the link's shapes, plus a set of surface
//! sample points. The distance between two links is the smallest field value
//! of one link evaluated at the other's surface points, checked in both
//! directions. Fields are built once and only read afterwards.

use itertools::Itertools;
use nalgebra::{Isometry3, Point3, Vector3};

use crate::common::{CostFunctionError, CostFunctionResult, DistanceResult};
use crate::distance_field::VoxelGrid;
use crate::robot::{CollisionShape, JointGroup, RobotModel, RobotState};
use crate::scene::AllowedCollisionMatrix;

/// Upper bound on grid nodes for a single link
pub const MAX_VOXELS_PER_LINK: usize = 1 << 24;

/// What to measure: the bound group's links, minus the exempt pairs
#[derive(Debug, Clone, Copy)]
pub struct DistanceRequest<'a> {
    pub group: &'a JointGroup,
    pub acm: &'a AllowedCollisionMatrix,
}

#[derive(Debug, Clone)]
struct LinkField {
    grid: VoxelGrid,
    surface_points: Vec<Point3<f64>>,
}

#[derive(Debug, Clone)]
pub struct VoxelDistanceField {
    voxel_size: f64,
    max_distance: f64,
    inner_bandwidth: f64,
    outer_bandwidth: f64,
    link_names: Vec<String>,
    links: Vec<Option<LinkField>>,
}

impl VoxelDistanceField {
    /// Voxelize every link of `model`
    ///
    /// Stored distances are clamped to `[-inner_bandwidth * voxel_size, max_distance]`.
    /// The outer band is `max_distance` itself rather than
    /// `outer_bandwidth * voxel_size`, which can round to just below it.
    pub fn build(
        model: &RobotModel,
        voxel_size: f64,
        max_distance: f64,
        inner_bandwidth: f64,
        outer_bandwidth: f64,
    ) -> CostFunctionResult<Self> {
        let fail = |msg: String| CostFunctionError::DistanceField(msg);
        for (name, value) in [
            ("voxel_size", voxel_size),
            ("max_distance", max_distance),
            ("inner_bandwidth", inner_bandwidth),
            ("outer_bandwidth", outer_bandwidth),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(fail(format!("{} must be positive and finite, got {}", name, value)));
            }
        }

        let inner_limit = -inner_bandwidth * voxel_size;
        let outer_limit = max_distance;
        let padding = Vector3::repeat(outer_limit + voxel_size);

        let mut links = Vec::with_capacity(model.links().len());
        for link in model.links() {
            if !link.has_geometry() {
                links.push(None);
                continue;
            }
            for shape in &link.shapes {
                if !shape.is_finite() || shape.radius() <= 0.0 {
                    return Err(fail(format!("link '{}' has malformed geometry {:?}", link.name, shape)));
                }
            }

            let (mut min, mut max) = link.shapes[0].bounds();
            for shape in &link.shapes[1..] {
                let (lo, hi) = shape.bounds();
                min = min.inf(&lo);
                max = max.sup(&hi);
            }

            let shapes = &link.shapes;
            let grid = VoxelGrid::from_fn(min - padding, max + padding, voxel_size, MAX_VOXELS_PER_LINK, |p| {
                signed_distance(shapes, p).clamp(inner_limit, outer_limit)
            })?;

            let surface_points = surface_points(shapes, voxel_size * 0.5);
            links.push(Some(LinkField { grid, surface_points }));
        }

        Ok(Self {
            voxel_size,
            max_distance,
            inner_bandwidth,
            outer_bandwidth,
            link_names: model.links().iter().map(|l| l.name.clone()).collect(),
            links,
        })
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Inner and outer band in voxels
    pub fn bandwidths(&self) -> (f64, f64) {
        (self.inner_bandwidth, self.outer_bandwidth)
    }

    /// Distance reported when nothing is resolved within the band
    pub fn truncation_distance(&self) -> f64 {
        self.max_distance
    }

    pub fn voxel_count(&self) -> usize {
        self.links.iter().flatten().map(|l| l.grid.voxel_count()).sum()
    }

    /// Minimum distance between any two links eligible under `request`
    ///
    /// A pair is eligible when both links have geometry, the matrix does not
    /// allow it, and at least one of the links moves with the group.
    pub fn distance_self(
        &self,
        request: &DistanceRequest<'_>,
        state: &RobotState,
    ) -> CostFunctionResult<DistanceResult> {
        let transforms = state.link_transforms()?;
        if transforms.len() != self.links.len() {
            return Err(CostFunctionError::DistanceField(format!(
                "state has {} links but the field was built for {}",
                transforms.len(),
                self.links.len()
            )));
        }

        let mut result = DistanceResult::new(self.truncation_distance());
        for (a, b) in (0..self.links.len()).tuple_combinations() {
            let (Some(field_a), Some(field_b)) = (&self.links[a], &self.links[b]) else {
                continue;
            };
            if !(request.group.moves_link(a) || request.group.moves_link(b)) {
                continue;
            }
            if request.acm.is_allowed(&self.link_names[a], &self.link_names[b]) {
                continue;
            }

            let d = self
                .directed_distance(field_a, &transforms[a], field_b, &transforms[b])
                .min(self.directed_distance(field_b, &transforms[b], field_a, &transforms[a]));
            if d < result.min_distance {
                result.min_distance = d;
                result.nearest_links = Some((self.link_names[a].clone(), self.link_names[b].clone()));
            }
        }
        Ok(result)
    }

    /// Smallest value of `field`'s grid at `points`' surface samples
    fn directed_distance(
        &self,
        field: &LinkField,
        field_pose: &Isometry3<f64>,
        points: &LinkField,
        points_pose: &Isometry3<f64>,
    ) -> f64 {
        let to_field = field_pose.inverse() * points_pose;
        let truncation = self.truncation_distance();
        points
            .surface_points
            .iter()
            .map(|p| field.grid.sample(&(to_field * p)).unwrap_or(truncation))
            .fold(truncation, f64::min)
    }
}

fn signed_distance(shapes: &[CollisionShape], p: &Point3<f64>) -> f64 {
    shapes
        .iter()
        .map(|s| s.signed_distance(p))
        .fold(f64::INFINITY, f64::min)
}

/// Surface samples of the union, dropping points buried inside another shape
fn surface_points(shapes: &[CollisionShape], spacing: f64) -> Vec<Point3<f64>> {
    shapes
        .iter()
        .enumerate()
        .flat_map(|(i, shape)| {
            shape
                .surface_points(spacing)
                .into_iter()
                .filter(move |p| {
                    shapes
                        .iter()
                        .enumerate()
                        .all(|(j, other)| i == j || other.signed_distance(p) >= -1e-9)
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::fixtures;
    use std::f64::consts::PI;
    use std::sync::Arc;

    fn posed(model: &Arc<RobotModel>, joints: &[f64]) -> RobotState {
        let mut state = RobotState::new(model.clone());
        let group = model.joint_group(fixtures::GROUP).unwrap();
        state.set_joint_group_positions(group, joints).unwrap();
        state.update();
        state
    }

    fn query(model: &Arc<RobotModel>, field: &VoxelDistanceField, joints: &[f64]) -> DistanceResult {
        let acm = AllowedCollisionMatrix::from_adjacent_links(model);
        let request = DistanceRequest { group: model.joint_group(fixtures::GROUP).unwrap(), acm: &acm };
        field.distance_self(&request, &posed(model, joints)).unwrap()
    }

    #[test]
    fn test_far_pose_is_truncated() {
        let model = Arc::new(fixtures::two_link_arm(0.4));
        let field = VoxelDistanceField::build(&model, 0.05, 0.1, 2.0, 2.0).unwrap();
        let result = query(&model, &field, &[0.0, 0.0]);
        assert!((result.min_distance - 0.1).abs() < 1e-12);
        assert!(result.nearest_links.is_none());
    }

    #[test]
    fn test_truncation_is_exactly_max_distance() {
        // 0.84 / 0.043 * 0.043 rounds below 0.84
        let (voxel_size, max_distance) = (0.043, 0.84);
        let bandwidth = max_distance / voxel_size;
        assert!(bandwidth * voxel_size < max_distance);

        let model = Arc::new(fixtures::single_link_robot());
        let field = VoxelDistanceField::build(&model, voxel_size, max_distance, bandwidth, bandwidth).unwrap();
        assert_eq!(field.truncation_distance(), max_distance);

        let acm = AllowedCollisionMatrix::from_adjacent_links(&model);
        let request = DistanceRequest { group: model.joint_group(fixtures::GROUP).unwrap(), acm: &acm };
        let result = field.distance_self(&request, &posed(&model, &[0.0])).unwrap();
        assert_eq!(result.min_distance, max_distance);
    }

    #[test]
    fn test_folded_arm_penetrates_base() {
        let model = Arc::new(fixtures::two_link_arm(0.45));
        let field = VoxelDistanceField::build(&model, 0.05, 0.1, 2.0, 2.0).unwrap();
        let result = query(&model, &field, &[0.0, PI]);
        assert!(result.min_distance < 0.0);
        assert_eq!(result.nearest_links, Some(("base".to_string(), "link2".to_string())));
    }

    #[test]
    fn test_measured_gap() {
        // forearm tip stops 0.05 short of the base surface
        let model = Arc::new(fixtures::two_link_arm(0.3));
        let field = VoxelDistanceField::build(&model, 0.05, 0.1, 2.0, 2.0).unwrap();
        let result = query(&model, &field, &[0.0, PI]);
        assert!((result.min_distance - 0.05).abs() < 0.01, "got {}", result.min_distance);
    }

    #[test]
    fn test_allowed_pairs_are_skipped() {
        let model = Arc::new(fixtures::two_link_arm(0.45));
        let field = VoxelDistanceField::build(&model, 0.05, 0.1, 2.0, 2.0).unwrap();
        let mut acm = AllowedCollisionMatrix::from_adjacent_links(&model);
        acm.set_entry("base", "link2", true);
        let request = DistanceRequest { group: model.joint_group(fixtures::GROUP).unwrap(), acm: &acm };
        let result = field.distance_self(&request, &posed(&model, &[0.0, PI])).unwrap();
        assert!((result.min_distance - field.truncation_distance()).abs() < 1e-12);
    }

    #[test]
    fn test_stale_state_is_rejected() {
        let model = Arc::new(fixtures::two_link_arm(0.4));
        let field = VoxelDistanceField::build(&model, 0.05, 0.1, 2.0, 2.0).unwrap();
        let acm = AllowedCollisionMatrix::from_adjacent_links(&model);
        let request = DistanceRequest { group: model.joint_group(fixtures::GROUP).unwrap(), acm: &acm };
        let state = RobotState::new(model.clone());
        assert!(matches!(
            field.distance_self(&request, &state),
            Err(CostFunctionError::StaleRobotState)
        ));
    }

    #[test]
    fn test_malformed_geometry_fails() {
        let model = crate::robot::RobotModelBuilder::new("bad")
            .link("a", vec![CollisionShape::sphere(Point3::origin(), -0.1)])
            .build()
            .unwrap();
        assert!(matches!(
            VoxelDistanceField::build(&model, 0.05, 0.1, 2.0, 2.0),
            Err(CostFunctionError::DistanceField(_))
        ));
    }

    #[test]
    fn test_bad_resolution_fails() {
        let model = fixtures::two_link_arm(0.4);
        assert!(VoxelDistanceField::build(&model, 0.0, 0.1, 2.0, 2.0).is_err());
        assert!(VoxelDistanceField::build(&model, 1e-5, 0.1, 1e4, 1e4).is_err());
    }
}
