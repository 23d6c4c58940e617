//! Memoized distance field construction
//!
//! Building a field costs roughly robot volume / voxel_size^3, so the field is
//! kept for the life of the cost function and rebuilt only when the robot
//! model, the voxel size or the max distance changes.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};
use ordered_float::OrderedFloat;

use crate::common::CostFunctionResult;
use crate::distance_field::VoxelDistanceField;
use crate::robot::RobotModel;

/// Construction parameters identifying a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DistanceFieldKey {
    pub model_fingerprint: u64,
    pub voxel_size: OrderedFloat<f64>,
    pub max_distance: OrderedFloat<f64>,
}

impl DistanceFieldKey {
    pub fn new(model: &RobotModel, voxel_size: f64, max_distance: f64) -> Self {
        Self {
            model_fingerprint: model.fingerprint(),
            voxel_size: OrderedFloat(voxel_size),
            max_distance: OrderedFloat(max_distance),
        }
    }

    /// Truncation band in voxels, used for both the inner and outer side
    pub fn bandwidth(&self) -> f64 {
        self.max_distance.0 / self.voxel_size.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct DistanceFieldCache {
    entry: Option<(DistanceFieldKey, Arc<VoxelDistanceField>)>,
    builds: usize,
}

impl DistanceFieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field for the given parameters, building it only if the key changed
    ///
    /// A failed build leaves the previously cached field in place.
    pub fn acquire(
        &mut self,
        name: &str,
        model: &RobotModel,
        voxel_size: f64,
        max_distance: f64,
    ) -> CostFunctionResult<Arc<VoxelDistanceField>> {
        let key = DistanceFieldKey::new(model, voxel_size, max_distance);
        if let Some((cached_key, field)) = &self.entry {
            if *cached_key == key {
                debug!("{} reusing distance field for '{}'", name, model.name());
                return Ok(Arc::clone(field));
            }
        }

        let start = Instant::now();
        info!("{} creating distance field", name);
        let bandwidth = key.bandwidth();
        let field = VoxelDistanceField::build(model, voxel_size, max_distance, bandwidth, bandwidth)
            .map_err(|e| {
                error!("{} failed to create distance field: {}", name, e);
                e
            })?;
        info!(
            "{} completed distance field ({} voxels) after {:.3} seconds",
            name,
            field.voxel_count(),
            start.elapsed().as_secs_f64()
        );

        let field = Arc::new(field);
        self.entry = Some((key, Arc::clone(&field)));
        self.builds += 1;
        Ok(field)
    }

    pub fn current(&self) -> Option<&Arc<VoxelDistanceField>> {
        self.entry.as_ref().map(|(_, field)| field)
    }

    pub fn key(&self) -> Option<DistanceFieldKey> {
        self.entry.as_ref().map(|(key, _)| *key)
    }

    /// Number of fields built by this cache so far
    pub fn builds(&self) -> usize {
        self.builds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::fixtures;

    #[test]
    fn test_same_key_is_not_rebuilt() {
        let model = fixtures::two_link_arm(0.4);
        let mut cache = DistanceFieldCache::new();

        let first = cache.acquire("test", &model, 0.05, 0.1).unwrap();
        let second = cache.acquire("test", &model, 0.05, 0.1).unwrap();
        assert_eq!(cache.builds(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!((cache.key().unwrap().bandwidth() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_changed_key_rebuilds() {
        let model = fixtures::two_link_arm(0.4);
        let mut cache = DistanceFieldCache::new();

        cache.acquire("test", &model, 0.05, 0.1).unwrap();
        cache.acquire("test", &model, 0.04, 0.1).unwrap();
        cache.acquire("test", &model, 0.04, 0.12).unwrap();
        assert_eq!(cache.builds(), 3);

        let other = fixtures::two_link_arm(0.3);
        cache.acquire("test", &other, 0.04, 0.12).unwrap();
        assert_eq!(cache.builds(), 4);
    }

    #[test]
    fn test_failed_build_keeps_previous_field() {
        let model = fixtures::two_link_arm(0.4);
        let mut cache = DistanceFieldCache::new();
        cache.acquire("test", &model, 0.05, 0.1).unwrap();

        assert!(cache.acquire("test", &model, -1.0, 0.1).is_err());
        assert_eq!(cache.builds(), 1);
        assert!((cache.current().unwrap().voxel_size() - 0.05).abs() < 1e-12);
    }
}
