//! Dense 3D grid of sampled signed distances

use itertools::iproduct;
use nalgebra::{Point3, Vector3};

use crate::common::{CostFunctionError, CostFunctionResult};

/// Scalar field sampled at the nodes of a regular grid
///
/// Node (i, j, k) sits at `origin + voxel_size * (i, j, k)`. Values are stored
/// x-fastest.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    origin: Point3<f64>,
    voxel_size: f64,
    dims: [usize; 3],
    values: Vec<f64>,
}

impl VoxelGrid {
    /// Sample `f` over the box [min, max], refusing grids above `max_voxels` nodes
    pub fn from_fn<F>(
        min: Point3<f64>,
        max: Point3<f64>,
        voxel_size: f64,
        max_voxels: usize,
        f: F,
    ) -> CostFunctionResult<Self>
    where
        F: Fn(&Point3<f64>) -> f64,
    {
        if !(voxel_size.is_finite() && voxel_size > 0.0) {
            return Err(CostFunctionError::DistanceField(format!(
                "voxel size must be positive and finite, got {}",
                voxel_size
            )));
        }
        let extent = max - min;
        if !extent.iter().all(|e| e.is_finite() && *e >= 0.0) {
            return Err(CostFunctionError::DistanceField(format!(
                "invalid grid bounds {:?} .. {:?}",
                min, max
            )));
        }

        // count nodes in f64 so tiny voxels cannot overflow the cast
        let too_large = |nodes: String| {
            CostFunctionError::DistanceField(format!(
                "grid of {} voxels exceeds the limit of {}",
                nodes, max_voxels
            ))
        };
        let mut dims = [0usize; 3];
        for axis in 0..3 {
            let count = (extent[axis] / voxel_size).ceil() + 1.0;
            if !(count.is_finite() && count <= max_voxels as f64) {
                return Err(too_large(format!("{:e} along axis {}", count, axis)));
            }
            dims[axis] = (count as usize).max(2);
        }
        let total = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .filter(|&n| n <= max_voxels)
            .ok_or_else(|| too_large(format!("{}x{}x{}", dims[0], dims[1], dims[2])))?;

        let mut values = Vec::with_capacity(total);
        for (k, j, i) in iproduct!(0..dims[2], 0..dims[1], 0..dims[0]) {
            let p = min + Vector3::new(i as f64, j as f64, k as f64) * voxel_size;
            values.push(f(&p));
        }

        Ok(Self { origin: min, voxel_size, dims, values })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn voxel_count(&self) -> usize {
        self.values.len()
    }

    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<f64> {
        if i < self.dims[0] && j < self.dims[1] && k < self.dims[2] {
            Some(self.values[self.index(i, j, k)])
        } else {
            None
        }
    }

    /// Trilinear interpolation at `p`, `None` outside the grid
    pub fn sample(&self, p: &Point3<f64>) -> Option<f64> {
        let g = (p - self.origin) / self.voxel_size;
        let mut base = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            let upper = (self.dims[axis] - 1) as f64;
            if !(g[axis] >= 0.0 && g[axis] <= upper) {
                return None;
            }
            let cell = (g[axis].floor() as usize).min(self.dims[axis] - 2);
            base[axis] = cell;
            frac[axis] = g[axis] - cell as f64;
        }

        let [i, j, k] = base;
        let [tx, ty, tz] = frac;
        let v = |di: usize, dj: usize, dk: usize| self.values[self.index(i + di, j + dj, k + dk)];
        let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;

        let c00 = lerp(v(0, 0, 0), v(1, 0, 0), tx);
        let c10 = lerp(v(0, 1, 0), v(1, 1, 0), tx);
        let c01 = lerp(v(0, 0, 1), v(1, 0, 1), tx);
        let c11 = lerp(v(0, 1, 1), v(1, 1, 1), tx);
        let c0 = lerp(c00, c10, ty);
        let c1 = lerp(c01, c11, ty);
        Some(lerp(c0, c1, tz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_field_is_exact() {
        let grid = VoxelGrid::from_fn(
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, 1.0),
            0.25,
            1_000_000,
            |p| p.x + 2.0 * p.y - p.z,
        )
        .unwrap();

        assert_eq!(grid.dims(), [9, 9, 9]);
        let p = Point3::new(0.13, -0.42, 0.77);
        let value = grid.sample(&p).unwrap();
        assert!((value - (p.x + 2.0 * p.y - p.z)).abs() < 1e-9);

        // upper corner is inside
        assert!(grid.sample(&Point3::new(1.0, 1.0, 1.0)).is_some());
        assert!(grid.sample(&Point3::new(1.01, 0.0, 0.0)).is_none());
        assert!(grid.sample(&Point3::new(0.0, f64::NAN, 0.0)).is_none());
    }

    #[test]
    fn test_node_values() {
        let grid = VoxelGrid::from_fn(Point3::origin(), Point3::new(1.0, 1.0, 1.0), 0.5, 100, |p| {
            p.x * 100.0 + p.y * 10.0 + p.z
        })
        .unwrap();
        assert_eq!(grid.voxel_count(), 27);
        assert!((grid.get(2, 1, 0).unwrap() - 105.0).abs() < 1e-9);
        assert!(grid.get(3, 0, 0).is_none());
    }

    #[test]
    fn test_voxel_limit() {
        let result = VoxelGrid::from_fn(Point3::origin(), Point3::new(10.0, 10.0, 10.0), 0.01, 1000, |_| 0.0);
        assert!(matches!(result, Err(CostFunctionError::DistanceField(_))));
    }

    #[test]
    fn test_tiny_voxels_are_rejected() {
        let max = Point3::new(1.0, 1.0, 1.0);
        for voxel_size in [1e-300, f64::MIN_POSITIVE, 0.0, -0.1, f64::NAN] {
            let result = VoxelGrid::from_fn(Point3::origin(), max, voxel_size, 1 << 24, |_| 0.0);
            assert!(
                matches!(result, Err(CostFunctionError::DistanceField(_))),
                "voxel size {} was accepted",
                voxel_size
            );
        }
    }
}
