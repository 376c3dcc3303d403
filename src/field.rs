use crate::population::CellType;
use crate::vecmath::Vec3;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// Number of distinct substances carried by the field.
pub const NUM_SUBSTANCES: usize = 2;

/// Concentration deposited into a voxel per producing cell, per step.
pub const PRODUCTION_INCREMENT: f32 = 0.1;

/// Two dense L x L x L scalar fields (one per substance) over the unit cube,
/// stored in a single flat buffer indexed by `(substance, x, y, z)`.
pub struct ConcentrationField {
    resolution: usize,
    voxel_size: f32,
    inv_voxel_size: f32,
    /// Voxels per substance (L^3); also the substance stride into `conc`.
    substance_stride: usize,
    /// Live concentrations: `substance * L^3 + x * L^2 + y * L + z`.
    conc: Vec<f32>,
    /// Step-begin snapshot read by the Jacobi diffusion update.
    scratch: Vec<f32>,
    /// Per-voxel deposit counters; many cells may land in one voxel in the
    /// same step, so production aggregates through atomics.
    deposit_counts: Vec<AtomicU32>,
}

impl ConcentrationField {
    /// Allocates both substance fields at the given per-axis resolution,
    /// initialized to zero concentration everywhere.
    pub fn new(resolution: usize) -> Self {
        let substance_stride = resolution * resolution * resolution;
        let len = NUM_SUBSTANCES * substance_stride;
        Self {
            resolution,
            voxel_size: 1.0 / resolution as f32,
            inv_voxel_size: resolution as f32,
            substance_stride,
            conc: vec![0.0; len],
            scratch: vec![0.0; len],
            deposit_counts: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[inline(always)]
    fn index(&self, substance: usize, x: usize, y: usize, z: usize) -> usize {
        substance * self.substance_stride
            + x * self.resolution * self.resolution
            + y * self.resolution
            + z
    }

    /// Locates the voxel containing a position, clamped to the last valid
    /// index per axis so positions on the far boundary stay in range.
    #[inline(always)]
    pub fn voxel_of(&self, position: Vec3) -> (usize, usize, usize) {
        let last = self.resolution - 1;
        let x = ((position.x * self.inv_voxel_size).floor() as usize).min(last);
        let y = ((position.y * self.inv_voxel_size).floor() as usize).min(last);
        let z = ((position.z * self.inv_voxel_size).floor() as usize).min(last);
        (x, y, z)
    }

    pub fn get(&self, substance: usize, x: usize, y: usize, z: usize) -> f32 {
        self.conc[self.index(substance, x, y, z)]
    }

    pub fn set(&mut self, substance: usize, x: usize, y: usize, z: usize, value: f32) {
        let idx = self.index(substance, x, y, z);
        self.conc[idx] = value;
    }

    /// Sum of one substance's concentration over the whole grid.
    pub fn total(&self, substance: usize) -> f32 {
        let start = substance * self.substance_stride;
        self.conc[start..start + self.substance_stride].iter().sum()
    }

    /// Deposits substance at every cell's voxel: type-positive cells feed
    /// substance 0, type-negative cells substance 1. Voxel values are clamped
    /// to 1.0. Deposits go through atomic counters so concurrent cells
    /// mapping to the same voxel never lose increments.
    pub fn produce(&mut self, positions: &[Vec3], types: &[CellType]) {
        let counts = &self.deposit_counts;
        positions
            .par_iter()
            .zip(types.par_iter())
            .for_each(|(position, cell_type)| {
                let (x, y, z) = self.voxel_of(*position);
                let idx = self.index(cell_type.substance(), x, y, z);
                counts[idx].fetch_add(1, Ordering::Relaxed);
            });

        self.conc
            .par_iter_mut()
            .zip(self.deposit_counts.par_iter())
            .for_each(|(value, count)| {
                let deposits = count.swap(0, Ordering::Relaxed);
                if deposits > 0 {
                    *value = (*value + PRODUCTION_INCREMENT * deposits as f32).min(1.0);
                }
            });
    }

    /// One explicit finite-difference diffusion step for both substances.
    /// Reads a step-begin snapshot and writes the live buffer (Jacobi, not
    /// Gauss-Seidel). Neighbors outside the grid contribute nothing, so
    /// boundary voxels diffuse asymmetrically.
    pub fn diffuse(&mut self, diffusion_constant: f32) {
        self.scratch.copy_from_slice(&self.conc);

        let rate = diffusion_constant / 6.0;
        let l = self.resolution;
        let plane = l * l;
        let stride = self.substance_stride;
        let snapshot = &self.scratch;

        self.conc.par_iter_mut().enumerate().for_each(|(idx, live)| {
            let local = idx % stride;
            let x = local / plane;
            let y = (local / l) % l;
            let z = local % l;

            let center = snapshot[idx];
            let mut exchange = 0.0f32;
            if x + 1 < l {
                exchange += snapshot[idx + plane] - center;
            }
            if x > 0 {
                exchange += snapshot[idx - plane] - center;
            }
            if y + 1 < l {
                exchange += snapshot[idx + l] - center;
            }
            if y > 0 {
                exchange += snapshot[idx - l] - center;
            }
            if z + 1 < l {
                exchange += snapshot[idx + 1] - center;
            }
            if z > 0 {
                exchange += snapshot[idx - 1] - center;
            }
            *live += exchange * rate;
        });
    }

    /// Scales every voxel of both fields by `1 - decay_rate`.
    pub fn decay(&mut self, decay_rate: f32) {
        let keep = 1.0 - decay_rate;
        self.conc.par_iter_mut().for_each(|value| *value *= keep);
    }

    /// Finite-difference concentration gradients of both substances at a
    /// position. Neighbor indices are clamped per axis, so at the grid
    /// boundary this degenerates to a one-sided difference with the
    /// correspondingly smaller spacing.
    pub fn gradient_at(&self, position: Vec3) -> (Vec3, Vec3) {
        let (x, y, z) = self.voxel_of(position);
        let last = self.resolution - 1;

        let x_up = (x + 1).min(last);
        let x_down = x.saturating_sub(1);
        let y_up = (y + 1).min(last);
        let y_down = y.saturating_sub(1);
        let z_up = (z + 1).min(last);
        let z_down = z.saturating_sub(1);

        // Nonzero for any resolution >= 2, which configuration validation guarantees.
        let dx = self.voxel_size * (x_up - x_down) as f32;
        let dy = self.voxel_size * (y_up - y_down) as f32;
        let dz = self.voxel_size * (z_up - z_down) as f32;

        let gradient = |substance: usize| {
            Vec3::new(
                (self.get(substance, x_up, y, z) - self.get(substance, x_down, y, z)) / dx,
                (self.get(substance, x, y_up, z) - self.get(substance, x, y_down, z)) / dy,
                (self.get(substance, x, y, z_up) - self.get(substance, x, y, z_down)) / dz,
            )
        };
        (gradient(0), gradient(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxel_of_clamps_far_boundary() {
        let field = ConcentrationField::new(8);
        assert_eq!(field.voxel_of(Vec3::new(1.0, 1.0, 1.0)), (7, 7, 7));
        assert_eq!(field.voxel_of(Vec3::new(0.0, 0.0, 0.0)), (0, 0, 0));
        assert_eq!(field.voxel_of(Vec3::new(0.5, 0.5, 0.5)), (4, 4, 4));
    }

    #[test]
    fn test_produce_routes_type_to_substance() {
        let mut field = ConcentrationField::new(4);
        let positions = vec![Vec3::new(0.1, 0.1, 0.1), Vec3::new(0.9, 0.9, 0.9)];
        let types = vec![CellType::Positive, CellType::Negative];
        field.produce(&positions, &types);

        assert!((field.get(0, 0, 0, 0) - PRODUCTION_INCREMENT).abs() < 1e-6);
        assert_eq!(field.get(1, 0, 0, 0), 0.0);
        assert!((field.get(1, 3, 3, 3) - PRODUCTION_INCREMENT).abs() < 1e-6);
        assert_eq!(field.get(0, 3, 3, 3), 0.0);
    }

    #[test]
    fn test_produce_clamps_at_one() {
        let mut field = ConcentrationField::new(4);
        // 30 cells in the same voxel would deposit 3.0 unclamped.
        let positions = vec![Vec3::new(0.5, 0.5, 0.5); 30];
        let types = vec![CellType::Positive; 30];
        field.produce(&positions, &types);

        let (x, y, z) = field.voxel_of(Vec3::new(0.5, 0.5, 0.5));
        assert_eq!(field.get(0, x, y, z), 1.0);
        for value in &field.conc {
            assert!((0.0..=1.0).contains(value));
        }
    }

    #[test]
    fn test_decay_scales_exactly() {
        let mut field = ConcentrationField::new(4);
        field.set(0, 1, 2, 3, 0.8);
        field.set(1, 0, 0, 0, 0.3);
        field.decay(0.25);
        assert!((field.get(0, 1, 2, 3) - 0.8 * 0.75).abs() < 1e-6);
        assert!((field.get(1, 0, 0, 0) - 0.3 * 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_diffusion_spreads_from_point() {
        let mut field = ConcentrationField::new(8);
        field.set(0, 4, 4, 4, 1.0);
        field.diffuse(0.6);

        assert!(field.get(0, 4, 4, 4) < 1.0);
        assert!(field.get(0, 5, 4, 4) > 0.0);
        assert!(field.get(0, 3, 4, 4) > 0.0);
        // Non-adjacent voxels are untouched after a single step.
        assert_eq!(field.get(0, 6, 4, 4), 0.0);
        // The other substance is independent.
        assert_eq!(field.total(1), 0.0);
    }

    #[test]
    fn test_diffusion_conserves_total() {
        // The pairwise exchange form conserves the field sum to floating
        // point error, boundary voxels included.
        let mut field = ConcentrationField::new(8);
        field.set(0, 4, 4, 4, 0.8);
        field.set(0, 0, 0, 0, 0.5);
        let before = field.total(0);
        for _ in 0..5 {
            field.diffuse(0.6);
        }
        let after = field.total(0);
        assert!((before - after).abs() < 1e-4, "sum drifted: {} -> {}", before, after);
    }

    #[test]
    fn test_gradient_of_linear_ramp() {
        let l = 8;
        let mut field = ConcentrationField::new(l);
        for x in 0..l {
            for y in 0..l {
                for z in 0..l {
                    field.set(0, x, y, z, x as f32 * 0.1);
                }
            }
        }

        // A linear ramp has the same slope through centered and one-sided
        // differences alike.
        let expected = 0.1 * l as f32;
        for probe in [
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(0.01, 0.5, 0.5),
            Vec3::new(0.99, 0.5, 0.5),
        ] {
            let (grad0, grad1) = field.gradient_at(probe);
            assert!((grad0.x - expected).abs() < 1e-3, "at {:?}: {}", probe, grad0.x);
            assert!(grad0.y.abs() < 1e-6);
            assert!(grad0.z.abs() < 1e-6);
            assert_eq!(grad1, Vec3::zero());
        }
    }
}
