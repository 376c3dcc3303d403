use crate::field::ConcentrationField;
use crate::sim_params::SimParams;
use crate::vecmath::{clamp, Vec3};
use rand::prelude::*;
use rand_distr::UnitSphere;
use rayon::prelude::*;

/// Length of the random-walk displacement applied per growth step; also the
/// amount added to a cell's traveled path.
pub const STEP_SIZE: f32 = 0.1;

/// Distance between a parent and its freshly spawned daughter.
pub const DAUGHTER_RADIUS: f32 = 0.05;

/// The two interacting cell populations. Each type produces and follows its
/// own substance and is repelled by the other's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Positive,
    Negative,
}

impl CellType {
    pub fn opposite(self) -> Self {
        match self {
            CellType::Positive => CellType::Negative,
            CellType::Negative => CellType::Positive,
        }
    }

    /// Index of the substance this cell type produces and is attracted to.
    pub fn substance(self) -> usize {
        match self {
            CellType::Positive => 0,
            CellType::Negative => 1,
        }
    }

    pub fn sign(self) -> f32 {
        match self {
            CellType::Positive => 1.0,
            CellType::Negative => -1.0,
        }
    }
}

/// Per-cell state in SoA layout, preallocated to the target final count so
/// indices stay stable and no vector reallocates mid-step.
pub struct CellPopulation {
    count: usize,
    capacity: usize,
    positions: Vec<Vec3>,
    types: Vec<CellType>,
    path_traveled: Vec<f32>,
    division_counts: Vec<u32>,
    /// Movement vectors computed by `cluster_step`, applied in a separate pass.
    movement: Vec<Vec3>,
    /// Division marks from the parallel growth pass, processed serially.
    divide_flags: Vec<u8>,
}

impl CellPopulation {
    /// Starts from a single seed cell at the cube center: type positive,
    /// zero path and zero divisions.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            count: 1,
            capacity,
            positions: vec![Vec3::new(0.5, 0.5, 0.5); capacity],
            types: vec![CellType::Positive; capacity],
            path_traveled: vec![0.0; capacity],
            division_counts: vec![0; capacity],
            movement: vec![Vec3::zero(); capacity],
            divide_flags: vec![0; capacity],
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Positions of all active cells.
    pub fn positions(&self) -> &[Vec3] {
        &self.positions[..self.count]
    }

    /// Types of all active cells.
    pub fn types(&self) -> &[CellType] {
        &self.types[..self.count]
    }

    pub fn division_counts(&self) -> &[u32] {
        &self.division_counts[..self.count]
    }

    /// One growth-phase update: every active cell takes an isotropic
    /// unit-length step scaled by `STEP_SIZE` and accumulates it into its
    /// traveled path; cells whose path crosses the threshold while under the
    /// division limit spawn a daughter. Displacement and eligibility marking
    /// run in parallel over the pre-pass count; the appends are serialized so
    /// each daughter gets a unique consecutive index. Returns the new count.
    pub fn growth_step(&mut self, rng: &mut StdRng, params: &SimParams, step: u64) -> usize {
        let count = self.count;
        let seed = params.seed;
        let div_threshold = params.div_threshold;
        let path_threshold = params.path_threshold;
        let division_counts = &self.division_counts;

        self.positions[..count]
            .par_iter_mut()
            .zip(self.path_traveled[..count].par_iter_mut())
            .zip(self.divide_flags[..count].par_iter_mut())
            .enumerate()
            .for_each(|(idx, ((position, path), flag))| {
                let cell_seed = seed
                    .wrapping_add((idx as u64).wrapping_mul(0x9E37_79B9))
                    .wrapping_add(step.wrapping_mul(0x51_7CC1));
                let mut cell_rng = StdRng::seed_from_u64(cell_seed);

                let direction: [f32; 3] = cell_rng.sample(UnitSphere);
                *position = position.add(Vec3::from_array(direction).scale(STEP_SIZE));
                *path += STEP_SIZE;

                let eligible = division_counts[idx] < div_threshold && *path > path_threshold;
                *flag = u8::from(eligible);
            });

        // Serial append pass over the pre-pass count: cells created here are
        // not themselves processed this step.
        let mut new_count = count;
        for idx in 0..count {
            if self.divide_flags[idx] == 0 {
                continue;
            }
            if new_count >= self.capacity {
                // Population is complete; remaining marks are dropped.
                break;
            }

            self.path_traveled[idx] -= path_threshold;
            self.division_counts[idx] += 1;

            let offset: [f32; 3] = rng.sample(UnitSphere);
            let daughter_position = self
                .positions[idx]
                .add(Vec3::from_array(offset).scale(DAUGHTER_RADIUS));

            self.positions[new_count] = daughter_position;
            self.types[new_count] = self.types[idx].opposite();
            self.division_counts[new_count] = self.division_counts[idx];
            self.path_traveled[new_count] = 0.0;
            self.movement[new_count] = Vec3::zero();
            self.divide_flags[new_count] = 0;
            new_count += 1;
        }

        self.count = new_count;
        new_count
    }

    /// One clustering-phase update: computes each cell's movement vector from
    /// the local substance gradients into the movement buffer. Positions are
    /// untouched here so every gradient read sees consistent state; call
    /// `apply_movement` afterwards.
    pub fn cluster_step(&mut self, field: &ConcentrationField, speed: f32) {
        let positions = &self.positions;
        let types = &self.types;

        self.movement[..self.count]
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, movement)| {
                let (grad0, grad1) = field.gradient_at(positions[idx]);
                let norm0 = grad0.length();
                let norm1 = grad1.length();

                // Cells without an informative gradient on both substances do
                // not move this step.
                *movement = if norm0 > 0.0 && norm1 > 0.0 {
                    grad0
                        .scale(1.0 / norm0)
                        .sub(grad1.scale(1.0 / norm1))
                        .scale(types[idx].sign() * speed)
                } else {
                    Vec3::zero()
                };
            });
    }

    /// Applies the buffered movement vectors to the positions.
    pub fn apply_movement(&mut self) {
        let movement = &self.movement;
        self.positions[..self.count]
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, position)| {
                *position = position.add(movement[idx]);
            });
    }

    /// Clamps every cell back into the unit cube, one coordinate at a time.
    pub fn clamp_to_domain(&mut self) {
        self.positions[..self.count].par_iter_mut().for_each(|position| {
            position.x = clamp(position.x, 0.0, 1.0);
            position.y = clamp(position.y, 0.0, 1.0);
            position.z = clamp(position.z, 0.0, 1.0);
        });
    }
}
