use crate::config::SimulationConfig;
use crate::field::ConcentrationField;
use crate::metrics::{self, TARGET_CELL_COUNT};
use crate::population::CellPopulation;
use crate::sim_params::SimParams;
use crate::timing::{Stage, StageTimers, StageTiming};
use anyhow::Result;
use log::{debug, info};
use rand::prelude::*;
use serde::Serialize;
use std::time::Instant;

/// One clustering-quality reading: the pass/fail criterion and the energy score.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClusterReading {
    pub criterion: bool,
    pub energy: f32,
}

/// Scalar results of a complete run, handed to the reporting surface.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Population size at the end of the growth phase.
    pub final_cell_count: usize,
    /// Number of growth-phase iterations it took to reach that size.
    pub growth_steps: u64,
    /// Number of clustering-phase iterations executed.
    pub clustering_steps: u32,
    /// Metrics reading taken before the clustering phase.
    pub pre_clustering: ClusterReading,
    /// Metrics reading taken after the clustering phase.
    pub post_clustering: ClusterReading,
    pub growth_phase_seconds: f64,
    pub clustering_phase_seconds: f64,
    pub total_compute_seconds: f64,
    /// Per-stage elapsed time with its share of total compute time.
    pub stage_timings: Vec<StageTiming>,
}

/// Two-phase simulation driver. Phase 1 grows the population from a single
/// seed cell until the configured final count is reached; phase 2 runs a
/// fixed number of gradient-following clustering steps. Clustering metrics
/// are evaluated once before and once after phase 2.
pub struct Simulation {
    config: SimulationConfig,
    params: SimParams,
    field: ConcentrationField,
    population: CellPopulation,
    /// Host-side RNG for the serial parts (daughter cell placement).
    rng: StdRng,
    growth_steps: u64,
    timers: StageTimers,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();
        let field = ConcentrationField::new(params.resolution);
        let population = CellPopulation::new(params.final_cell_count);
        let rng = StdRng::seed_from_u64(params.seed);

        debug!("Simulation parameters: {:#?}", params);

        Ok(Self {
            config,
            params,
            field,
            population,
            rng,
            growth_steps: 0,
            timers: StageTimers::new(),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn population(&self) -> &CellPopulation {
        &self.population
    }

    /// Substance production, diffusion and decay: the field update shared by
    /// both phases.
    fn field_step(&mut self) {
        let start = Instant::now();
        self.field.produce(self.population.positions(), self.population.types());
        self.timers.add(Stage::Produce, start.elapsed());

        let start = Instant::now();
        self.field.diffuse(self.params.diffusion_constant);
        self.timers.add(Stage::Diffuse, start.elapsed());

        let start = Instant::now();
        self.field.decay(self.params.decay_rate);
        self.timers.add(Stage::Decay, start.elapsed());
    }

    /// One growth-phase iteration.
    fn growth_step(&mut self) {
        self.field_step();

        let start = Instant::now();
        self.population.growth_step(&mut self.rng, &self.params, self.growth_steps);
        self.population.clamp_to_domain();
        self.timers.add(Stage::Growth, start.elapsed());

        self.growth_steps += 1;
    }

    /// One clustering-phase iteration: movement vectors are computed against
    /// a consistent field and applied in a separate pass.
    fn clustering_step(&mut self) {
        self.field_step();

        let start = Instant::now();
        self.population.cluster_step(&self.field, self.params.speed);
        self.population.apply_movement();
        self.population.clamp_to_domain();
        self.timers.add(Stage::Cluster, start.elapsed());
    }

    /// Evaluates both clustering metrics on the current population.
    fn measure(&mut self) -> ClusterReading {
        let positions = self.population.positions();
        let types = self.population.types();

        let start = Instant::now();
        let energy = metrics::energy(positions, types, self.params.spatial_range, TARGET_CELL_COUNT);
        self.timers.add(Stage::Energy, start.elapsed());

        let start = Instant::now();
        let criterion =
            metrics::criterion(positions, types, self.params.spatial_range, TARGET_CELL_COUNT);
        self.timers.add(Stage::Criterion, start.elapsed());

        ClusterReading { criterion, energy }
    }

    /// Runs both phases to completion and returns the collected results.
    pub fn run(&mut self) -> Result<RunReport> {
        // --- Phase 1: random walk and duplication until the target count ---
        info!(
            "Phase 1: growing population to {} cells...",
            self.params.final_cell_count
        );
        let phase1_start = Instant::now();
        while self.population.len() < self.params.final_cell_count {
            self.growth_step();
            if self.growth_steps % 100 == 0 {
                debug!(
                    "growth step {}: {} cells",
                    self.growth_steps,
                    self.population.len()
                );
            }
        }
        let phase1 = phase1_start.elapsed();
        info!(
            "Phase 1 finished: {} cells after {} steps ({:.3} s).",
            self.population.len(),
            self.growth_steps,
            phase1.as_secs_f64()
        );

        // --- Phase 2: movement along substance gradients ---
        // The phase timing brackets both metrics readings.
        let phase2_start = Instant::now();
        let pre_clustering = self.measure();
        info!(
            "Initial clustering: criterion={}, energy={:.6e}",
            pre_clustering.criterion, pre_clustering.energy
        );

        info!(
            "Phase 2: {} clustering steps...",
            self.params.clustering_steps
        );
        for step in 0..self.params.clustering_steps {
            self.clustering_step();
            if step % 50 == 0 {
                debug!("clustering step {} / {}", step, self.params.clustering_steps);
            }
        }

        let post_clustering = self.measure();
        let phase2 = phase2_start.elapsed();
        info!(
            "Final clustering: criterion={}, energy={:.6e}",
            post_clustering.criterion, post_clustering.energy
        );
        info!("Phase 2 finished ({:.3} s).", phase2.as_secs_f64());

        let total = phase1 + phase2;
        Ok(RunReport {
            final_cell_count: self.population.len(),
            growth_steps: self.growth_steps,
            clustering_steps: self.params.clustering_steps,
            pre_clustering,
            post_clustering,
            growth_phase_seconds: phase1.as_secs_f64(),
            clustering_phase_seconds: phase2.as_secs_f64(),
            total_compute_seconds: total.as_secs_f64(),
            stage_timings: self.timers.summary(total),
        })
    }
}
