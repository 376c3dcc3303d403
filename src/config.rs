use crate::sim_params::SimParams;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Configuration for the diffusion grid
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GridConfig {
    pub resolution: usize,
    pub diffusion_constant: f32,
    pub decay_rate: f32,
}

// Configuration for the growth phase and the cell population
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PopulationConfig {
    pub final_cell_count: usize,
    pub div_threshold: u32,
    pub path_threshold: f32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    0
}

// Configuration for the clustering phase
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ClusteringConfig {
    pub steps: u32,
    pub speed: f32,
}

// Configuration for the clustering metrics
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MetricsConfig {
    pub spatial_range: f32,
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default)]
    pub save_report: bool,
    #[serde(default = "default_report_filename")]
    pub report_filename: String,
}

fn default_report_filename() -> String {
    "run_report.json".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            save_report: false,
            report_filename: default_report_filename(),
        }
    }
}

// Main simulation configuration structure, loaded from a TOML parameter file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub population: PopulationConfig,
    pub clustering: ClusteringConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects every configuration the engine is not prepared to run.
    /// The engine assumes validated inputs and does not re-check them per step.
    pub fn validate(&self) -> Result<()> {
        // A 1-voxel grid degenerates the gradient denominator to zero.
        if self.grid.resolution < 2 {
            anyhow::bail!("grid.resolution must be at least 2, got {}.", self.grid.resolution);
        }
        if !self.grid.diffusion_constant.is_finite() || self.grid.diffusion_constant < 0.0 {
            anyhow::bail!("grid.diffusion_constant must be finite and non-negative.");
        }
        if !(0.0..=1.0).contains(&self.grid.decay_rate) {
            anyhow::bail!("grid.decay_rate must lie in [0, 1], got {}.", self.grid.decay_rate);
        }
        if self.population.final_cell_count < 1 {
            anyhow::bail!("population.final_cell_count must be at least 1.");
        }
        if !(self.population.path_threshold > 0.0) {
            anyhow::bail!("population.path_threshold must be positive.");
        }
        if !(self.metrics.spatial_range > 0.0) {
            anyhow::bail!("metrics.spatial_range must be positive.");
        }
        if !self.clustering.speed.is_finite() {
            anyhow::bail!("clustering.speed must be finite.");
        }
        Ok(())
    }

    /// Converts the configuration into the flat parameter record used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        SimParams {
            resolution: self.grid.resolution,
            diffusion_constant: self.grid.diffusion_constant,
            decay_rate: self.grid.decay_rate,
            final_cell_count: self.population.final_cell_count,
            div_threshold: self.population.div_threshold,
            path_threshold: self.population.path_threshold,
            clustering_steps: self.clustering.steps,
            speed: self.clustering.speed,
            spatial_range: self.metrics.spatial_range,
            seed: self.population.seed,
        }
    }
}
