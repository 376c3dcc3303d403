use serde::{Deserialize, Serialize};

/// Runtime parameters derived from the configuration, used frequently during simulation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Grid
    pub resolution: usize, // voxels per axis (L)

    // Field dynamics
    pub diffusion_constant: f32,
    pub decay_rate: f32,

    // Growth phase
    pub final_cell_count: usize,
    pub div_threshold: u32,
    pub path_threshold: f32,

    // Clustering phase
    pub clustering_steps: u32,
    pub speed: f32,

    // Metrics
    pub spatial_range: f32,

    // Reproducibility
    pub seed: u64,
}
