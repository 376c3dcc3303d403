use serde::Serialize;
use std::time::Duration;

/// The individually timed stages of a simulation step and of the metrics
/// evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Produce,
    Diffuse,
    Decay,
    Growth,
    Cluster,
    Energy,
    Criterion,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Produce,
        Stage::Diffuse,
        Stage::Decay,
        Stage::Growth,
        Stage::Cluster,
        Stage::Energy,
        Stage::Criterion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Produce => "produce",
            Stage::Diffuse => "diffuse",
            Stage::Decay => "decay",
            Stage::Growth => "growth",
            Stage::Cluster => "cluster",
            Stage::Energy => "energy",
            Stage::Criterion => "criterion",
        }
    }
}

/// Accumulated wall time per stage. Owned by the driver and surfaced through
/// the run report; there is no process-wide timing state.
#[derive(Debug, Default)]
pub struct StageTimers {
    totals: [Duration; Stage::ALL.len()],
}

/// One row of the timing summary.
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: &'static str,
    pub seconds: f64,
    pub percent: f64,
}

impl StageTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, stage: Stage, elapsed: Duration) {
        self.totals[stage as usize] += elapsed;
    }

    pub fn total(&self, stage: Stage) -> Duration {
        self.totals[stage as usize]
    }

    /// Per-stage elapsed seconds with the share of the given compute total.
    pub fn summary(&self, total_compute: Duration) -> Vec<StageTiming> {
        let total_seconds = total_compute.as_secs_f64();
        Stage::ALL
            .iter()
            .map(|&stage| {
                let seconds = self.totals[stage as usize].as_secs_f64();
                let percent = if total_seconds > 0.0 {
                    seconds * 100.0 / total_seconds
                } else {
                    0.0
                };
                StageTiming { stage: stage.name(), seconds, percent }
            })
            .collect()
    }
}
