use anyhow::Result;
use clap::Parser;
use log::info;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

// Define modules used by main
mod config;
mod field;
mod metrics;
mod population;
mod sim_params;
mod simulation;
mod timing;
mod vecmath;

use config::SimulationConfig;
use simulation::Simulation;

/// Clustering of cells in 3D space by movement along the gradients of
/// substances the cells themselves produce, diffuse and decay.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML parameter file.
    #[arg(default_value = "config.toml")]
    config: PathBuf,

    /// Number of Rayon worker threads (defaults to all cores).
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    let args = Args::parse();

    // --- Configure Rayon Thread Pool (Optional) ---
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new().num_threads(threads).build_global()?;
    }
    info!("Starting clustering engine with {} Rayon threads.", rayon::current_num_threads());

    // --- Load Configuration ---
    let config = SimulationConfig::load(&args.config)?;

    // --- Run Simulation ---
    let mut sim = Simulation::new(config)?;
    let report = sim.run()?;

    // --- Report Results ---
    info!("{:<24} {}", "initial criterion", report.pre_clustering.criterion);
    info!("{:<24} {:.6e}", "initial energy", report.pre_clustering.energy);
    info!("{:<24} {}", "final criterion", report.post_clustering.criterion);
    info!("{:<24} {:.6e}", "final energy", report.post_clustering.energy);
    info!("{:<24} {:.3} s", "growth phase", report.growth_phase_seconds);
    info!("{:<24} {:.3} s", "clustering phase", report.clustering_phase_seconds);
    for timing in &report.stage_timings {
        info!(
            "{:<24} {:.3e} s ({:5.2} %)",
            timing.stage, timing.seconds, timing.percent
        );
    }
    info!("{:<24} {:.3} s", "total compute", report.total_compute_seconds);

    // --- Save Report (Optional) ---
    if sim.config().output.save_report {
        let filename = sim.config().output.report_filename.clone();
        let json = serde_json::to_string_pretty(&report)?;
        File::create(&filename)?.write_all(json.as_bytes())?;
        info!("Run report saved to {}", filename);
    }

    Ok(())
}
