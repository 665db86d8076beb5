//! CLI Entry Point for rust-scope
//!
//! Runs multi-point acquisitions against simulated hardware:
//! - `run`: execute the experiment described by a run file
//! - `plan`: print the planned regions and image count without moving anything
//!
//! # Usage
//!
//! ```bash
//! scope-acquire run --config config/scope.toml
//! scope-acquire run --config config/scope.toml --experiment overnight --output /data
//! scope-acquire plan --config config/scope.toml
//! ```
//!
//! Logging follows `RUST_LOG`, falling back to `application.log_level`.
//! Ctrl-C aborts a running acquisition after the current FOV.

// Global allocator
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scope_acquisition::{
    AcquisitionCallbacks, Microscope, MultiPointController, RunOutcome, RunSummary,
};
use scope_core::mode_gate::AtomicModeGate;
use scope_core::planner::CoordinatePlanner;
use scope_driver_mock::{
    GridPlanner, MockAutofocus, MockCamera, MockFluidics, MockIlluminator, MockPiezo, MockStage,
};
use settings::{RunConfig, SimulationConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scope-acquire")]
#[command(about = "Multi-point microscope acquisition on simulated hardware", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the experiment in a run file
    Run {
        /// Run file (TOML)
        #[arg(long, default_value = "config/scope.toml")]
        config: PathBuf,

        /// Override `experiment.name`
        #[arg(long)]
        experiment: Option<String>,

        /// Override the output root
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the scan plan and expected image count
    Plan {
        /// Run file (TOML)
        #[arg(long, default_value = "config/scope.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Commands::Run { config, .. } | Commands::Plan { config } => config.clone(),
    };
    let mut config = match RunConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.scope.application.log_level);

    let result = match cli.command {
        Commands::Run {
            experiment, output, ..
        } => {
            if let Some(name) = experiment {
                config.experiment.name = name;
            }
            if let Some(dir) = output {
                config.experiment.base_path = Some(dir);
            }
            run(config).await
        }
        Commands::Plan { .. } => plan(&config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "scope-acquire failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn planner(sim: &SimulationConfig) -> GridPlanner {
    GridPlanner::new(sim.regions.clone()).serpentine(sim.serpentine)
}

/// Assemble the simulated microscope described by `[simulation]`.
fn build_microscope(sim: &SimulationConfig) -> Microscope {
    let stage = MockStage::builder().mode(sim.mode).build();
    let camera = MockCamera::builder(sim.camera_width, sim.camera_height)
        .color(sim.color_camera)
        .mode(sim.mode)
        .build();
    let lights = MockIlluminator::new();

    let mut microscope = Microscope::new(Arc::new(stage), Arc::new(camera), Arc::new(lights));
    if let Some(um) = sim.piezo_um {
        microscope = microscope.with_piezo(Arc::new(MockPiezo::new(um)));
    }
    if sim.contrast_autofocus {
        microscope = microscope.with_contrast_autofocus(Arc::new(MockAutofocus::new()));
    }
    if sim.laser_autofocus {
        microscope = microscope.with_laser_autofocus(Arc::new(MockAutofocus::new()));
    }
    if sim.fluidics {
        microscope = microscope.with_fluidics(Arc::new(MockFluidics::new()));
    }
    microscope
}

fn plan(config: &RunConfig) -> Result<ExitCode> {
    let regions = planner(&config.simulation)
        .compute_scan_positions()
        .context("Planning failed")?;
    let params = config.parameters();

    let mut total_fovs = 0;
    for region in &regions {
        println!(
            "{:<12} {:>5} FOVs  first ({:.3}, {:.3}) mm",
            region.name,
            region.fovs.len(),
            region.fovs.first().map_or(f64::NAN, |f| f.x_mm),
            region.fovs.first().map_or(f64::NAN, |f| f.y_mm),
        );
        total_fovs += region.fovs.len();
    }
    println!();
    println!("Regions:      {}", regions.len());
    println!("FOVs:         {}", total_fovs);
    let images = params
        .image_count(total_fovs)
        .context("Image count overflows")?;
    println!("Images:       {}", images);
    println!("Output:       {}", params.experiment_dir().display());
    Ok(ExitCode::SUCCESS)
}

async fn run(config: RunConfig) -> Result<ExitCode> {
    let params = config.parameters();
    let controller = MultiPointController::new(
        build_microscope(&config.simulation),
        Arc::new(planner(&config.simulation)),
        Arc::new(AtomicModeGate::new()),
        config.scope.clone(),
    );

    let expected = controller.expected_image_count(&params)?;
    controller.register_callbacks(
        AcquisitionCallbacks::new()
            .on_overall_progress(|p| {
                tracing::info!(
                    region = p.current_region,
                    regions = p.total_regions,
                    timepoint = p.current_timepoint,
                    timepoints = p.total_timepoints,
                    "Progress"
                );
            })
            .on_capture(move |info| {
                if (info.capture_index + 1) % 100 == 0 {
                    tracing::info!(captured = info.capture_index + 1, expected, "Captured");
                }
            }),
    );

    controller.run_acquisition(params).await?;

    let abort = controller.abort_handle();
    let ctrl_c = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, aborting acquisition");
            abort.abort();
        }
    });

    let summary = controller.wait_for_completion().await;
    ctrl_c.abort();

    match summary {
        Some(summary) => {
            print_summary(&summary);
            Ok(if summary.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        None => anyhow::bail!("acquisition ended without a summary"),
    }
}

fn print_summary(summary: &RunSummary) {
    let outcome = match &summary.outcome {
        RunOutcome::Completed => "completed".to_string(),
        RunOutcome::Aborted => "aborted".to_string(),
        RunOutcome::Failed(reason) => format!("failed: {}", reason),
    };
    println!();
    println!("Experiment:   {}", summary.experiment_id);
    println!("Outcome:      {}", outcome);
    println!(
        "Images:       {} of {}",
        summary.captures, summary.expected_captures
    );
    println!(
        "Saved:        {} of {} ({} failed, {} abandoned)",
        summary.jobs_succeeded,
        summary.jobs_submitted,
        summary.failed_jobs.len(),
        summary.abandoned_jobs.len()
    );
    for err in &summary.region_errors {
        println!("Skipped:      t={} {}: {}", err.timepoint, err.region, err.message);
    }
    for miss in &summary.autofocus_failures {
        println!(
            "AF missed:    t={} {} FOV {}: {}",
            miss.timepoint, miss.region, miss.fov, miss.message
        );
    }
    println!("Elapsed:      {:.1} s", summary.elapsed.as_secs_f64());
}
