// Compare a trained correction network against the naive follower.
// usage: cargo run --bin evaluate -- --checkpoint car_model.json --plot eval.png
use std::path::PathBuf;
use std::process::ExitCode;

use burn::backend::ndarray::NdArrayDevice;
use clap::Parser;
use log::{error, info};
use num_dual::Dual64;

use spline_tracking::common::{Config, Environment, TrackingResult};
use spline_tracking::control::{ClosedLoop, DirectLoop, ResidualLoop};
use spline_tracking::learning::{adam, Checkpoint, Mlp, Trainer, TrainingBackend};
use spline_tracking::models::{DubinsCar, LeggedRobot};
use spline_tracking::path_tracking::{DubinsTrackingController, LeggedTrackingController};
use spline_tracking::utils::{logger_init, plot_evaluation, verbosity_level};

/// Evaluate a trained correction network
#[derive(Parser)]
#[command(name = "evaluate")]
#[command(version)]
struct Cli {
    /// Checkpoint produced by `train`
    #[arg(long)]
    checkpoint: PathBuf,

    /// Override the configuration stored in the checkpoint
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of random tasks
    #[arg(short, long, default_value = "2")]
    trials: usize,

    /// Write losses of every trial as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Save a plot of every trial, `<plot>_<trial>.png`
    #[arg(long)]
    plot: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn evaluate<L: ClosedLoop>(
    cli: &Cli,
    config: Config,
    model: Mlp<TrainingBackend>,
    closed_loop: L,
) -> TrackingResult<()> {
    let mut trainer = Trainer::new(config, model, closed_loop, adam())?;
    let mut losses = Vec::with_capacity(cli.trials);

    for trial in 0..cli.trials {
        let task = trainer.sample_task()?;
        let evaluation = trainer.evaluate(&task)?;
        info!(
            "trial {}: model loss {:.3}, naive loss {:.3}",
            trial, evaluation.corrected_loss, evaluation.naive_loss
        );
        if let Some(plot) = &cli.plot {
            let path = format!("{}_{}.png", plot.with_extension("").display(), trial);
            plot_evaluation(&evaluation).save_png(&path, 1200, 900)?;
        }
        losses.push((evaluation.corrected_loss, evaluation.naive_loss));
    }

    let trials = losses.len().max(1) as f64;
    let model_avg = losses.iter().map(|l| l.0).sum::<f64>() / trials;
    let naive_avg = losses.iter().map(|l| l.1).sum::<f64>() / trials;
    info!("average model loss {:.3}, average naive loss {:.3}", model_avg, naive_avg);

    if let Some(path) = &cli.output {
        let report = serde_json::json!({
            "trials": losses.iter().map(|l| serde_json::json!({"model": l.0, "naive": l.1})).collect::<Vec<_>>(),
            "model_avg": model_avg,
            "naive_avg": naive_avg,
        });
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }
    Ok(())
}

fn run(cli: &Cli) -> TrackingResult<()> {
    let checkpoint = Checkpoint::load(&cli.checkpoint)?;
    let model = checkpoint.model::<TrainingBackend>(&NdArrayDevice::default())?;
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => checkpoint.config,
    };

    let horizon = config.horizon as f64;
    let dt = config.dt;
    match (config.environment, config.nominal_dynamics()) {
        (Environment::Car, None) => {
            let car = DubinsCar::<Dual64>::new(config.dynamics(), horizon, dt)?;
            let closed_loop = DirectLoop::new(car, DubinsTrackingController::new(config.gains()));
            evaluate(cli, config, model, closed_loop)
        }
        (Environment::Car, Some(nominal)) => {
            let closed_loop = ResidualLoop::new(
                DubinsCar::<f64>::new(config.dynamics(), horizon, dt)?,
                DubinsCar::<Dual64>::new(nominal, horizon, dt)?,
                DubinsTrackingController::new(config.gains()),
            );
            evaluate(cli, config, model, closed_loop)
        }
        (Environment::Robot, None) => {
            let robot = LeggedRobot::<Dual64>::new(config.dynamics(), horizon, dt)?;
            let closed_loop = DirectLoop::new(robot, LeggedTrackingController::new(config.gains()));
            evaluate(cli, config, model, closed_loop)
        }
        (Environment::Robot, Some(nominal)) => {
            let closed_loop = ResidualLoop::new(
                LeggedRobot::<f64>::new(config.dynamics(), horizon, dt)?,
                LeggedRobot::<Dual64>::new(nominal, horizon, dt)?,
                LeggedTrackingController::new(config.gains()),
            );
            evaluate(cli, config, model, closed_loop)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logger_init(verbosity_level(cli.verbose)) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
