// Train the waypoint correction network on randomly generated tasks.
// usage: cargo run --bin train -- --config config/car.toml --output car_model.json
use std::path::PathBuf;
use std::process::ExitCode;

use burn::backend::ndarray::NdArrayDevice;
use burn::module::Module;
use clap::Parser;
use log::{error, info};
use num_dual::Dual64;

use spline_tracking::common::{Config, Environment, TrackingResult};
use spline_tracking::control::{ClosedLoop, DirectLoop, ResidualLoop};
use spline_tracking::learning::{
    adam, initial_model, Checkpoint, IterationReport, Mlp, Trainer, TrainingBackend,
};
use spline_tracking::models::{DubinsCar, LeggedRobot};
use spline_tracking::path_tracking::{DubinsTrackingController, LeggedTrackingController};
use spline_tracking::utils::{logger_init, plot_evaluation, verbosity_level};

/// Train a waypoint correction network
#[derive(Parser)]
#[command(name = "train")]
#[command(version)]
struct Cli {
    /// Run configuration (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Checkpoint written after every iteration
    #[arg(short, long, default_value = "checkpoint.json")]
    output: PathBuf,

    /// Resume from an earlier checkpoint instead of a fresh network
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Save a plot of one evaluation task after training
    #[arg(long)]
    plot: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn train<L: ClosedLoop>(
    cli: &Cli,
    config: Config,
    model: Mlp<TrainingBackend>,
    history: Vec<IterationReport>,
    closed_loop: L,
) -> TrackingResult<()> {
    let mut trainer = Trainer::new(config, model, closed_loop, adam())?.with_history(history);
    let history = trainer.train(Some(cli.output.as_path()))?;
    let skipped = history.iter().filter(|r| r.skipped).count();
    info!(
        "finished {} iterations ({} skipped), checkpoint at {}",
        history.len(),
        skipped,
        cli.output.display()
    );

    if let Some(path) = &cli.plot {
        let task = trainer.sample_task()?;
        let evaluation = trainer.evaluate(&task)?;
        plot_evaluation(&evaluation).save_png(&path.to_string_lossy(), 1200, 900)?;
    }
    Ok(())
}

fn run(cli: &Cli) -> TrackingResult<()> {
    let config = Config::load(&cli.config)?;
    let device = NdArrayDevice::default();

    // Adam moments are not checkpointed and restart from zero
    let (model, history) = match &cli.checkpoint {
        Some(path) => {
            let checkpoint = Checkpoint::load(path)?;
            info!("resuming after {} iterations", checkpoint.history.len());
            (checkpoint.model::<TrainingBackend>(&device)?, checkpoint.history)
        }
        None => (initial_model::<TrainingBackend>(&config, &device)?, Vec::new()),
    };
    info!(
        "training {:?} model {:?} with {} parameters",
        config.environment,
        model.topology(),
        model.num_params()
    );

    let horizon = config.horizon as f64;
    let dt = config.dt;
    match (config.environment, config.nominal_dynamics()) {
        (Environment::Car, None) => {
            let car = DubinsCar::<Dual64>::new(config.dynamics(), horizon, dt)?;
            let closed_loop = DirectLoop::new(car, DubinsTrackingController::new(config.gains()));
            train(cli, config, model, history, closed_loop)
        }
        (Environment::Car, Some(nominal)) => {
            info!("residual mode, differentiating through the nominal car");
            let closed_loop = ResidualLoop::new(
                DubinsCar::<f64>::new(config.dynamics(), horizon, dt)?,
                DubinsCar::<Dual64>::new(nominal, horizon, dt)?,
                DubinsTrackingController::new(config.gains()),
            );
            train(cli, config, model, history, closed_loop)
        }
        (Environment::Robot, None) => {
            let robot = LeggedRobot::<Dual64>::new(config.dynamics(), horizon, dt)?;
            let closed_loop = DirectLoop::new(robot, LeggedTrackingController::new(config.gains()));
            train(cli, config, model, history, closed_loop)
        }
        (Environment::Robot, Some(nominal)) => {
            info!("residual mode, differentiating through the nominal robot");
            let closed_loop = ResidualLoop::new(
                LeggedRobot::<f64>::new(config.dynamics(), horizon, dt)?,
                LeggedRobot::<Dual64>::new(nominal, horizon, dt)?,
                LeggedTrackingController::new(config.gains()),
            );
            train(cli, config, model, history, closed_loop)
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
