//! Guidewire navigation runner.
//!
//! Builds the navigation task on the kinematic backend and rolls out
//! episodes with a fixed policy, printing one JSON summary per episode.
//!
//! # Commands
//!
//! - `navigate run` - Run episodes
//! - `navigate config` - Print the default environment configuration
//!
//! Logging follows `RUST_LOG`; `--verbose` raises the default to `debug`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sim_navigate::{
    EnvConfig, EpisodeEnd, Environment, Guidewire, KinematicPhysics, Navigate, NavigateConfig,
    Phantom, PhantomSpec, Physics, TargetSpec, Tip,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Number of spheres in the tip fragment.
const TIP_SEGMENTS: usize = 3;

/// Guidewire navigation runner
#[derive(Parser)]
#[command(name = "navigate")]
#[command(about = "Roll out guidewire navigation episodes", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run episodes and print a summary of each
    Run(RunArgs),

    /// Print the default environment configuration as JSON
    Config,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Environment configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Phantom description (JSON); a built-in box phantom otherwise
    #[arg(long)]
    phantom: Option<PathBuf>,

    /// Name of the phantom site to reach
    #[arg(long)]
    target: Option<String>,

    /// Number of episodes
    #[arg(long, default_value_t = 1)]
    episodes: usize,

    /// Episode length in seconds
    #[arg(long, default_value_t = 2.0)]
    time_limit: f64,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Attach a tip to the guidewire
    #[arg(long)]
    tip: bool,

    /// Observe colour images
    #[arg(long)]
    pixels: bool,

    /// Observe the guidewire segmentation
    #[arg(long)]
    segment: bool,

    /// Observe the phantom segmentation
    #[arg(long)]
    phantom_segment: bool,

    /// Draw a new target every episode
    #[arg(long)]
    sample_target: bool,

    /// Sample targets inside the phantom mesh instead of at sites
    #[arg(long)]
    target_from_mesh: bool,

    /// Colour the phantom sites
    #[arg(long)]
    visualize_sites: bool,

    /// Action policy
    #[arg(long, value_enum, default_value_t = Policy::Zero)]
    policy: Policy,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// All actuators idle
    Zero,
    /// Uniform controls in [-1, 1]
    Random,
}

impl Policy {
    fn act(self, n: usize, rng: &mut StdRng) -> Vec<f64> {
        match self {
            Self::Zero => vec![0.0; n],
            Self::Random => (0..n).map(|_| rng.gen_range(-1.0..=1.0)).collect(),
        }
    }
}

/// Printed once per episode.
#[derive(Serialize)]
struct EpisodeSummary {
    episode: usize,
    steps: usize,
    total_reward: f64,
    success: bool,
    end: &'static str,
    target: Option<[f64; 3]>,
    head: Option<[f64; 3]>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => run(&args),
        Commands::Config => {
            println!("{}", EnvConfig::default().to_json_pretty()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_task(args: &RunArgs) -> Result<Navigate> {
    let env_config = match &args.config {
        Some(path) => EnvConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EnvConfig::default(),
    };

    let phantom = match &args.phantom {
        Some(path) => {
            let spec = PhantomSpec::from_json_file(path)
                .with_context(|| format!("loading phantom {}", path.display()))?;
            Phantom::from_spec(&spec)?
        }
        None => Phantom::demo(),
    };

    let mut config = NavigateConfig::default()
        .with_pixels(args.pixels)
        .with_segment(args.segment)
        .with_phantom_segment(args.phantom_segment)
        .with_sample_target(args.sample_target || args.target.is_none())
        .with_target_from_sites(!args.target_from_mesh)
        .with_visualize_sites(args.visualize_sites);
    if let Some(site) = &args.target {
        config = config.with_target(TargetSpec::Site(site.clone()));
    }

    let mut builder = Navigate::builder()
        .phantom(phantom)
        .guidewire(Guidewire::new(&env_config.guidewire)?)
        .config(config);
    if args.tip {
        builder = builder.tip(Tip::new(&env_config.guidewire, TIP_SEGMENTS)?);
    }
    Ok(builder.env_config(env_config).build()?)
}

fn run(args: &RunArgs) -> Result<()> {
    let task = build_task(args)?;
    let mut env: Environment<KinematicPhysics> =
        Environment::new(task, args.seed).with_time_limit(args.time_limit);
    let mut policy_rng = StdRng::seed_from_u64(args.seed.wrapping_add(1));
    info!(episodes = args.episodes, seed = args.seed, "starting rollout");

    for episode in 0..args.episodes {
        env.reset()?;
        let n_actions = env
            .physics()
            .map_or(0, |physics| physics.num_actuators());

        let mut steps = 0;
        let mut total_reward = 0.0;
        let end = loop {
            let action = args.policy.act(n_actions, &mut policy_rng);
            let step = env.step(&action)?;
            steps += 1;
            total_reward += step.reward.unwrap_or(0.0);
            if let Some(end) = step.end {
                break end;
            }
        };
        debug!(episode, steps, "episode rolled out");

        let summary = EpisodeSummary {
            episode,
            steps,
            total_reward,
            success: end == EpisodeEnd::Success,
            end: match end {
                EpisodeEnd::Success => "success",
                EpisodeEnd::Timeout => "timeout",
            },
            target: env.task().target_pos().map(|p| [p.x, p.y, p.z]),
            head: env.task().head_pos().map(|p| [p.x, p.y, p.z]),
        };
        println!("{}", serde_json::to_string(&summary)?);
    }
    Ok(())
}
