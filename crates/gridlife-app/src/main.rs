use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gridlife_app::{
    ControlHandle, SnapshotReceiver, TickDriver, load_config, share, snapshot_channel,
};
use gridlife_brain::{PolicyKind, install};
use gridlife_core::{SimConfig, World};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "gridlife",
    version,
    about = "Run the gridlife simulation, speaking JSON lines on stdin/stdout"
)]
struct Cli {
    /// Optional JSON configuration file; missing fields use defaults.
    #[arg(long, env = "GRIDLIFE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Seed for a reproducible run.
    #[arg(long, env = "GRIDLIFE_SEED")]
    seed: Option<u64>,

    /// Wall-clock interval between ticks.
    #[arg(long, env = "GRIDLIFE_TICK_MS", default_value_t = 200)]
    tick_ms: u64,

    /// Policy attached to seeded and placed agents.
    #[arg(long, env = "GRIDLIFE_POLICY", default_value = "actor_critic")]
    policy: PolicyKind,

    #[arg(long)]
    initial_agents: Option<usize>,

    /// Enable fatigue, hunger, stress and social groups.
    #[arg(long)]
    extended: bool,

    /// Start with passive food spawning switched off.
    #[arg(long)]
    no_random_food: bool,

    /// Snapshots queued for the writer before new ones are dropped.
    #[arg(long, default_value_t = 10)]
    snapshot_capacity: usize,

    /// Exit after this many ticks.
    #[arg(long)]
    max_ticks: Option<u64>,
}

impl Cli {
    fn resolve_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => SimConfig::default(),
        };
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(seed) = self.seed {
            config.rng_seed = Some(seed);
        }
        if let Some(count) = self.initial_agents {
            config.initial_agents = count;
        }
        if self.extended || self.policy == PolicyKind::QLearningExtended {
            config.physiology.enabled = true;
        }
        if self.no_random_food {
            config.food.random_spawn = false;
        }
        Ok(config)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}

fn bootstrap_world(cli: &Cli) -> Result<World> {
    let config = cli.resolve_config()?;
    let mut world = World::new(config).context("failed to construct world")?;
    let key = install(world.registry_mut(), cli.policy);
    world.set_default_policy(Some(key));
    let initial = world.config().initial_agents;
    world.seed_random_agents(initial);
    info!(
        width = world.config().width,
        height = world.config().height,
        agents = world.agent_count(),
        policy = %cli.policy,
        extended = world.config().physiology.enabled,
        "world ready"
    );
    Ok(world)
}

/// Write one line to stdout. The stdout lock keeps snapshot and ack lines whole.
fn emit(line: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{line}")?;
    out.flush()
}

fn write_snapshots(receiver: SnapshotReceiver) -> Result<u64> {
    let mut written = 0_u64;
    while let Ok(message) = receiver.recv() {
        let line = serde_json::to_string(message.as_ref()).context("failed to encode snapshot")?;
        emit(&line).context("failed to write snapshot")?;
        written += 1;
    }
    Ok(written)
}

fn read_commands(control: ControlHandle) -> Result<u64> {
    let served = control.serve_lines(io::stdin().lock(), emit)?;
    Ok(served)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let shared = share(bootstrap_world(&cli)?);
    let control = ControlHandle::new(shared.clone());
    emit(&control.handshake_json()?).context("failed to write handshake")?;

    let (publisher, receiver) = snapshot_channel(cli.snapshot_capacity);
    let writer = tokio::task::spawn_blocking(move || write_snapshots(receiver));

    // Stdin reads block; a detached thread does not hold up shutdown.
    std::thread::spawn(move || {
        match read_commands(control) {
            Ok(served) => info!(served, "stdin closed"),
            Err(err) => warn!(error = %err, "command reader stopped"),
        }
    });

    let driver = TickDriver::new(shared, publisher, Duration::from_millis(cli.tick_ms))
        .with_max_ticks(cli.max_ticks);
    let driver_handle = driver.handle();
    let mut driver_task = tokio::spawn(driver.run());

    let executed = tokio::select! {
        result = &mut driver_task => result.context("tick driver panicked")??,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("interrupt received; stopping after the current tick");
            driver_handle.stop();
            driver_task.await.context("tick driver panicked")??
        }
    };

    match writer.await.context("snapshot writer panicked")? {
        Ok(written) => info!(executed, written, "gridlife stopped"),
        Err(err) => warn!(executed, error = %err, "snapshot writer failed"),
    }
    Ok(())
}
