//! # lattice_app: demo driver
//!
//! Builds a world with the demo component schemas (plus any extra
//! definitions loaded from a JSON file), registers the demo queries and
//! systems, creates the demo entities, and drives the world at a fixed tick
//! rate.

mod demo;
mod tick;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use lattice_component::ComponentDefinition;
use lattice_world::{World, WorldConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tick::{TickConfig, TickLoop};

#[derive(Parser)]
#[command(name = "lattice_app", about = "Run the lattice ECS demo")]
struct Args {
    /// Number of ticks to run (0 = run until interrupted)
    #[arg(short, long, default_value_t = 5)]
    ticks: u64,

    /// Target ticks per second
    #[arg(short = 'r', long, default_value_t = 60.0)]
    tick_rate: f64,

    /// JSON file holding extra component definitions
    /// (`[{"name": ..., "defaults": {...}}]`)
    #[arg(short, long)]
    components: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lattice_app=info".parse()?))
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        args.tick_rate > 0.0,
        "tick rate must be positive, got {}",
        args.tick_rate
    );

    let mut config = WorldConfig::new().with_components(demo::components());
    if let Some(path) = &args.components {
        let extra = load_components(path)?;
        info!(path = %path.display(), count = extra.len(), "loaded component definitions");
        config = config.with_components(extra);
    }

    let mut world = World::new(config).context("failed to create world")?;
    demo::populate(&mut world).context("failed to populate demo world")?;

    let mut tick_loop = TickLoop::new(
        TickConfig {
            tick_rate: args.tick_rate,
            max_ticks: args.ticks,
        },
        world,
    );
    tick_loop.run()?;

    info!(
        ticks = tick_loop.tick_id(),
        time = tick_loop.time(),
        entities = tick_loop.world().entity_count(),
        "demo finished"
    );
    Ok(())
}

fn load_components(path: &Path) -> Result<Vec<ComponentDefinition>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}
