use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, bail};
use env_logger::Builder;
use log::{LevelFilter, info, warn};

use socket_bridge_sim::common::scene::load_scene;
use socket_bridge_sim::control::BridgeConfig;
use socket_bridge_sim::network::Network;
use socket_bridge_sim::simulation::Simulator;

const USAGE: &str = "usage: socket-bridge-sim <scene.json> [config.toml]";

fn main() -> anyhow::Result<()> {
    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("socket_bridge_sim"), LevelFilter::Debug)
        .parse_default_env()
        .init();

    info!("Starting up");

    let mut args = std::env::args().skip(1);
    let Some(scene_path) = args.next() else {
        bail!(USAGE);
    };
    let config_path = args.next().map(PathBuf::from).unwrap_or_else(|| BridgeConfig::config_path_from_scene(&scene_path));
    if args.next().is_some() {
        bail!(USAGE);
    }

    let scene = load_scene(Path::new(&scene_path)).with_context(|| format!("Loading scene {}", scene_path))?;
    info!("Loaded scene {} with {} nodes", scene_path, scene.nodes.len());

    let config = if config_path.exists() {
        let config = BridgeConfig::load(&config_path)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Loading config {}", config_path.display()))?;
        info!("Loaded config {}", config_path.display());
        config
    } else {
        warn!("No config at {}, using defaults", config_path.display());
        BridgeConfig::default()
    };
    if config.stop_offset_ms.is_none() {
        warn!("No stop-offset-ms configured, external processes run until the simulation ends");
    }

    let network = Network::from_scene(&scene, &config).context("Building the network")?;

    let mut sim = Simulator::with_clock(config.clock);
    sim.set_speed_percent(config.speed_percent);
    network.schedule_lifecycle(&mut sim, &config).context("Scheduling link lifecycles")?;

    let started = Instant::now();
    let processed = sim.run().context("Simulation aborted")?;
    info!(
        "Simulation finished at {} after {} events ({:.2?} wall time)",
        sim.now(),
        processed,
        started.elapsed()
    );
    Ok(())
}
