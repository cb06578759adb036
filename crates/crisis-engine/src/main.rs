//! Crisis engine binary.
//!
//! Runs the time coordinator and one node per infrastructure domain in a
//! single process, connected through the in-process router and, unless the
//! transport is `local`, bridged to a NATS server so external clients and
//! other processes take part in the same simulation.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `crisis-config.yaml` (or `CRISIS_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Create the simulation clock and scan the scenario catalog
//! 4. Connect the NATS bridge
//! 5. Spawn the coordinator and the domain nodes
//! 6. Optionally start a scenario
//! 7. Wait for Ctrl-C, then exit every actor and flush the bridge

mod error;
mod nats_bus;

use std::path::PathBuf;
use std::time::Duration;

use crisis_core::config::{SimulationConfig, Transport};
use crisis_core::{
    ActorHandle, NodeRuntime, Router, ScenarioCatalog, SimClock, TimeCoordinator, Timing,
    build_domain, spawn_coordinator, spawn_node,
};
use crisis_types::{DomainKind, JobPayload, JobRequest, Message, SimCommand, Topics};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::nats_bus::NatsBridge;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG: &str = "crisis-config.yaml";

/// How long an actor may take to exit before it is abandoned.
const EXIT_GRACE: Duration = Duration::from_secs(5);

type BridgeTask = (oneshot::Sender<()>, JoinHandle<Result<(), EngineError>>);

/// Application entry point for the crisis engine.
///
/// # Errors
///
/// Returns an error if configuration, clock setup or the NATS connection
/// fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, config_path) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(config.logging.json);
    info!("crisis-engine starting");
    info!(
        path = %config_path.display(),
        namespace = config.simulation.namespace,
        sim_step_ms = config.simulation.sim_step_ms,
        sim_speed = config.simulation.sim_speed,
        transport = ?config.infrastructure.transport,
        "Configuration loaded"
    );

    // 3. Clock and scenario catalog.
    let clock = SimClock::new(&config.simulation)?;
    info!(start = %clock.time(), "Simulation clock initialized");
    let catalog = match ScenarioCatalog::scan(&config.scenarios.data_folder) {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!(error = %e, "No scenarios available");
            ScenarioCatalog::default()
        }
    };
    info!(scenarios = ?catalog.names(), "Scenario catalog ready");

    // 4. Transport.
    let router = Router::default();
    let bridge = match config.infrastructure.transport {
        Transport::Nats => Some(start_bridge(&config, &router).await?),
        Transport::Local => {
            info!("Local transport, no broker");
            None
        }
    };

    // 5. Actors.
    let timing = Timing::from(&config.node);
    let start = clock.time();
    let mut actors = vec![spawn_coordinator(
        TimeCoordinator::new(clock, catalog),
        router.clone(),
        timing,
    )];
    for kind in DomainKind::ALL {
        let node = NodeRuntime::new(build_domain(kind, &config), start);
        actors.push(spawn_node(node, router.clone(), timing));
    }
    info!(actors = actors.len(), "Simulation actors spawned");

    // 6. Autostart.
    if let Some(name) = config.scenarios.autostart.as_deref() {
        autostart(name, &actors, &router).await?;
    }

    // 7. Run until interrupted.
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| EngineError::Signal { source })?;
    info!("Shutdown requested");
    shutdown(actors).await;

    if let Some((stop, task)) = bridge {
        if stop.send(()).is_err() {
            warn!("NATS bridge already stopped");
        }
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "NATS bridge failed"),
            Err(e) => warn!(error = %e, "NATS bridge task failed"),
        }
    }

    info!("crisis-engine shutdown complete");
    Ok(())
}

/// Load configuration from `CRISIS_CONFIG` or `crisis-config.yaml`.
///
/// A missing file yields the defaults.
fn load_config() -> Result<(SimulationConfig, PathBuf), EngineError> {
    let path = std::env::var_os("CRISIS_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    if path.exists() {
        Ok((SimulationConfig::from_file(&path)?, path))
    } else {
        Ok((SimulationConfig::parse("")?, path))
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

async fn start_bridge(config: &SimulationConfig, router: &Router) -> Result<BridgeTask, EngineError> {
    let topics = Topics::new(config.simulation.namespace.clone());
    let bridge = NatsBridge::connect(&config.infrastructure.nats_url, topics).await?;
    let (stop, shutdown) = oneshot::channel();
    let task = tokio::spawn(bridge.run(router.clone(), shutdown));
    Ok((stop, task))
}

/// Start the coordinator and ask it to load `name`.
async fn autostart(name: &str, actors: &[ActorHandle], router: &Router) -> Result<(), EngineError> {
    if let Some(coordinator) = actors.first() {
        coordinator.command(SimCommand::Start).await?;
    }
    info!(scenario = name, "Autostarting scenario");
    router.publish(Message::Job(JobPayload::Request(JobRequest {
        get: None,
        start: Some(name.to_owned()),
    })));
    Ok(())
}

/// Send Exit to every actor and wait for each to publish its final status.
async fn shutdown(actors: Vec<ActorHandle>) {
    for actor in &actors {
        if let Err(e) = actor.command(SimCommand::Exit).await {
            warn!(actor = actor.name(), error = %e, "Actor already stopped");
        }
    }
    for actor in actors {
        let name = actor.name().to_owned();
        match tokio::time::timeout(EXIT_GRACE, actor.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(actor = name, error = %e, "Actor failed"),
            Err(_) => warn!(actor = name, "Actor did not exit in time"),
        }
    }
}
