//! Actor loops driving node runtimes and the coordinator.
//!
//! Each actor owns its state machine outright and reacts to one event at a
//! time: a routed message, a timer, a finished scenario load, or an operator
//! command from its [`ActorHandle`]. There is no shared mutable state
//! between actors.

use std::path::PathBuf;
use std::time::Duration;

use crisis_types::{LoadCommand, Message, SimCommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at, sleep_until};
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::coordinator::{CoordinatorOutput, TimeCoordinator};
use crate::domain::ScenarioData;
use crate::error::CoreError;
use crate::loader::load_scenario_data;
use crate::node::{NodeOutput, NodeRuntime};
use crate::router::{Router, Subscription};
use crate::throttle::Throttle;

const COMMAND_CAPACITY: usize = 16;

/// Control handle of a spawned actor.
#[derive(Debug)]
pub struct ActorHandle {
    name: String,
    commands: mpsc::Sender<SimCommand>,
    join: JoinHandle<Result<(), CoreError>>,
}

impl ActorHandle {
    /// Actor name, e.g. `RoadSim`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a lifecycle command to the actor.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ChannelClosed`] if the actor has stopped.
    pub async fn command(&self, command: SimCommand) -> Result<(), CoreError> {
        self.commands
            .send(command)
            .await
            .map_err(|_err| CoreError::ChannelClosed { name: "actor commands" })
    }

    /// Wait for the actor to stop.
    ///
    /// # Errors
    ///
    /// Returns the actor's own error, or [`CoreError::ChannelClosed`] if its
    /// task was aborted or panicked.
    pub async fn join(self) -> Result<(), CoreError> {
        self.join
            .await
            .map_err(|_err| CoreError::ChannelClosed { name: "actor task" })?
    }
}

/// Timing of the node loops.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Interval between unsolicited status reports.
    pub heartbeat: Duration,
    /// Minimum spacing between bulk layer publications.
    pub publish_throttle: Duration,
}

impl From<&NodeConfig> for Timing {
    fn from(config: &NodeConfig) -> Self {
        Self {
            heartbeat: Duration::from_millis(config.heartbeat_ms.max(1)),
            publish_throttle: Duration::from_millis(config.publish_throttle_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Node actor
// ---------------------------------------------------------------------------

/// Spawn the loop of a domain node. The node is subscribed before this
/// returns, so nothing published afterwards is missed.
pub fn spawn_node(runtime: NodeRuntime, router: Router, timing: Timing) -> ActorHandle {
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let name = runtime.name().to_owned();
    let inbox = router.subscribe();
    let join = tokio::spawn(run_node(runtime, router, inbox, timing, rx));
    ActorHandle {
        name,
        commands: tx,
        join,
    }
}

type LoadResult = (u64, LoadCommand, Result<ScenarioData, CoreError>);

struct NodeLoop {
    runtime: NodeRuntime,
    router: Router,
    throttle: Throttle,
    held: Option<Message>,
    load_tx: mpsc::Sender<LoadResult>,
    load_generation: u64,
}

async fn run_node(
    runtime: NodeRuntime,
    router: Router,
    mut inbox: Subscription,
    timing: Timing,
    mut commands: mpsc::Receiver<SimCommand>,
) -> Result<(), CoreError> {
    let (load_tx, mut load_rx) = mpsc::channel(COMMAND_CAPACITY);
    let mut heartbeat = interval(timing.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut node = NodeLoop {
        runtime,
        router,
        throttle: Throttle::new(timing.publish_throttle),
        held: None,
        load_tx,
        load_generation: 0,
    };
    info!(node = %node.runtime.name(), id = %node.runtime.id(), "Node started");

    loop {
        let deadline = node.throttle.deadline();
        let out = tokio::select! {
            envelope = inbox.recv() => match envelope {
                Some(envelope) => node.runtime.handle(&envelope.message),
                None => return Err(CoreError::ChannelClosed { name: "router" }),
            },
            Some(command) = commands.recv() => node.runtime.command(command),
            Some((generation, cmd, result)) = load_rx.recv() => {
                if generation != node.load_generation {
                    debug!(node = %node.runtime.name(), scenario = %cmd.scenario, "Discarding superseded load");
                    continue;
                }
                node.runtime.finish_load(&cmd, result)
            }
            _ = heartbeat.tick() => {
                let status = node.runtime.heartbeat();
                node.router.publish(status);
                continue;
            }
            () = wait_until(deadline) => {
                node.flush_held();
                continue;
            }
        };
        if node.dispatch(out) {
            info!(node = %node.runtime.name(), "Node exited");
            return Ok(());
        }
    }
}

impl NodeLoop {
    /// Performs the I/O a runtime call asked for. Returns true on exit.
    fn dispatch(&mut self, out: NodeOutput) -> bool {
        for message in out.publish {
            self.router.publish(message);
        }
        if let Some(message) = out.throttled {
            self.held = Some(message);
            if self.throttle.request(Instant::now()) {
                self.publish_held();
            }
        }
        if let Some(cmd) = out.load {
            self.spawn_load(cmd);
        }
        if out.exited {
            self.throttle.cancel();
        }
        out.exited
    }

    fn flush_held(&mut self) {
        if self.throttle.poll(Instant::now()) {
            self.publish_held();
        }
    }

    fn publish_held(&mut self) {
        if let Some(message) = self.held.take() {
            self.router.publish(message);
        }
    }

    fn spawn_load(&mut self, cmd: LoadCommand) {
        self.load_generation = self.load_generation.wrapping_add(1);
        let generation = self.load_generation;
        let kind = self.runtime.kind();
        let tx = self.load_tx.clone();
        tokio::spawn(async move {
            let folder = PathBuf::from(&cmd.folder);
            let result = load_scenario_data(kind, &folder).await;
            if tx.send((generation, cmd, result)).await.is_err() {
                debug!(domain = %kind, "Node stopped before load finished");
            }
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Coordinator actor
// ---------------------------------------------------------------------------

/// Spawn the coordinator loop.
pub fn spawn_coordinator(coordinator: TimeCoordinator, router: Router, timing: Timing) -> ActorHandle {
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let inbox = router.subscribe();
    let join = tokio::spawn(run_coordinator(coordinator, router, inbox, timing, rx));
    ActorHandle {
        name: crate::coordinator::COORDINATOR_NAME.to_owned(),
        commands: tx,
        join,
    }
}

async fn run_coordinator(
    mut coordinator: TimeCoordinator,
    router: Router,
    mut inbox: Subscription,
    timing: Timing,
    mut commands: mpsc::Receiver<SimCommand>,
) -> Result<(), CoreError> {
    let mut pacing = pacing_timer(&coordinator);
    let mut heartbeat = interval(timing.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(id = %coordinator.id(), step_ms = coordinator.clock().step_ms(), "Coordinator started");

    loop {
        let out: CoordinatorOutput = tokio::select! {
            envelope = inbox.recv() => match envelope {
                Some(envelope) => coordinator.handle(&envelope.message),
                None => return Err(CoreError::ChannelClosed { name: "router" }),
            },
            Some(command) = commands.recv() => coordinator.command(command),
            _ = pacing.tick() => coordinator.tick(),
            _ = heartbeat.tick() => {
                router.publish(coordinator.heartbeat());
                continue;
            }
        };
        for message in out.publish {
            router.publish(message);
        }
        if out.repace {
            pacing = pacing_timer(&coordinator);
        }
        if out.exited {
            info!("Coordinator exited");
            return Ok(());
        }
    }
}

fn pacing_timer(coordinator: &TimeCoordinator) -> tokio::time::Interval {
    let step = coordinator.clock().step().max(Duration::from_millis(1));
    let start = Instant::now().checked_add(step).unwrap_or_else(Instant::now);
    let mut timer = interval_at(start, step);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}
