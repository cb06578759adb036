//! Time coordinator: the barrier that paces the shared clock.
//!
//! The coordinator learns about nodes only from their status reports. The
//! clock runs while the coordinator itself is Ready and no known node is
//! outside Ready; the moment any node reports otherwise the clock stops, and
//! it resumes on its own once the last straggler reports Ready again.
//!
//! # Design Principles
//!
//! - The registry is rebuilt from observed reports; there is no static node
//!   list.
//! - Reports are idempotent: a duplicate report leaves the same registry.
//! - A fast-forward request arriving while the barrier is closed is kept and
//!   applied when the barrier opens.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use crisis_types::{
    DomainKind, JobPayload, JobRequest, LoadCommand, LooseNumber, Message, NextEventRequest,
    NodeId, SimCommand, SimState, SimStateReport, SimTimeControl, SimTimeMessage,
};
use tracing::{debug, info, warn};

use crate::clock::SimClock;
use crate::fsm::{Fsm, Transition};
use crate::scenario::ScenarioCatalog;

/// Name the coordinator reports under.
pub const COORDINATOR_NAME: &str = "SimulationManager";

/// What the caller must do after a coordinator call.
#[derive(Debug, Default)]
pub struct CoordinatorOutput {
    /// Messages to publish, in order.
    pub publish: Vec<Message>,
    /// The tick interval changed; the pacing timer must be restarted.
    pub repace: bool,
    /// The coordinator reached Exit.
    pub exited: bool,
}

struct CoordinatorCore {
    id: NodeId,
    clock: SimClock,
    registry: BTreeMap<NodeId, SimStateReport>,
    not_ready: BTreeSet<NodeId>,
    message: Option<String>,
}

/// The barrier coordinator.
pub struct TimeCoordinator {
    fsm: Fsm<CoordinatorCore>,
    core: CoordinatorCore,
    catalog: ScenarioCatalog,
    current_scenario: Option<String>,
    fast_forward_pending: bool,
}

impl std::fmt::Debug for TimeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeCoordinator")
            .field("id", &self.core.id)
            .field("state", &self.fsm.state())
            .field("nodes", &self.core.registry.len())
            .field("not_ready", &self.core.not_ready.len())
            .field("scenario", &self.current_scenario)
            .finish_non_exhaustive()
    }
}

impl TimeCoordinator {
    /// An Idle coordinator over `clock` and `catalog`.
    pub fn new(clock: SimClock, catalog: ScenarioCatalog) -> Self {
        let mut fsm = Fsm::new(SimState::Idle);
        fsm.on_exit(SimState::Ready, exit_ready);
        fsm.on_enter(SimState::Idle, enter_idle);
        Self {
            fsm,
            core: CoordinatorCore {
                id: NodeId::new(),
                clock,
                registry: BTreeMap::new(),
                not_ready: BTreeSet::new(),
                message: None,
            },
            catalog,
            current_scenario: None,
            fast_forward_pending: false,
        }
    }

    /// Coordinator id.
    pub const fn id(&self) -> NodeId {
        self.core.id
    }

    /// Lifecycle state.
    pub const fn state(&self) -> SimState {
        self.fsm.state()
    }

    /// The paced clock.
    pub const fn clock(&self) -> &SimClock {
        &self.core.clock
    }

    /// Current simulation time.
    pub const fn sim_time(&self) -> DateTime<Utc> {
        self.core.clock.time()
    }

    /// Known nodes and their last reports.
    pub const fn registry(&self) -> &BTreeMap<NodeId, SimStateReport> {
        &self.core.registry
    }

    /// Nodes currently holding the barrier closed.
    pub const fn not_ready(&self) -> &BTreeSet<NodeId> {
        &self.core.not_ready
    }

    /// Loaded scenario, if any.
    pub fn current_scenario(&self) -> Option<&str> {
        self.current_scenario.as_deref()
    }

    /// Earliest reported event of a Ready node strictly after `sim_time`.
    pub fn next_event(&self) -> Option<i64> {
        let now = self.core.clock.time_ms();
        self.core
            .registry
            .values()
            .filter(|r| r.state == SimState::Ready)
            .filter_map(|r| r.next_event)
            .filter(|t| *t > now)
            .min()
    }

    /// Current status record.
    pub fn status(&self) -> SimStateReport {
        self.report(self.fsm.state())
    }

    fn report(&self, state: SimState) -> SimStateReport {
        SimStateReport {
            id: self.core.id,
            name: COORDINATOR_NAME.to_owned(),
            state,
            time: self.core.clock.time_ms(),
            next_event: self.next_event(),
            msg: self.core.message.clone(),
            pid: Some(std::process::id()),
            mem: None,
        }
    }

    /// Apply a lifecycle command. Rejected commands are logged and ignored.
    pub fn command(&mut self, command: SimCommand) -> CoordinatorOutput {
        let mut out = CoordinatorOutput::default();
        self.trigger(command, &mut out);
        out
    }

    /// Handle an inbound message.
    pub fn handle(&mut self, message: &Message) -> CoordinatorOutput {
        let mut out = CoordinatorOutput::default();
        if self.fsm.state() == SimState::Exit {
            return out;
        }
        match message {
            Message::SimState(report) => self.on_status(report, &mut out),
            Message::SimTime(SimTimeMessage::Control(control)) => self.on_control(control, &mut out),
            Message::Job(JobPayload::Request(request)) => self.on_job(request, &mut out),
            Message::NextEvent(request) => self.on_next_event(*request, &mut out),
            _ => {}
        }
        out
    }

    /// Pacing timer fired. Advances and broadcasts time while the barrier is
    /// open.
    pub fn tick(&mut self) -> CoordinatorOutput {
        let mut out = CoordinatorOutput::default();
        if !self.core.clock.is_running() {
            return out;
        }
        match self.core.clock.advance() {
            Ok(_) => self.publish_time(&mut out),
            Err(err) => {
                warn!(error = %err, "Clock stopped");
                self.core.clock.pause();
            }
        }
        out
    }

    /// Status message for the heartbeat.
    pub fn heartbeat(&self) -> Message {
        Message::SimState(self.status())
    }

    /// Switch to a scenario by name, instructing every node type it contains
    /// to load its folder.
    pub fn start_scenario(&mut self, name: &str) -> CoordinatorOutput {
        let mut out = CoordinatorOutput::default();
        let name = name.to_lowercase();
        if self.current_scenario.as_deref() == Some(name.as_str()) {
            info!(scenario = %name, "Scenario already loaded");
            return out;
        }
        let Some(nodes) = self.catalog.get(&name) else {
            warn!(scenario = %name, "Scenario not found");
            return out;
        };
        for node in nodes {
            let Some(kind) = DomainKind::from_folder_name(&node.node_type) else {
                warn!(node_type = %node.node_type, "Sim service not found");
                continue;
            };
            info!(node_type = %kind, folder = %node.folder.display(), "Starting sim service");
            out.publish.push(Message::Load(
                kind,
                LoadCommand {
                    scenario: name.clone(),
                    folder: node.folder.to_string_lossy().into_owned(),
                },
            ));
        }
        info!(scenario = %name, "Scenario loaded");
        self.current_scenario = Some(name);
        out
    }

    fn on_status(&mut self, report: &SimStateReport, out: &mut CoordinatorOutput) {
        if report.id == self.core.id {
            return;
        }
        if report.state == SimState::Exit {
            if self.core.registry.remove(&report.id).is_some() {
                info!(node = %report.name, "Node exited");
            }
            self.core.not_ready.remove(&report.id);
        } else {
            if !self.core.registry.contains_key(&report.id) {
                info!(node = %report.name, id = %report.id, "Node registered");
            }
            if report.state == SimState::Ready {
                self.core.not_ready.remove(&report.id);
            } else {
                self.core.not_ready.insert(report.id);
            }
            self.core.registry.insert(report.id, report.clone());
        }
        self.refresh_barrier(out);
    }

    fn on_control(&mut self, control: &SimTimeControl, out: &mut CoordinatorOutput) {
        if let Some(ms) = control.sim_time.as_ref().and_then(LooseNumber::millis) {
            match DateTime::<Utc>::from_timestamp_millis(ms) {
                Some(time) => {
                    self.core.clock.set_time(time);
                    info!(time = %time, "New simulation time");
                }
                None => warn!(ms, "Ignoring out-of-range simulation time"),
            }
        }
        if let Some(speed) = control.sim_speed.as_ref().and_then(|v| v.value()) {
            if (speed - self.core.clock.speed()).abs() > f64::EPSILON {
                match self.core.clock.set_speed(speed) {
                    Ok(()) => {
                        info!(speed, "New simulation speed");
                        out.repace = true;
                    }
                    Err(err) => warn!(error = %err, "Ignoring simulation speed"),
                }
            }
        }
        if let Some(step) = control.sim_time_step.as_ref().and_then(LooseNumber::millis) {
            let step_ms = u64::try_from(step).unwrap_or(0);
            match self.core.clock.set_step_ms(step_ms) {
                Ok(()) => {
                    info!(step_ms, "New simulation time step");
                    out.repace = true;
                }
                Err(err) => warn!(error = %err, "Ignoring simulation time step"),
            }
        }
        match control.sim_cmd.as_deref() {
            Some(name) => match name.parse::<SimCommand>() {
                Ok(command) => self.trigger(command, out),
                Err(err) => warn!(error = %err, "Unknown sim command"),
            },
            None => out.publish.push(Message::SimState(self.status())),
        }
    }

    fn on_job(&mut self, request: &JobRequest, out: &mut CoordinatorOutput) {
        info!(get = ?request.get, start = ?request.start, "Received job");
        if let Some(query) = request.get.as_deref() {
            if query.eq_ignore_ascii_case("scenarios") {
                out.publish
                    .push(Message::Job(JobPayload::Scenarios(self.catalog.names())));
            } else {
                info!(query, "Job query not found");
            }
        }
        if let Some(name) = request.start.as_deref().filter(|n| !n.is_empty()) {
            let started = self.start_scenario(name);
            out.publish.extend(started.publish);
        }
    }

    fn on_next_event(&mut self, request: NextEventRequest, out: &mut CoordinatorOutput) {
        if !request.next {
            return;
        }
        if self.core.not_ready.is_empty() {
            self.fast_forward(out);
        } else {
            warn!(
                waiting = self.core.not_ready.len(),
                "Simulation is not ready to continue yet; fast-forward deferred"
            );
            self.fast_forward_pending = true;
        }
    }

    fn fast_forward(&mut self, out: &mut CoordinatorOutput) {
        let Some(target) = self.next_event().and_then(DateTime::<Utc>::from_timestamp_millis) else {
            debug!("No upcoming event to forward to");
            return;
        };
        self.core.clock.set_time(target);
        info!(time = %target, "Forwarded to time");
        self.publish_time(out);
    }

    fn refresh_barrier(&mut self, out: &mut CoordinatorOutput) {
        let open = self.fsm.state() == SimState::Ready && self.core.not_ready.is_empty();
        let running = self.core.clock.is_running();
        if open && !running {
            info!(nodes = self.core.registry.len(), "All nodes ready; clock running");
            self.core.clock.start();
            if self.fast_forward_pending {
                self.fast_forward_pending = false;
                self.fast_forward(out);
            } else {
                self.publish_time(out);
            }
        } else if !open && running {
            debug!(waiting = self.core.not_ready.len(), "Clock paused");
            self.core.clock.pause();
        } else if open && self.fast_forward_pending {
            self.fast_forward_pending = false;
            self.fast_forward(out);
        }
    }

    fn publish_time(&self, out: &mut CoordinatorOutput) {
        out.publish
            .push(Message::SimTime(SimTimeMessage::Epoch(self.core.clock.time_ms())));
    }

    fn trigger(&mut self, command: SimCommand, out: &mut CoordinatorOutput) {
        match self.fsm.trigger(command) {
            Ok(fired) => {
                let Transition { from, to, .. } = fired.run(&mut self.core);
                info!(from = %from, to = %to, "Coordinator transitioning");
                out.publish.push(Message::SimState(self.report(to)));
                out.exited = to == SimState::Exit;
                if to == SimState::Idle {
                    self.fast_forward_pending = false;
                }
                self.refresh_barrier(out);
            }
            Err(err) => warn!(error = %err, "Command rejected"),
        }
    }
}

fn exit_ready(core: &mut CoordinatorCore, _t: Transition) {
    core.clock.pause();
}

fn enter_idle(core: &mut CoordinatorCore, _t: Transition) {
    core.message = Some("Reset received.".to_owned());
    core.registry.clear();
    core.not_ready.clear();
}
