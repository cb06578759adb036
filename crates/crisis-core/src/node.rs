//! Node runtime: lifecycle, clock mirroring and status reporting around one
//! [`Domain`].
//!
//! The runtime is synchronous. Every call returns a [`NodeOutput`] listing
//! what to publish and whether a scenario load must be started; the actor
//! loop in [`runtime`](crate::runtime) performs the I/O.
//!
//! # Lifecycle
//!
//! - Entering Ready from Idle snapshots the scenario start time.
//! - Entering Idle resets the domain to its loaded state.
//! - In Pause and Exit, clock ticks and domain messages are ignored.
//! - A load instruction stops the node, drops its data and asks for a load;
//!   a successful load installs the data and starts the node.

use chrono::{DateTime, Utc};
use crisis_types::{
    DomainKind, LoadCommand, LooseNumber, Message, NodeId, SimCommand, SimState,
    SimStateReport, SimTimeControl, SimTimeMessage,
};
use tracing::{debug, info, warn};

use crate::domain::{Domain, Effects, ScenarioData, TimeContext};
use crate::error::CoreError;
use crate::fsm::{Fsm, Transition};

/// What the caller must do after a runtime call.
#[derive(Debug, Default)]
pub struct NodeOutput {
    /// Messages to publish now, in order.
    pub publish: Vec<Message>,
    /// Bulk snapshot to publish through the throttle.
    pub throttled: Option<Message>,
    /// Scenario folder to load asynchronously.
    pub load: Option<LoadCommand>,
    /// The node reached Exit and its loop should stop.
    pub exited: bool,
}

impl NodeOutput {
    fn absorb(&mut self, effects: Effects) {
        self.publish.extend(effects.publish);
        if effects.throttled.is_some() {
            self.throttled = effects.throttled;
        }
    }
}

/// State touched by lifecycle hooks.
struct NodeCore {
    id: NodeId,
    name: String,
    domain: Box<dyn Domain>,
    sim_time: DateTime<Utc>,
    sim_start: DateTime<Utc>,
    message: Option<String>,
    effects: Effects,
}

impl NodeCore {
    const fn ctx(&self) -> TimeContext {
        TimeContext {
            now: self.sim_time,
            start: self.sim_start,
        }
    }
}

/// A domain node.
pub struct NodeRuntime {
    fsm: Fsm<NodeCore>,
    core: NodeCore,
    reported_next_event: Option<i64>,
}

impl std::fmt::Debug for NodeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRuntime")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("state", &self.fsm.state())
            .field("sim_time", &self.core.sim_time)
            .finish_non_exhaustive()
    }
}

impl NodeRuntime {
    /// An Idle node around `domain`, named after its domain.
    pub fn new(domain: Box<dyn Domain>, sim_time: DateTime<Utc>) -> Self {
        let mut fsm = Fsm::new(SimState::Idle);
        fsm.on_enter(SimState::Ready, enter_ready);
        fsm.on_enter(SimState::Idle, enter_idle);
        let name = domain.kind().node_name().to_owned();
        Self {
            fsm,
            core: NodeCore {
                id: NodeId::new(),
                name,
                domain,
                sim_time,
                sim_start: sim_time,
                message: None,
                effects: Effects::default(),
            },
            reported_next_event: None,
        }
    }

    /// Node id.
    pub const fn id(&self) -> NodeId {
        self.core.id
    }

    /// Node name, e.g. `RoadSim`.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Simulated domain.
    pub fn kind(&self) -> DomainKind {
        self.core.domain.kind()
    }

    /// Lifecycle state.
    pub const fn state(&self) -> SimState {
        self.fsm.state()
    }

    /// Mirrored simulation time.
    pub const fn sim_time(&self) -> DateTime<Utc> {
        self.core.sim_time
    }

    /// Scenario start time.
    pub const fn sim_start(&self) -> DateTime<Utc> {
        self.core.sim_start
    }

    /// Earliest pending domain event.
    pub fn next_event_at(&self) -> Option<DateTime<Utc>> {
        self.core.domain.next_event_at(&self.core.ctx())
    }

    /// Current status record.
    pub fn status(&self) -> SimStateReport {
        self.report(self.fsm.state())
    }

    fn report(&self, state: SimState) -> SimStateReport {
        SimStateReport {
            id: self.core.id,
            name: self.core.name.clone(),
            state,
            time: self.core.sim_time.timestamp_millis(),
            next_event: self.next_event_at().map(|t| t.timestamp_millis()),
            msg: self.core.message.clone(),
            pid: Some(std::process::id()),
            mem: resident_memory(),
        }
    }

    /// Status message for the heartbeat.
    pub fn heartbeat(&mut self) -> Message {
        let report = self.status();
        self.reported_next_event = report.next_event;
        Message::SimState(report)
    }

    /// Apply a lifecycle command. Rejected commands are logged and ignored.
    pub fn command(&mut self, command: SimCommand) -> NodeOutput {
        let mut out = NodeOutput::default();
        self.trigger(command, &mut out);
        out
    }

    /// Handle an inbound message.
    pub fn handle(&mut self, message: &Message) -> NodeOutput {
        let mut out = NodeOutput::default();
        if self.fsm.state() == SimState::Exit {
            return out;
        }
        match message {
            Message::SimTime(SimTimeMessage::Epoch(ms)) => self.on_time(*ms, &mut out),
            Message::SimTime(SimTimeMessage::Control(control)) => self.on_control(control, &mut out),
            Message::Load(kind, cmd) if *kind == self.kind() => self.begin_load(cmd, &mut out),
            Message::SimState(_) | Message::Job(_) | Message::NextEvent(_) | Message::Load(..) => {}
            _ => {
                if self.processing() {
                    let ctx = self.core.ctx();
                    out.absorb(self.core.domain.on_message(message, &ctx));
                }
            }
        }
        self.report_next_event(&mut out);
        out
    }

    /// Complete a load started by a [`NodeOutput::load`] request.
    pub fn finish_load(&mut self, cmd: &LoadCommand, result: Result<ScenarioData, CoreError>) -> NodeOutput {
        let mut out = NodeOutput::default();
        if self.fsm.state() == SimState::Exit {
            return out;
        }
        match result {
            Ok(data) => {
                info!(node = %self.core.name, scenario = %cmd.scenario, "Scenario data loaded");
                out.absorb(self.core.domain.install(data));
                self.core.message = Some(format!("Loaded scenario {}.", cmd.scenario));
                if self.fsm.can(SimCommand::Start) {
                    self.trigger(SimCommand::Start, &mut out);
                } else {
                    out.publish.push(Message::SimState(self.status()));
                }
            }
            Err(err) => {
                warn!(node = %self.core.name, scenario = %cmd.scenario, error = %err, "Scenario load failed");
                self.core.message = Some(format!("Failed to load scenario {}.", cmd.scenario));
                out.publish.push(Message::SimState(self.status()));
            }
        }
        self.report_next_event(&mut out);
        out
    }

    fn processing(&self) -> bool {
        !matches!(self.fsm.state(), SimState::Pause | SimState::Exit)
    }

    fn on_time(&mut self, ms: i64, out: &mut NodeOutput) {
        let Some(time) = DateTime::<Utc>::from_timestamp_millis(ms) else {
            warn!(node = %self.core.name, ms, "Dropping out-of-range time");
            return;
        };
        self.core.sim_time = time;
        if self.processing() {
            let ctx = self.core.ctx();
            out.absorb(self.core.domain.on_time(&ctx));
        }
    }

    fn on_control(&mut self, control: &SimTimeControl, out: &mut NodeOutput) {
        if let Some(ms) = control.sim_time.as_ref().and_then(LooseNumber::millis) {
            self.on_time(ms, out);
        }
        match control.sim_cmd.as_deref() {
            Some(name) => match name.parse::<SimCommand>() {
                Ok(command) => self.trigger(command, out),
                Err(err) => warn!(node = %self.core.name, error = %err, "Unknown sim command"),
            },
            None => out.publish.push(Message::SimState(self.status())),
        }
    }

    fn begin_load(&mut self, cmd: &LoadCommand, out: &mut NodeOutput) {
        info!(node = %self.core.name, scenario = %cmd.scenario, folder = %cmd.folder, "Loading scenario");
        if self.fsm.can(SimCommand::Stop) {
            self.trigger(SimCommand::Stop, out);
        }
        self.core.domain.unload();
        out.load = Some(cmd.clone());
    }

    fn trigger(&mut self, command: SimCommand, out: &mut NodeOutput) {
        match self.fsm.trigger(command) {
            Ok(fired) => {
                let Transition { from, to, .. } = fired.run(&mut self.core);
                info!(node = %self.core.name, from = %from, to = %to, "Transitioning");
                out.absorb(std::mem::take(&mut self.core.effects));
                let report = self.report(to);
                self.reported_next_event = report.next_event;
                out.publish.push(Message::SimState(report));
                out.exited = to == SimState::Exit;
            }
            Err(err) => warn!(node = %self.core.name, error = %err, "Command rejected"),
        }
    }

    /// Publish a status when the next event moved, so the coordinator can
    /// fast-forward without waiting for a heartbeat.
    fn report_next_event(&mut self, out: &mut NodeOutput) {
        let next = self.next_event_at().map(|t| t.timestamp_millis());
        if next == self.reported_next_event {
            return;
        }
        debug!(node = %self.core.name, next_event = ?next, "Next event changed");
        if !out.publish.iter().any(|m| matches!(m, Message::SimState(_))) {
            out.publish.push(Message::SimState(self.status()));
        }
        self.reported_next_event = next;
    }
}

fn enter_ready(core: &mut NodeCore, t: Transition) {
    if t.from == SimState::Idle {
        core.sim_start = core.sim_time;
        info!(node = %core.name, start = %core.sim_start, "Set sim start time");
        let ctx = core.ctx();
        let effects = core.domain.started(&ctx);
        core.effects.extend(effects);
    }
}

fn enter_idle(core: &mut NodeCore, _t: Transition) {
    core.message = Some("Reset received.".to_owned());
    let effects = core.domain.reset();
    core.effects.extend(effects);
}

/// Resident set size of this process in bytes, where the platform exposes it.
fn resident_memory() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    kb.checked_mul(1024)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::InfrastructureDomain;
    use chrono::{Duration, TimeZone};
    use crisis_cascade::DomainProfile;
    use crisis_types::{Feature, FeatureUpdate, Geometry, Position, layer_ids};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    fn critical_node() -> NodeRuntime {
        let profile = DomainProfile::for_kind(DomainKind::CriticalObjects).unwrap();
        NodeRuntime::new(Box::new(InfrastructureDomain::new(profile)), t0())
    }

    fn hospitals() -> ScenarioData {
        let h = Feature::new("h", Geometry::Point(Position::new(0.5, 0.5)))
            .with_property("Name", "H1")
            .with_property("_dep_UPS", 10_u64)
            .with_property("Aantal bedden", 50_u64);
        ScenarioData::Features(vec![h])
    }

    fn load_cmd() -> LoadCommand {
        LoadCommand {
            scenario: "waterwolf".to_owned(),
            folder: "/tmp/waterwolf/CriticalObjects".to_owned(),
        }
    }

    fn states(out: &NodeOutput) -> Vec<SimState> {
        out.publish
            .iter()
            .filter_map(|m| match m {
                Message::SimState(r) => Some(r.state),
                _ => None,
            })
            .collect()
    }

    fn control(cmd: &str) -> Message {
        Message::SimTime(SimTimeMessage::Control(SimTimeControl {
            sim_cmd: Some(cmd.to_owned()),
            ..SimTimeControl::default()
        }))
    }

    fn blackout() -> Message {
        let square = Geometry::Polygon(vec![vec![
            Position::new(0.0, 0.0),
            Position::new(0.0, 1.0),
            Position::new(1.0, 1.0),
            Position::new(1.0, 0.0),
            Position::new(0.0, 0.0),
        ]]);
        Message::Feature(
            layer_ids::POWER.to_owned(),
            FeatureUpdate {
                feature: Feature::new("pwr_stn_0_area", square),
                change_all_features_of_type: false,
            },
        )
    }

    #[test]
    fn load_goes_ready_and_snapshots_start() {
        let mut node = critical_node();
        assert_eq!(node.name(), "CriticalObjectsSim");
        let out = node.handle(&Message::Load(DomainKind::CriticalObjects, load_cmd()));
        assert_eq!(out.load, Some(load_cmd()));
        assert_eq!(node.state(), SimState::Idle);

        node.handle(&Message::SimTime(SimTimeMessage::Epoch(
            (t0() + Duration::hours(1)).timestamp_millis(),
        )));
        let out = node.finish_load(&load_cmd(), Ok(hospitals()));
        assert_eq!(node.state(), SimState::Ready);
        assert_eq!(states(&out), vec![SimState::Ready]);
        assert_eq!(node.sim_start(), t0() + Duration::hours(1));
        assert!(out.publish.iter().any(|m| matches!(m, Message::Layer(_))));
    }

    #[test]
    fn load_for_other_domain_is_ignored() {
        let mut node = critical_node();
        let out = node.handle(&Message::Load(DomainKind::Roads, load_cmd()));
        assert!(out.load.is_none());
    }

    #[test]
    fn failed_load_stays_idle() {
        let mut node = critical_node();
        node.handle(&Message::Load(DomainKind::CriticalObjects, load_cmd()));
        let out = node.finish_load(
            &load_cmd(),
            Err(CoreError::MissingData {
                path: "/tmp/x".into(),
            }),
        );
        assert_eq!(node.state(), SimState::Idle);
        assert_eq!(states(&out), vec![SimState::Idle]);
    }

    #[test]
    fn rejected_command_leaves_state() {
        let mut node = critical_node();
        let out = node.handle(&control("Finish"));
        assert_eq!(node.state(), SimState::Idle);
        assert!(out.publish.is_empty());
        let out = node.handle(&control("Bogus"));
        assert!(out.publish.is_empty());
    }

    #[test]
    fn control_without_command_acknowledges() {
        let mut node = critical_node();
        let out = node.handle(&Message::SimTime(SimTimeMessage::Control(SimTimeControl::default())));
        assert_eq!(states(&out), vec![SimState::Idle]);
    }

    #[test]
    fn timed_failure_through_the_runtime() {
        let mut node = critical_node();
        node.handle(&Message::Load(DomainKind::CriticalObjects, load_cmd()));
        node.finish_load(&load_cmd(), Ok(hospitals()));

        let out = node.handle(&blackout());
        let report = out
            .publish
            .iter()
            .find_map(|m| match m {
                Message::SimState(r) => Some(r.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(report.next_event, Some((t0() + Duration::minutes(10)).timestamp_millis()));

        let at = |m: i64| {
            Message::SimTime(SimTimeMessage::Epoch((t0() + Duration::minutes(m)).timestamp_millis()))
        };
        let out = node.handle(&at(9));
        assert!(!out.publish.iter().any(|m| matches!(m, Message::Feature(..))));

        let out = node.handle(&at(10));
        assert!(out.publish.iter().any(|m| matches!(m, Message::Feature(..))));
        assert_eq!(node.status().next_event, None);
    }

    #[test]
    fn pause_freezes_time_evaluation() {
        let mut node = critical_node();
        node.handle(&Message::Load(DomainKind::CriticalObjects, load_cmd()));
        node.finish_load(&load_cmd(), Ok(hospitals()));
        node.handle(&blackout());

        node.handle(&control("Pause"));
        assert_eq!(node.state(), SimState::Pause);
        let out = node.handle(&Message::SimTime(SimTimeMessage::Epoch(
            (t0() + Duration::minutes(30)).timestamp_millis(),
        )));
        assert!(out.publish.is_empty());

        node.handle(&control("Start"));
        let out = node.handle(&Message::SimTime(SimTimeMessage::Epoch(
            (t0() + Duration::minutes(31)).timestamp_millis(),
        )));
        assert!(out.publish.iter().any(|m| matches!(m, Message::Feature(..))));
    }

    #[test]
    fn stop_resets_domain() {
        let mut node = critical_node();
        node.handle(&Message::Load(DomainKind::CriticalObjects, load_cmd()));
        node.finish_load(&load_cmd(), Ok(hospitals()));
        node.handle(&blackout());
        assert!(node.next_event_at().is_some());

        let out = node.handle(&control("Stop"));
        assert_eq!(node.state(), SimState::Idle);
        assert_eq!(node.next_event_at(), None);
        assert!(out.publish.iter().any(|m| matches!(m, Message::Layer(_))));
        assert_eq!(node.status().msg.as_deref(), Some("Reset received."));
    }

    #[test]
    fn exit_is_final() {
        let mut node = critical_node();
        let out = node.command(SimCommand::Exit);
        assert!(out.exited);
        assert_eq!(states(&out), vec![SimState::Exit]);
        assert!(node.handle(&control("Start")).publish.is_empty());
    }
}
