//! Coordinator and node runtimes wired together without timers.
//!
//! A small pump delivers every published message to every participant in
//! publication order, the way the router does, so barrier behaviour can be
//! checked step by step.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;

use chrono::{DateTime, Duration, TimeZone, Utc};
use crisis_cascade::DomainProfile;
use crisis_core::domain::InfrastructureDomain;
use crisis_core::node::NodeOutput;
use crisis_core::{NodeRuntime, ScenarioCatalog, ScenarioData, SimClock, TimeCoordinator};
use crisis_types::{
    DomainKind, Feature, Geometry, InfrastructureState, LoadCommand, Message, NextEventRequest,
    PowerStationCommand, Position, SimCommand, SimState, SimTimeMessage, layer_ids,
};
use serde_json::json;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 6, 0, 0).unwrap()
}

struct Harness {
    coordinator: TimeCoordinator,
    nodes: Vec<NodeRuntime>,
    log: Vec<Message>,
}

impl Harness {
    fn new(kinds: &[DomainKind]) -> Self {
        let clock = SimClock::from_parts(t0(), 1.0, 1000).unwrap();
        let nodes = kinds
            .iter()
            .map(|kind| {
                let profile = DomainProfile::for_kind(*kind).unwrap();
                NodeRuntime::new(Box::new(InfrastructureDomain::new(profile)), t0())
            })
            .collect();
        Self {
            coordinator: TimeCoordinator::new(clock, ScenarioCatalog::default()),
            nodes,
            log: Vec::new(),
        }
    }

    /// Deliver `initial` and everything it causes until quiet.
    fn pump(&mut self, initial: Vec<Message>) {
        let mut queue: VecDeque<Message> = initial.into();
        while let Some(message) = queue.pop_front() {
            queue.extend(self.coordinator.handle(&message).publish);
            for node in &mut self.nodes {
                queue.extend(flatten(node.handle(&message)));
            }
            self.log.push(message);
        }
    }

    fn heartbeats(&mut self) {
        let beats: Vec<Message> = self.nodes.iter_mut().map(NodeRuntime::heartbeat).collect();
        self.pump(beats);
    }

    fn load(&mut self, index: usize, data: ScenarioData) {
        let cmd = LoadCommand {
            scenario: "waterwolf".to_owned(),
            folder: "/tmp".to_owned(),
        };
        let node = self.nodes.get_mut(index).unwrap();
        let kind = node.kind();
        let mut out = flatten(node.handle(&Message::Load(kind, cmd.clone())));
        out.extend(flatten(node.finish_load(&cmd, Ok(data))));
        self.pump(out);
    }

    fn tick(&mut self) {
        let out = self.coordinator.tick().publish;
        self.pump(out);
    }

    fn features_on(&self, layer: &str) -> Vec<&Feature> {
        self.log
            .iter()
            .filter_map(|m| match m {
                Message::Feature(id, update) if id == layer => Some(&update.feature),
                _ => None,
            })
            .collect()
    }
}

fn flatten(out: NodeOutput) -> Vec<Message> {
    let mut messages = out.publish;
    messages.extend(out.throttled);
    messages
}

fn power_stations() -> ScenarioData {
    let area = json!({
        "type": "Polygon",
        "coordinates": [[[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]]
    });
    let station = Feature::new("p", Geometry::Point(Position::new(2.0, 2.0)))
        .with_property("Name", "Centrale Noord")
        .with_property("powerSupplyArea", area);
    ScenarioData::Features(vec![station])
}

fn hospitals() -> ScenarioData {
    let hospital = Feature::new("h", Geometry::Point(Position::new(0.5, 0.5)))
        .with_property("Name", "Ziekenhuis")
        .with_property("_dep_UPS", 30_u64)
        .with_property("Aantal bedden", 120_u64);
    ScenarioData::Features(vec![hospital])
}

#[test]
fn clock_waits_for_the_slowest_node() {
    let mut h = Harness::new(&[DomainKind::ElectricalNetwork, DomainKind::CriticalObjects]);
    let start = h.coordinator.command(SimCommand::Start).publish;
    h.pump(start);
    h.heartbeats();
    assert_eq!(h.coordinator.registry().len(), 2);
    assert_eq!(h.coordinator.not_ready().len(), 2);

    h.tick();
    assert_eq!(h.coordinator.sim_time(), t0());

    h.load(0, power_stations());
    h.tick();
    assert_eq!(h.coordinator.sim_time(), t0());

    h.load(1, hospitals());
    assert!(h.coordinator.not_ready().is_empty());
    h.tick();
    h.tick();
    assert_eq!(h.coordinator.sim_time(), t0() + Duration::seconds(2));
    for node in &h.nodes {
        assert_eq!(node.sim_time(), t0() + Duration::seconds(2));
    }
}

#[test]
fn pausing_one_node_stops_the_clock() {
    let mut h = Harness::new(&[DomainKind::ElectricalNetwork, DomainKind::CriticalObjects]);
    let start = h.coordinator.command(SimCommand::Start).publish;
    h.pump(start);
    h.load(0, power_stations());
    h.load(1, hospitals());
    h.tick();
    let frozen = h.coordinator.sim_time();

    let out = flatten(h.nodes.get_mut(1).unwrap().command(SimCommand::Pause));
    h.pump(out);
    assert_eq!(h.coordinator.not_ready().len(), 1);
    h.tick();
    assert_eq!(h.coordinator.sim_time(), frozen);

    let out = flatten(h.nodes.get_mut(1).unwrap().command(SimCommand::Start));
    h.pump(out);
    h.tick();
    assert_eq!(h.coordinator.sim_time(), frozen + Duration::seconds(1));
}

#[test]
fn blackout_then_fast_forward_fails_the_hospital() {
    let mut h = Harness::new(&[DomainKind::ElectricalNetwork, DomainKind::CriticalObjects]);
    let start = h.coordinator.command(SimCommand::Start).publish;
    h.pump(start);
    h.load(0, power_stations());
    h.load(1, hospitals());

    h.pump(vec![Message::PowerStationCmd(PowerStationCommand {
        power_station: "Centrale Noord".to_owned(),
        state: InfrastructureState::Failed,
    })]);
    let areas = h.features_on(layer_ids::POWER);
    assert!(areas.iter().any(|f| f.id.as_deref() == Some("pwr_stn_0_area")));

    let hospital = h.features_on(layer_ids::CRITICAL);
    assert_eq!(
        hospital.last().unwrap().properties.get("state"),
        Some(&json!(InfrastructureState::Stressed.code()))
    );
    let due = t0() + Duration::minutes(30);
    assert_eq!(h.coordinator.next_event(), Some(due.timestamp_millis()));

    h.pump(vec![Message::NextEvent(NextEventRequest { next: true })]);
    assert_eq!(h.coordinator.sim_time(), due);
    let hospital = h.features_on(layer_ids::CRITICAL);
    assert_eq!(
        hospital.last().unwrap().properties.get("state"),
        Some(&json!(InfrastructureState::Failed.code()))
    );
    assert_eq!(h.coordinator.next_event(), None);
    assert!(h.log.iter().any(|m| matches!(m, Message::Chart(_))));
}

#[test]
fn stop_resets_nodes_and_registry() {
    let mut h = Harness::new(&[DomainKind::ElectricalNetwork]);
    let start = h.coordinator.command(SimCommand::Start).publish;
    h.pump(start);
    h.load(0, power_stations());
    h.tick();

    let stop = Message::SimTime(SimTimeMessage::Control(crisis_types::SimTimeControl {
        sim_cmd: Some("Stop".to_owned()),
        ..Default::default()
    }));
    h.pump(vec![stop]);
    assert_eq!(h.coordinator.state(), SimState::Idle);
    assert_eq!(h.nodes.first().unwrap().state(), SimState::Idle);
    // The node's Idle report arrives after the coordinator reset.
    assert_eq!(h.coordinator.registry().len(), 1);
    assert!(!h.coordinator.clock().is_running());
}
