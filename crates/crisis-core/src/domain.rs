//! Domain adapters plugged into a [`NodeRuntime`](crate::node::NodeRuntime).
//!
//! A [`Domain`] turns scenario data, clock ticks and peer messages into
//! outbound messages. Entity domains wrap a [`CascadeModel`]; the flood and
//! cell coverage domains wrap their grid models.
//!
//! # Domains
//!
//! - [`InfrastructureDomain`] -- power, communication, roads, critical and
//!   hazardous objects.
//! - [`FloodDomain`] -- flood keyframe publication.
//! - [`CoverageDomain`] -- cell coverage grid fed by tower state.

use chrono::{DateTime, Utc};
use crisis_cascade::{
    BedChartTracker, BedTotals, CascadeModel, CascadeOutcome, CoverageModel, DomainProfile,
    FloodSchedule,
};
use crisis_geo::{Grid, GridHeader};
use crisis_types::{DomainKind, Feature, FeatureUpdate, Geometry, Layer, Message, layer_ids};
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;

/// Simulated time as seen by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeContext {
    /// Current simulation time.
    pub now: DateTime<Utc>,
    /// Time the node last left Idle for Ready.
    pub start: DateTime<Utc>,
}

/// Parsed scenario input for one domain.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioData {
    /// Entity features in file order.
    Features(Vec<Feature>),
    /// Flood keyframes as `(minutes, grid)`.
    Flood(Vec<(i64, Grid)>),
    /// Coverage base grid header.
    CoverageGrid(GridHeader),
}

/// Messages a domain wants published.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects {
    /// Publish immediately, in order.
    pub publish: Vec<Message>,
    /// Bulk snapshot subject to the publish throttle. Only the latest counts.
    pub throttled: Option<Message>,
}

impl Effects {
    /// Effects publishing a single message.
    pub fn one(message: Message) -> Self {
        Self {
            publish: vec![message],
            throttled: None,
        }
    }

    /// Effects holding a throttled snapshot.
    pub const fn throttled(message: Message) -> Self {
        Self {
            publish: Vec::new(),
            throttled: Some(message),
        }
    }

    /// Append `other`; a later throttled snapshot replaces an earlier one.
    pub fn extend(&mut self, other: Self) {
        self.publish.extend(other.publish);
        if other.throttled.is_some() {
            self.throttled = other.throttled;
        }
    }

    /// Returns true when nothing is to be published.
    pub fn is_empty(&self) -> bool {
        self.publish.is_empty() && self.throttled.is_none()
    }
}

/// Behaviour of one simulation domain.
pub trait Domain: Send {
    /// The domain this adapter simulates.
    fn kind(&self) -> DomainKind;

    /// Replace the domain's data with a freshly loaded scenario.
    fn install(&mut self, data: ScenarioData) -> Effects;

    /// Drop all scenario data.
    fn unload(&mut self);

    /// Restore the loaded scenario to its initial state.
    fn reset(&mut self) -> Effects;

    /// The node left Idle for Ready; `ctx.start` was just set.
    fn started(&mut self, _ctx: &TimeContext) -> Effects {
        Effects::default()
    }

    /// Simulation time moved to `ctx.now`.
    fn on_time(&mut self, ctx: &TimeContext) -> Effects;

    /// A message from a peer (or an echo of our own).
    fn on_message(&mut self, message: &Message, ctx: &TimeContext) -> Effects;

    /// Earliest pending event.
    fn next_event_at(&self, ctx: &TimeContext) -> Option<DateTime<Utc>>;
}

/// Adapter for the given domain kind.
pub fn build_domain(kind: DomainKind, config: &SimulationConfig) -> Box<dyn Domain> {
    match DomainProfile::for_kind(kind) {
        Some(profile) => Box::new(InfrastructureDomain::new(profile)),
        None if kind == DomainKind::CellCoverage => {
            Box::new(CoverageDomain::new(config.coverage.radius_cells))
        }
        None => Box::new(FloodDomain::new()),
    }
}

// ---------------------------------------------------------------------------
// Infrastructure
// ---------------------------------------------------------------------------

/// Entity domain driven by a [`CascadeModel`].
#[derive(Debug, Clone)]
pub struct InfrastructureDomain {
    model: CascadeModel,
    beds: Option<BedChartTracker>,
}

impl InfrastructureDomain {
    /// Adapter for the given profile. Critical objects also track beds.
    pub fn new(profile: DomainProfile) -> Self {
        let beds = (profile.kind == DomainKind::CriticalObjects).then(BedChartTracker::default);
        Self {
            model: CascadeModel::new(profile),
            beds,
        }
    }

    /// The wrapped model.
    pub const fn model(&self) -> &CascadeModel {
        &self.model
    }

    fn layer_id(&self) -> &'static str {
        self.model.profile().layer_id()
    }

    fn snapshot(&self) -> Message {
        Message::Layer(Layer::features(self.layer_id(), self.model.features()))
    }

    fn chart(&mut self, ctx: &TimeContext) -> Option<Message> {
        let totals = BedTotals::count(self.model.entities());
        let beds = self.beds.as_mut()?;
        beds.record(ctx.start, ctx.now, totals);
        Some(Message::Chart(beds.to_chart()))
    }

    fn publish(&mut self, outcome: CascadeOutcome, ctx: &TimeContext) -> Effects {
        if outcome.is_empty() {
            return Effects::default();
        }
        let layer = self.layer_id();
        let mut effects = Effects::default();
        for feature in outcome.updated.into_iter().chain(outcome.areas) {
            effects.publish.push(Message::Feature(
                layer.to_owned(),
                FeatureUpdate {
                    feature,
                    change_all_features_of_type: false,
                },
            ));
        }
        if let Some(chart) = self.chart(ctx) {
            effects.publish.push(chart);
        }
        effects
    }

    fn on_flood_layer(&mut self, layer: &Layer, ctx: &TimeContext) -> Effects {
        let Some(data) = layer.data.as_deref() else {
            return Effects::default();
        };
        match Grid::parse_esri(data) {
            Ok(grid) => {
                let outcome = self.model.apply_flood(&grid);
                debug!(
                    domain = %self.model.profile().kind,
                    changed = outcome.updated.len(),
                    "Flood layer evaluated"
                );
                self.publish(outcome, ctx)
            }
            Err(err) => {
                warn!(domain = %self.model.profile().kind, error = %err, "Dropping malformed flood grid");
                Effects::default()
            }
        }
    }

    fn on_power_feature(&mut self, feature: &Feature, ctx: &TimeContext) -> Effects {
        if !matches!(feature.geometry, Geometry::Polygon(_) | Geometry::MultiPolygon(_)) {
            return Effects::default();
        }
        let outcome = self.model.apply_blackout(&feature.geometry, ctx.now);
        if !outcome.is_empty() {
            info!(
                domain = %self.model.profile().kind,
                area = feature.id.as_deref().unwrap_or_default(),
                changed = outcome.updated.len(),
                "Blackout area applied"
            );
        }
        self.publish(outcome, ctx)
    }

    fn on_own_update(&mut self, update: &FeatureUpdate, ctx: &TimeContext) -> Effects {
        let outcome = self.model.apply_feature_update(update.clone());
        self.publish(outcome, ctx)
    }
}

impl Domain for InfrastructureDomain {
    fn kind(&self) -> DomainKind {
        self.model.profile().kind
    }

    fn install(&mut self, data: ScenarioData) -> Effects {
        match data {
            ScenarioData::Features(features) => {
                self.model.load(features);
                if let Some(beds) = self.beds.as_mut() {
                    beds.clear();
                }
                Effects::one(self.snapshot())
            }
            ScenarioData::Flood(_) | ScenarioData::CoverageGrid(_) => {
                warn!(domain = %self.kind(), "Scenario data does not match domain");
                Effects::default()
            }
        }
    }

    fn unload(&mut self) {
        self.model.clear();
    }

    fn reset(&mut self) -> Effects {
        self.model.reset();
        if let Some(beds) = self.beds.as_mut() {
            beds.clear();
        }
        Effects::one(self.snapshot())
    }

    fn started(&mut self, ctx: &TimeContext) -> Effects {
        if let Some(beds) = self.beds.as_mut() {
            beds.clear();
        }
        self.chart(ctx).map(Effects::one).unwrap_or_default()
    }

    fn on_time(&mut self, ctx: &TimeContext) -> Effects {
        let outcome = self.model.check_scheduled_failures(ctx.now);
        self.publish(outcome, ctx)
    }

    fn on_message(&mut self, message: &Message, ctx: &TimeContext) -> Effects {
        let own = self.layer_id();
        match message {
            Message::Layer(layer) if layer.id == layer_ids::FLOOD => self.on_flood_layer(layer, ctx),
            Message::Feature(layer, update) if layer == own => self.on_own_update(update, ctx),
            Message::Feature(layer, update) if layer == layer_ids::POWER => {
                self.on_power_feature(&update.feature, ctx)
            }
            Message::FeatureBatch(batch) if batch.layer_id == own => {
                let mut effects = Effects::default();
                for feature in &batch.features {
                    let update = FeatureUpdate {
                        feature: feature.clone(),
                        change_all_features_of_type: false,
                    };
                    effects.extend(self.on_own_update(&update, ctx));
                }
                effects
            }
            Message::PowerStationCmd(cmd) if self.kind() == DomainKind::ElectricalNetwork => {
                match self.model.set_state_by_name(&cmd.power_station, cmd.state) {
                    Ok(outcome) => {
                        info!(station = %cmd.power_station, state = ?cmd.state, "Power station forced");
                        self.publish(outcome, ctx)
                    }
                    Err(err) => {
                        warn!(error = %err, "Power station command rejected");
                        Effects::default()
                    }
                }
            }
            _ => Effects::default(),
        }
    }

    fn next_event_at(&self, _ctx: &TimeContext) -> Option<DateTime<Utc>> {
        self.model.next_event_at()
    }
}

// ---------------------------------------------------------------------------
// Flood
// ---------------------------------------------------------------------------

/// Publishes flood depth keyframes as simulation time passes.
#[derive(Debug, Clone, Default)]
pub struct FloodDomain {
    schedule: FloodSchedule,
}

impl FloodDomain {
    /// Flood domain without keyframes.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Domain for FloodDomain {
    fn kind(&self) -> DomainKind {
        DomainKind::Flooding
    }

    fn install(&mut self, data: ScenarioData) -> Effects {
        let ScenarioData::Flood(keyframes) = data else {
            warn!(domain = %self.kind(), "Scenario data does not match domain");
            return Effects::default();
        };
        self.schedule = FloodSchedule::new();
        for (minutes, grid) in keyframes {
            self.schedule.insert(minutes, grid);
        }
        info!(keyframes = self.schedule.len(), "Flood scenario loaded");
        Effects::default()
    }

    fn unload(&mut self) {
        self.schedule = FloodSchedule::new();
    }

    fn reset(&mut self) -> Effects {
        self.schedule.rewind();
        Effects::default()
    }

    fn on_time(&mut self, ctx: &TimeContext) -> Effects {
        match self.schedule.take_due(ctx.start, ctx.now) {
            Some((minutes, grid)) => {
                info!(minutes, "Publishing flood keyframe");
                Effects::one(Message::Layer(Layer::grid(layer_ids::FLOOD, grid.to_esri_string())))
            }
            None => Effects::default(),
        }
    }

    fn on_message(&mut self, _message: &Message, _ctx: &TimeContext) -> Effects {
        Effects::default()
    }

    fn next_event_at(&self, ctx: &TimeContext) -> Option<DateTime<Utc>> {
        self.schedule.next_event_at(ctx.start)
    }
}

// ---------------------------------------------------------------------------
// Cell coverage
// ---------------------------------------------------------------------------

/// Cell coverage grid following communication tower state.
///
/// The latest tower snapshot is kept apart from the grid model, so towers
/// published before the base grid is installed, or before a reset, are
/// stamped as soon as a grid exists.
#[derive(Debug, Clone)]
pub struct CoverageDomain {
    radius_cells: f64,
    towers: Vec<Feature>,
    model: Option<CoverageModel>,
}

impl CoverageDomain {
    /// Coverage domain with towers reaching `radius_cells` grid columns.
    pub const fn new(radius_cells: f64) -> Self {
        Self {
            radius_cells,
            towers: Vec::new(),
            model: None,
        }
    }

    /// The coverage model, once a base grid is installed.
    pub const fn model(&self) -> Option<&CoverageModel> {
        self.model.as_ref()
    }

    /// Last known tower features.
    pub fn towers(&self) -> &[Feature] {
        &self.towers
    }

    fn snapshot(&self) -> Effects {
        self.model
            .as_ref()
            .map(|m| Effects::throttled(Message::Layer(m.to_layer())))
            .unwrap_or_default()
    }

    fn restamp(&mut self) {
        if let Some(model) = self.model.as_mut() {
            model.load_towers(&self.towers);
        }
    }

    /// Record a tower update. Returns false for towers outside the snapshot.
    fn remember_tower(&mut self, tower: &Feature) -> bool {
        let Some(known) = self
            .towers
            .iter_mut()
            .find(|t| t.id.is_some() && t.id == tower.id)
        else {
            debug!(tower = tower.id.as_deref().unwrap_or_default(), "Unknown tower");
            return false;
        };
        known.clone_from(tower);
        true
    }
}

impl Domain for CoverageDomain {
    fn kind(&self) -> DomainKind {
        DomainKind::CellCoverage
    }

    fn install(&mut self, data: ScenarioData) -> Effects {
        let ScenarioData::CoverageGrid(header) = data else {
            warn!(domain = %self.kind(), "Scenario data does not match domain");
            return Effects::default();
        };
        info!(
            rows = header.rows,
            columns = header.columns,
            towers = self.towers.len(),
            "Coverage grid loaded"
        );
        self.model = Some(CoverageModel::new(header, self.radius_cells));
        self.restamp();
        self.snapshot()
    }

    fn unload(&mut self) {
        self.model = None;
        self.towers.clear();
    }

    fn reset(&mut self) -> Effects {
        self.restamp();
        self.snapshot()
    }

    fn on_time(&mut self, _ctx: &TimeContext) -> Effects {
        Effects::default()
    }

    fn on_message(&mut self, message: &Message, _ctx: &TimeContext) -> Effects {
        match message {
            Message::Layer(layer) if layer.id == layer_ids::COMMUNICATION => {
                self.towers.clone_from(&layer.features);
                if self.model.is_none() {
                    debug!(towers = self.towers.len(), "Tower snapshot kept until a grid is loaded");
                    return Effects::default();
                }
                self.restamp();
                self.snapshot()
            }
            Message::Feature(layer, update) if layer == layer_ids::COMMUNICATION => {
                if !self.remember_tower(&update.feature) {
                    return Effects::default();
                }
                let changed = self
                    .model
                    .as_mut()
                    .is_some_and(|m| m.update_tower(&update.feature));
                if changed { self.snapshot() } else { Effects::default() }
            }
            _ => Effects::default(),
        }
    }

    fn next_event_at(&self, _ctx: &TimeContext) -> Option<DateTime<Utc>> {
        None
    }
}
