//! The cascade model: one domain's entity set and its failure rules.
//!
//! Every operation runs to a fixpoint before returning and reports what
//! became visible as a [`CascadeOutcome`]. States only rise; a repeat hit at
//! the same level adds failure-mode bits. Failed entities are never
//! re-evaluated until [`CascadeModel::reset`].

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use crisis_geo::{Grid, geometry_in_area};
use crisis_types::{
    DomainKind, EntityId, FailureMode, Feature, FeatureUpdate, Geometry, InfrastructureState,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::entity::{Entity, keys};
use crate::error::CascadeError;

// ---------------------------------------------------------------------------
// Domain profile
// ---------------------------------------------------------------------------

/// Geometry an entity must have to be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    /// Point entities.
    Point,
    /// Line-string entities.
    Line,
}

/// Which rules apply in a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainProfile {
    /// The domain.
    pub kind: DomainKind,
    /// Input file name inside the domain folder.
    pub file_name: &'static str,
    /// Prefix for load-time ids.
    pub id_prefix: &'static str,
    /// Required entity geometry.
    pub geometry: GeometryKind,
    /// Whether blackout areas affect entities.
    pub reacts_to_blackout: bool,
    /// Whether `_dep_UPS` delays blackout failures.
    pub honours_backup_power: bool,
    /// Whether failures propagate along dependency lists.
    pub propagates: bool,
    /// Whether failed entities publish their supply area.
    pub publishes_supply_areas: bool,
}

impl DomainProfile {
    /// Profile for an entity domain. Grid domains have none.
    pub const fn for_kind(kind: DomainKind) -> Option<Self> {
        let base = Self {
            kind,
            file_name: "",
            id_prefix: "",
            geometry: GeometryKind::Point,
            reacts_to_blackout: true,
            honours_backup_power: false,
            propagates: true,
            publishes_supply_areas: false,
        };
        match kind {
            DomainKind::ElectricalNetwork => Some(Self {
                file_name: "power_stations.json",
                id_prefix: "pwr_stn",
                reacts_to_blackout: false,
                publishes_supply_areas: true,
                ..base
            }),
            DomainKind::Communication => Some(Self {
                file_name: "comm_objects.json",
                id_prefix: "comm_obj",
                propagates: false,
                ..base
            }),
            DomainKind::CriticalObjects => Some(Self {
                file_name: "critical_objects.json",
                id_prefix: "crit_obj",
                honours_backup_power: true,
                ..base
            }),
            DomainKind::HazardousObjects => Some(Self {
                file_name: "hazardous_objects.json",
                id_prefix: "haz_obj",
                propagates: false,
                ..base
            }),
            DomainKind::Roads => Some(Self {
                file_name: "road_objects.json",
                id_prefix: "road",
                geometry: GeometryKind::Line,
                ..base
            }),
            DomainKind::Flooding | DomainKind::CellCoverage => None,
        }
    }

    /// Layer id the domain publishes on.
    pub const fn layer_id(&self) -> &'static str {
        self.kind.layer_id()
    }

    fn accepts(&self, geometry: &Geometry) -> bool {
        matches!(
            (self.geometry, geometry),
            (GeometryKind::Point, Geometry::Point(_)) | (GeometryKind::Line, Geometry::LineString(_))
        )
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Visible result of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeOutcome {
    /// Changed entities, one feature per entity, in order of first change.
    pub updated: Vec<Feature>,
    /// Newly published blackout areas.
    pub areas: Vec<Feature>,
}

impl CascadeOutcome {
    /// Returns true when nothing is to be published.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.areas.is_empty()
    }
}

/// Entities touched during one pass, deduplicated.
#[derive(Debug, Default)]
struct Pass {
    touched: Vec<usize>,
    seen: HashSet<usize>,
}

impl Pass {
    fn touch(&mut self, idx: usize) {
        if self.seen.insert(idx) {
            self.touched.push(idx);
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Entity set of one domain plus the rules that drive it.
#[derive(Debug, Clone)]
pub struct CascadeModel {
    profile: DomainProfile,
    baseline: Vec<Entity>,
    entities: Vec<Entity>,
    by_id: HashMap<EntityId, usize>,
    /// Dependency name to dependent entity indices.
    dependents: HashMap<String, Vec<usize>>,
    published_areas: BTreeSet<EntityId>,
}

impl CascadeModel {
    /// An empty model.
    pub fn new(profile: DomainProfile) -> Self {
        Self {
            profile,
            baseline: Vec::new(),
            entities: Vec::new(),
            by_id: HashMap::new(),
            dependents: HashMap::new(),
            published_areas: BTreeSet::new(),
        }
    }

    /// Load a domain feature collection.
    ///
    /// Ids are assigned as `<prefix>_<index>` over the input order; features
    /// with the wrong geometry kind are dropped. Every entity starts Ok.
    pub fn load(&mut self, features: Vec<Feature>) {
        let mut loaded = Vec::with_capacity(features.len());
        for (index, feature) in features.into_iter().enumerate() {
            if !self.profile.accepts(&feature.geometry) {
                debug!(
                    domain = %self.profile.kind,
                    index,
                    geometry = feature.geometry.type_name(),
                    "Skipping feature with unsupported geometry"
                );
                continue;
            }
            let mut entity =
                Entity::from_feature(EntityId::indexed(self.profile.id_prefix, index), feature);
            entity.state = InfrastructureState::Ok;
            entity.failure_mode = FailureMode::empty();
            entity.scheduled_failure_at = None;
            loaded.push(entity);
        }
        info!(domain = %self.profile.kind, entities = loaded.len(), "Entities loaded");
        self.baseline = loaded;
        self.reset();
    }

    /// Restore every entity to its loaded, Ok state.
    pub fn reset(&mut self) {
        self.entities.clone_from(&self.baseline);
        self.published_areas.clear();
        self.reindex();
    }

    /// Drop all entities, including the baseline.
    pub fn clear(&mut self) {
        self.baseline.clear();
        self.reset();
    }

    fn reindex(&mut self) {
        self.by_id.clear();
        self.dependents.clear();
        for (idx, entity) in self.entities.iter().enumerate() {
            self.by_id.insert(entity.id.clone(), idx);
            for dep in &entity.dependencies {
                self.dependents.entry(dep.clone()).or_default().push(idx);
            }
        }
    }

    /// The domain profile.
    pub const fn profile(&self) -> &DomainProfile {
        &self.profile
    }

    /// All entities in load order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Entity by id.
    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.by_id.get(id).and_then(|idx| self.entities.get(*idx))
    }

    /// First entity with the given name.
    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// All entities as features, for a layer snapshot.
    pub fn features(&self) -> Vec<Feature> {
        self.entities.iter().map(Entity::to_feature).collect()
    }

    /// Earliest outstanding scheduled failure.
    pub fn next_event_at(&self) -> Option<DateTime<Utc>> {
        self.entities
            .iter()
            .filter_map(|e| e.scheduled_failure_at)
            .min()
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    /// Evaluate a flood depth grid against every non-failed entity, then
    /// propagate.
    pub fn apply_flood(&mut self, grid: &Grid) -> CascadeOutcome {
        let mut pass = Pass::default();
        for idx in 0..self.entities.len() {
            let Some(entity) = self.entities.get(idx) else {
                continue;
            };
            if entity.is_failed() {
                continue;
            }
            let depth = grid.sample_max(entity.sample_points());
            if depth > entity.water_threshold {
                self.raise(idx, InfrastructureState::Failed, FailureMode::FLOODED, &mut pass);
            } else if depth > 0.0 {
                self.raise(idx, InfrastructureState::Stressed, FailureMode::FLOODED, &mut pass);
            }
        }
        self.propagate_all(&mut pass);
        self.finish(pass)
    }

    /// Evaluate a blackout area, then propagate.
    ///
    /// Entities with backup power that are still Ok become Stressed with a
    /// scheduled failure `now + backup`; others fail immediately unless a
    /// failure is already scheduled.
    pub fn apply_blackout(&mut self, area: &Geometry, now: DateTime<Utc>) -> CascadeOutcome {
        if !self.profile.reacts_to_blackout {
            return CascadeOutcome::default();
        }
        let mut pass = Pass::default();
        for idx in 0..self.entities.len() {
            let Some(entity) = self.entities.get(idx) else {
                continue;
            };
            if entity.is_failed() || !geometry_in_area(&entity.geometry, area) {
                continue;
            }
            let backup = entity
                .backup_minutes
                .filter(|_| self.profile.honours_backup_power)
                .filter(|_| entity.state == InfrastructureState::Ok);
            let already_scheduled = entity.scheduled_failure_at.is_some();
            if let Some(minutes) = backup {
                let at = minutes_duration(minutes)
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                if let Some(e) = self.entities.get_mut(idx) {
                    e.scheduled_failure_at = Some(at);
                }
                pass.touch(idx);
                self.raise(idx, InfrastructureState::Stressed, FailureMode::NO_MAIN_POWER, &mut pass);
            } else if !already_scheduled {
                self.raise(idx, InfrastructureState::Failed, FailureMode::NO_BACKUP_POWER, &mut pass);
            }
        }
        self.fail_scheduled(now, &mut pass);
        self.propagate_all(&mut pass);
        self.finish(pass)
    }

    /// Fail every entity whose scheduled failure is at or before `now`.
    pub fn check_scheduled_failures(&mut self, now: DateTime<Utc>) -> CascadeOutcome {
        let mut pass = Pass::default();
        if self.fail_scheduled(now, &mut pass) {
            self.propagate_all(&mut pass);
        }
        self.finish(pass)
    }

    /// Propagate failures of the named entities along dependency lists.
    ///
    /// Every currently failed entity seeds the pass as well.
    pub fn propagate(&mut self, failed: &[String]) -> CascadeOutcome {
        let mut pass = Pass::default();
        self.propagate_from(failed.iter().cloned(), &mut pass);
        self.finish(pass)
    }

    /// Force the named entity into `state` (failure mode Unknown).
    pub fn set_state_by_name(
        &mut self,
        name: &str,
        state: InfrastructureState,
    ) -> Result<CascadeOutcome, CascadeError> {
        let idx = self
            .entities
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| CascadeError::UnknownEntity {
                name: name.to_owned(),
            })?;
        let mut pass = Pass::default();
        if let Some(entity) = self.entities.get_mut(idx) {
            entity.state = state;
            entity.failure_mode = FailureMode::UNKNOWN;
            if state != InfrastructureState::Stressed {
                entity.scheduled_failure_at = None;
            }
        }
        pass.touch(idx);
        self.propagate_all(&mut pass);
        Ok(self.finish(pass))
    }

    /// Apply an externally edited feature.
    ///
    /// A single update replaces the entity with the same id. In the power
    /// domain a Failed replacement also fails its dependents and publishes
    /// its supply area; other domains only store the replacement. A bulk
    /// update merges `state` and `_dep*` properties into every entity of the
    /// same feature type and reports all of them except the sender.
    pub fn apply_feature_update(&mut self, update: FeatureUpdate) -> CascadeOutcome {
        if update.change_all_features_of_type {
            return self.merge_into_type(&update.feature);
        }
        let Some(id) = update.feature.id.clone().map(EntityId) else {
            return CascadeOutcome::default();
        };
        let Some(idx) = self.by_id.get(&id).copied() else {
            debug!(domain = %self.profile.kind, id = %id, "Ignoring update for unknown entity");
            return CascadeOutcome::default();
        };
        let replacement = Entity::from_feature(id, update.feature);
        if self.entities.get(idx) == Some(&replacement) {
            return CascadeOutcome::default();
        }
        let failed = replacement.is_failed();
        if let Some(slot) = self.entities.get_mut(idx) {
            *slot = replacement;
        }
        self.reindex();

        let mut pass = Pass::default();
        if failed && self.profile.kind == DomainKind::ElectricalNetwork {
            self.propagate_all(&mut pass);
        }
        let mut outcome = self.finish(pass);
        if let Some(area) = self.supply_area_feature(idx) {
            outcome.areas.push(area);
        }
        outcome
    }

    fn merge_into_type(&mut self, sender: &Feature) -> CascadeOutcome {
        let feature_type = sender
            .properties
            .get(keys::FEATURE_TYPE)
            .and_then(Value::as_str);
        let merged: Vec<(String, Value)> = sender
            .properties
            .iter()
            .filter(|(k, _)| *k == keys::STATE || k.starts_with(keys::DEP_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let state = merged
            .iter()
            .find(|(k, _)| k == keys::STATE)
            .and_then(|(_, v)| serde_json::from_value::<InfrastructureState>(v.clone()).ok());

        let mut outcome = CascadeOutcome::default();
        for entity in &mut self.entities {
            if entity.feature_type.as_deref() != feature_type {
                continue;
            }
            for (key, value) in &merged {
                if key != keys::STATE {
                    entity.properties.insert(key.clone(), value.clone());
                }
            }
            if let Some(state) = state {
                entity.state = state;
            }
            entity.refresh_attributes();
            if sender.id.as_deref() != Some(entity.id.as_str()) {
                outcome.updated.push(entity.to_feature());
            }
        }
        self.reindex();
        outcome
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Monotone state update. Returns true when the entity newly failed.
    fn raise(
        &mut self,
        idx: usize,
        state: InfrastructureState,
        mode: FailureMode,
        pass: &mut Pass,
    ) -> bool {
        let Some(entity) = self.entities.get_mut(idx) else {
            return false;
        };
        let rose = state > entity.state;
        let new_bits = !entity.failure_mode.contains(mode);
        if rose {
            entity.state = state;
        }
        if state >= entity.state {
            entity.failure_mode |= mode;
        }
        if rose || (new_bits && state >= entity.state) {
            pass.touch(idx);
        }
        rose && entity.is_failed()
    }

    fn fail_scheduled(&mut self, now: DateTime<Utc>, pass: &mut Pass) -> bool {
        let mut any = false;
        for idx in 0..self.entities.len() {
            let due = self
                .entities
                .get(idx)
                .and_then(|e| e.scheduled_failure_at)
                .is_some_and(|at| at <= now);
            if !due {
                continue;
            }
            if let Some(entity) = self.entities.get_mut(idx) {
                entity.scheduled_failure_at = None;
            }
            pass.touch(idx);
            any |= self.raise(idx, InfrastructureState::Failed, FailureMode::NO_BACKUP_POWER, pass);
        }
        any
    }

    fn propagate_all(&mut self, pass: &mut Pass) {
        self.propagate_from(core::iter::empty(), pass);
    }

    /// Work-list fixpoint over the reverse dependency index.
    ///
    /// Each entity name enters the queue at most once, so the loop runs at
    /// most `entities + seeds` times.
    fn propagate_from(&mut self, seeds: impl Iterator<Item = String>, pass: &mut Pass) {
        if !self.profile.propagates {
            return;
        }
        let mut failed: HashSet<String> = self
            .entities
            .iter()
            .filter(|e| e.is_failed())
            .map(|e| e.name.clone())
            .collect();
        failed.extend(seeds);
        let mut queue: VecDeque<String> = failed.iter().cloned().collect();

        while let Some(name) = queue.pop_front() {
            let Some(dependents) = self.dependents.get(&name).cloned() else {
                continue;
            };
            for idx in dependents {
                let Some(entity) = self.entities.get(idx) else {
                    continue;
                };
                if entity.is_failed() {
                    continue;
                }
                let total = entity.dependencies.len();
                let down = entity
                    .dependencies
                    .iter()
                    .filter(|d| failed.contains(*d))
                    .count();
                if down == 0 {
                    continue;
                }
                if down < total {
                    self.raise(idx, InfrastructureState::Stressed, FailureMode::LIMITED_POWER, pass);
                } else if self.raise(idx, InfrastructureState::Failed, FailureMode::NO_MAIN_POWER, pass)
                {
                    let name = entity_name(&self.entities, idx);
                    if failed.insert(name.clone()) {
                        queue.push_back(name);
                    }
                }
            }
        }
    }

    fn supply_area_feature(&mut self, idx: usize) -> Option<Feature> {
        if !self.profile.publishes_supply_areas {
            return None;
        }
        let entity = self.entities.get(idx)?;
        if !entity.is_failed() || self.published_areas.contains(&entity.id) {
            return None;
        }
        let area = entity.supply_area.clone()?;
        let id = entity.id.clone();
        info!(station = %entity.name, "Publishing blackout area");
        let feature = Feature::new(format!("{id}_area"), area)
            .with_property(keys::NAME, "Blackout area")
            .with_property(keys::FEATURE_TYPE, "AffectedArea");
        self.published_areas.insert(id);
        Some(feature)
    }

    fn finish(&mut self, pass: Pass) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();
        for idx in pass.touched {
            if let Some(entity) = self.entities.get(idx) {
                outcome.updated.push(entity.to_feature());
            }
            if let Some(area) = self.supply_area_feature(idx) {
                outcome.areas.push(area);
            }
        }
        outcome
    }
}

fn entity_name(entities: &[Entity], idx: usize) -> String {
    entities.get(idx).map(|e| e.name.clone()).unwrap_or_default()
}

fn minutes_duration(minutes: f64) -> Option<Duration> {
    let ms = (minutes * 60_000.0).round();
    if !ms.is_finite() || ms.abs() >= i64::MAX as f64 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let ms = ms as i64;
    Duration::try_milliseconds(ms)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crisis_geo::GridHeader;
    use crisis_types::Position;
    use serde_json::json;

    fn point(name: &str, x: f64, y: f64, props: Value) -> Feature {
        let mut f = Feature::new(name, Geometry::Point(Position::new(x, y)));
        if let Value::Object(map) = props {
            f.properties = map;
        }
        f.properties.insert("Name".to_owned(), Value::from(name));
        f
    }

    fn model(kind: DomainKind, features: Vec<Feature>) -> CascadeModel {
        let mut m = CascadeModel::new(DomainProfile::for_kind(kind).unwrap());
        m.load(features);
        m
    }

    fn state(m: &CascadeModel, name: &str) -> InfrastructureState {
        m.entity_by_name(name).unwrap().state
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn square() -> Geometry {
        Geometry::Polygon(vec![vec![
            Position::new(0.0, 0.0),
            Position::new(0.0, 1.0),
            Position::new(1.0, 1.0),
            Position::new(1.0, 0.0),
        ]])
    }

    /// 3x3 grid at origin (0,0), cell size 1: 0.2 m at (1,1), 2 m at (2,2).
    fn flood_grid() -> Grid {
        let header = GridHeader::new(0.0, 0.0, 1.0, 1.0, 3, 3);
        let values = vec![0.0, 0.0, 0.0, 0.0, 0.2, 0.0, 0.0, 0.0, 2.0];
        Grid::from_values(header, values).unwrap()
    }

    #[test]
    fn load_assigns_ids_and_drops_wrong_geometry() {
        let line = Feature::new(
            "l",
            Geometry::LineString(vec![Position::new(0.0, 0.0), Position::new(1.0, 1.0)]),
        );
        let m = model(
            DomainKind::ElectricalNetwork,
            vec![point("A", 0.5, 0.5, json!({"state": 2})), line, point("B", 0.5, 0.5, json!({}))],
        );
        assert_eq!(m.entities().len(), 2);
        assert_eq!(m.entities().get(1).unwrap().id.as_str(), "pwr_stn_2");
        assert_eq!(state(&m, "A"), InfrastructureState::Ok);
    }

    #[test]
    fn flood_fails_above_threshold_and_stresses_below() {
        let mut m = model(
            DomainKind::ElectricalNetwork,
            vec![
                point("dry", 0.5, 0.5, json!({})),
                point("wet", 1.5, 1.5, json!({"_dep_water": 0.5})),
                point("deep", 2.5, 2.5, json!({"_dep_water": 0.5})),
                point("outside", 9.0, 9.0, json!({})),
            ],
        );
        let out = m.apply_flood(&flood_grid());
        assert_eq!(state(&m, "dry"), InfrastructureState::Ok);
        assert_eq!(state(&m, "wet"), InfrastructureState::Stressed);
        assert_eq!(state(&m, "deep"), InfrastructureState::Failed);
        assert_eq!(state(&m, "outside"), InfrastructureState::Ok);
        assert_eq!(out.updated.len(), 2);

        // Same grid again changes nothing.
        assert!(m.apply_flood(&flood_grid()).is_empty());
    }

    #[test]
    fn road_uses_deepest_vertex() {
        let road = Feature::new(
            "r",
            Geometry::LineString(vec![Position::new(0.5, 0.5), Position::new(2.5, 2.5)]),
        )
        .with_property("name", "ring")
        .with_property("dependencies", json!(["water#1.0"]));
        let mut m = model(DomainKind::Roads, vec![road]);
        m.apply_flood(&flood_grid());
        assert_eq!(state(&m, "ring"), InfrastructureState::Failed);
    }

    #[test]
    fn dependency_fixpoint_is_stressed_then_failed_then_stable() {
        let mut m = model(
            DomainKind::ElectricalNetwork,
            vec![
                point("A", 5.0, 5.0, json!({"_dep_features": ["B", "C"]})),
                point("B", 5.0, 5.0, json!({})),
                point("C", 5.0, 5.0, json!({})),
                point("D", 5.0, 5.0, json!({"_dep_features": ["A"]})),
            ],
        );
        m.set_state_by_name("B", InfrastructureState::Failed).unwrap();
        assert_eq!(state(&m, "A"), InfrastructureState::Stressed);
        assert_eq!(state(&m, "D"), InfrastructureState::Ok);

        m.set_state_by_name("C", InfrastructureState::Failed).unwrap();
        assert_eq!(state(&m, "A"), InfrastructureState::Failed);
        assert_eq!(state(&m, "D"), InfrastructureState::Failed);
        assert!(
            m.entity_by_name("A")
                .unwrap()
                .failure_mode
                .contains(FailureMode::LIMITED_POWER | FailureMode::NO_MAIN_POWER)
        );

        let again = m.propagate(&["B".to_owned(), "C".to_owned()]);
        assert!(again.is_empty());
    }

    #[test]
    fn long_chain_terminates() {
        let mut features = vec![point("n0", 5.0, 5.0, json!({}))];
        for i in 1..500 {
            let dep = format!("n{}", i - 1);
            features.push(point(&format!("n{i}"), 5.0, 5.0, json!({"_dep_features": [dep]})));
        }
        let mut m = model(DomainKind::ElectricalNetwork, features);
        let out = m.set_state_by_name("n0", InfrastructureState::Failed).unwrap();
        assert_eq!(out.updated.len(), 500);
        assert_eq!(state(&m, "n499"), InfrastructureState::Failed);
    }

    #[test]
    fn backup_power_delays_failure() {
        let mut m = model(
            DomainKind::CriticalObjects,
            vec![
                point("hospital", 0.5, 0.5, json!({"_dep_UPS": 10})),
                point("school", 0.5, 0.5, json!({})),
            ],
        );
        let now = t0();
        m.apply_blackout(&square(), now);
        assert_eq!(state(&m, "hospital"), InfrastructureState::Stressed);
        assert_eq!(state(&m, "school"), InfrastructureState::Failed);
        let due = now + Duration::minutes(10);
        assert_eq!(m.next_event_at(), Some(due));

        assert!(m.check_scheduled_failures(now + Duration::minutes(9)).is_empty());
        assert_eq!(state(&m, "hospital"), InfrastructureState::Stressed);

        let out = m.check_scheduled_failures(due);
        assert_eq!(out.updated.len(), 1);
        assert_eq!(state(&m, "hospital"), InfrastructureState::Failed);
        assert_eq!(m.next_event_at(), None);
    }

    #[test]
    fn repeated_blackout_keeps_countdown() {
        let mut m = model(
            DomainKind::CriticalObjects,
            vec![point("hospital", 0.5, 0.5, json!({"_dep_UPS": 10}))],
        );
        m.apply_blackout(&square(), t0());
        m.apply_blackout(&square(), t0() + Duration::minutes(5));
        assert_eq!(m.next_event_at(), Some(t0() + Duration::minutes(10)));
        assert_eq!(state(&m, "hospital"), InfrastructureState::Stressed);
    }

    #[test]
    fn power_domain_ignores_blackouts() {
        let mut m = model(DomainKind::ElectricalNetwork, vec![point("A", 0.5, 0.5, json!({}))]);
        assert!(m.apply_blackout(&square(), t0()).is_empty());
    }

    #[test]
    fn failed_station_publishes_supply_area_once() {
        let area = json!({"type": "Polygon", "coordinates": [[[0, 0], [0, 1], [1, 1], [1, 0]]]});
        let mut m = model(
            DomainKind::ElectricalNetwork,
            vec![point("A", 5.0, 5.0, json!({"powerSupplyArea": area.to_string()}))],
        );
        let out = m.set_state_by_name("A", InfrastructureState::Failed).unwrap();
        assert_eq!(out.areas.len(), 1);
        let feature = out.areas.first().unwrap();
        assert_eq!(feature.property_str("featureTypeId"), Some("AffectedArea"));
        assert_eq!(feature.geometry, square());

        let again = m.set_state_by_name("A", InfrastructureState::Failed).unwrap();
        assert!(again.areas.is_empty());
    }

    #[test]
    fn single_feature_update_replaces_and_propagates() {
        let mut m = model(
            DomainKind::ElectricalNetwork,
            vec![
                point("A", 5.0, 5.0, json!({})),
                point("B", 5.0, 5.0, json!({"_dep_features": ["A"]})),
            ],
        );
        let mut edited = m.entity_by_name("A").unwrap().to_feature();
        edited.properties.insert("state".to_owned(), json!(2));
        let out = m.apply_feature_update(FeatureUpdate {
            feature: edited,
            change_all_features_of_type: false,
        });
        assert_eq!(state(&m, "A"), InfrastructureState::Failed);
        assert_eq!(state(&m, "B"), InfrastructureState::Failed);
        assert_eq!(out.updated.len(), 1);
    }

    #[test]
    fn failed_update_outside_power_domain_does_not_cascade() {
        let mut m = model(
            DomainKind::CriticalObjects,
            vec![
                point("A", 5.0, 5.0, json!({})),
                point("B", 5.0, 5.0, json!({"_dep_features": ["A"]})),
            ],
        );
        let mut edited = m.entity_by_name("A").unwrap().to_feature();
        edited.properties.insert("state".to_owned(), json!(2));
        let out = m.apply_feature_update(FeatureUpdate {
            feature: edited,
            change_all_features_of_type: false,
        });
        assert_eq!(state(&m, "A"), InfrastructureState::Failed);
        assert_eq!(state(&m, "B"), InfrastructureState::Ok);
        assert!(out.updated.is_empty());
    }

    #[test]
    fn echo_of_own_update_is_ignored() {
        let mut m = model(DomainKind::Roads, vec![]);
        m.load(vec![
            Feature::new(
                "x",
                Geometry::LineString(vec![Position::new(0.0, 0.0), Position::new(1.0, 0.0)]),
            )
            .with_property("name", "r"),
        ]);
        let echo = m.entities().first().unwrap().to_feature();
        let out = m.apply_feature_update(FeatureUpdate {
            feature: echo,
            change_all_features_of_type: false,
        });
        assert!(out.is_empty());
    }

    #[test]
    fn bulk_update_merges_into_same_type() {
        let mut m = model(
            DomainKind::HazardousObjects,
            vec![
                point("a", 5.0, 5.0, json!({"featureTypeId": "tank"})),
                point("b", 5.0, 5.0, json!({"featureTypeId": "tank"})),
                point("c", 5.0, 5.0, json!({"featureTypeId": "depot"})),
            ],
        );
        let mut sender = m.entity_by_name("a").unwrap().to_feature();
        sender.properties.insert("_dep_water".to_owned(), json!(3.0));
        sender.properties.insert("remark".to_owned(), json!("ignored"));
        let out = m.apply_feature_update(FeatureUpdate {
            feature: sender,
            change_all_features_of_type: true,
        });
        assert_eq!(out.updated.len(), 1);
        let b = m.entity_by_name("b").unwrap();
        assert!((b.water_threshold - 3.0).abs() < f64::EPSILON);
        assert!(!b.properties.contains_key("remark"));
        let c = m.entity_by_name("c").unwrap();
        assert!(c.water_threshold.abs() < f64::EPSILON);
    }

    #[test]
    fn reset_restores_baseline() {
        let mut m = model(DomainKind::ElectricalNetwork, vec![point("A", 1.5, 1.5, json!({}))]);
        m.apply_flood(&flood_grid());
        assert_eq!(state(&m, "A"), InfrastructureState::Failed);
        m.reset();
        assert_eq!(state(&m, "A"), InfrastructureState::Ok);
        assert!(m.entity_by_name("A").unwrap().failure_mode.is_empty());
    }

    #[test]
    fn unknown_station_is_an_error() {
        let mut m = model(DomainKind::ElectricalNetwork, vec![]);
        assert!(matches!(
            m.set_state_by_name("nope", InfrastructureState::Failed),
            Err(CascadeError::UnknownEntity { .. })
        ));
    }
}
