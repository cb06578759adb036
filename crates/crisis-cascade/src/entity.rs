//! Typed infrastructure entities.
//!
//! Incoming features carry their attributes in a free-form property map.
//! [`Entity::from_feature`] lifts the keys the cascade rules depend on into
//! typed fields and keeps the rest for republication:
//!
//! | Property | Field |
//! |---|---|
//! | `Name` / `name` | [`Entity::name`] |
//! | `featureTypeId` | [`Entity::feature_type`] |
//! | `state`, `failureMode` | [`Entity::state`], [`Entity::failure_mode`] |
//! | `willFailAt` (epoch ms) | [`Entity::scheduled_failure_at`] |
//! | `_dep_water`, `dependencies: ["water#x"]` | [`Entity::water_threshold`] |
//! | `_dep_features`, other `dependencies` entries | [`Entity::dependencies`] |
//! | `_dep_UPS` (minutes) | [`Entity::backup_minutes`] |
//! | `powerSupplyArea` | [`Entity::supply_area`] |
//! | `Aantal bedden` | [`Entity::beds`] |

use chrono::{DateTime, TimeZone, Utc};
use crisis_types::{EntityId, FailureMode, Feature, Geometry, InfrastructureState, Position};
use serde_json::{Map, Value};

/// Property keys with typed counterparts.
pub mod keys {
    /// Entity name.
    pub const NAME: &str = "Name";
    /// Lower-case entity name variant.
    pub const NAME_LOWER: &str = "name";
    /// Feature type shared by interchangeable entities.
    pub const FEATURE_TYPE: &str = "featureTypeId";
    /// Infrastructure state code.
    pub const STATE: &str = "state";
    /// Failure mode bits.
    pub const FAILURE_MODE: &str = "failureMode";
    /// Scheduled failure time, epoch ms.
    pub const WILL_FAIL_AT: &str = "willFailAt";
    /// Water depth the entity tolerates.
    pub const DEP_WATER: &str = "_dep_water";
    /// Names of entities this entity depends on.
    pub const DEP_FEATURES: &str = "_dep_features";
    /// Backup power duration in minutes.
    pub const DEP_UPS: &str = "_dep_UPS";
    /// Legacy mixed dependency list.
    pub const DEPENDENCIES: &str = "dependencies";
    /// Area supplied by a power station.
    pub const POWER_SUPPLY_AREA: &str = "powerSupplyArea";
    /// Hospital bed count.
    pub const BEDS: &str = "Aantal bedden";
    /// Prefix shared by all dependency keys.
    pub const DEP_PREFIX: &str = "_dep";
}

/// One piece of infrastructure.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Identity within the domain.
    pub id: EntityId,
    /// Name other entities refer to in their dependency lists.
    pub name: String,
    /// Shared type id for bulk edits.
    pub feature_type: Option<String>,
    /// Location.
    pub geometry: Geometry,
    /// Current state.
    pub state: InfrastructureState,
    /// Reasons for the current state.
    pub failure_mode: FailureMode,
    /// Water depth above which the entity fails.
    pub water_threshold: f64,
    /// Names of upstream entities.
    pub dependencies: Vec<String>,
    /// Backup power duration in minutes.
    pub backup_minutes: Option<f64>,
    /// When the backup power runs out.
    pub scheduled_failure_at: Option<DateTime<Utc>>,
    /// Area that loses power when this entity fails.
    pub supply_area: Option<Geometry>,
    /// Number of beds, for hospitals.
    pub beds: Option<u64>,
    /// Remaining properties, including the raw dependency keys.
    pub properties: Map<String, Value>,
}

impl Entity {
    /// Decode a feature, giving it `id`.
    pub fn from_feature(id: EntityId, feature: Feature) -> Self {
        let mut properties = feature.properties;
        let state = properties
            .remove(keys::STATE)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let failure_mode = properties
            .remove(keys::FAILURE_MODE)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let scheduled_failure_at = properties
            .remove(keys::WILL_FAIL_AT)
            .as_ref()
            .and_then(number)
            .and_then(epoch_ms);

        let mut entity = Self {
            name: id.to_string(),
            id,
            feature_type: None,
            geometry: feature.geometry,
            state,
            failure_mode,
            water_threshold: 0.0,
            dependencies: Vec::new(),
            backup_minutes: None,
            scheduled_failure_at,
            supply_area: None,
            beds: None,
            properties,
        };
        entity.refresh_attributes();
        entity
    }

    /// Re-derive typed attributes from [`Entity::properties`].
    pub fn refresh_attributes(&mut self) {
        let props = &self.properties;
        if let Some(name) = props
            .get(keys::NAME)
            .or_else(|| props.get(keys::NAME_LOWER))
            .and_then(Value::as_str)
        {
            self.name = name.to_owned();
        }
        self.feature_type = props
            .get(keys::FEATURE_TYPE)
            .and_then(Value::as_str)
            .map(str::to_owned);

        let mut threshold = props.get(keys::DEP_WATER).and_then(number);
        let mut dependencies: Vec<String> = props
            .get(keys::DEP_FEATURES)
            .and_then(Value::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        if let Some(legacy) = props.get(keys::DEPENDENCIES).and_then(Value::as_array) {
            for dep in legacy.iter().filter_map(Value::as_str) {
                match dep.split_once('#') {
                    Some(("water", level)) => {
                        threshold = threshold.or_else(|| level.trim().parse().ok());
                    }
                    Some(_) => {}
                    None => dependencies.push(dep.to_owned()),
                }
            }
        }
        self.water_threshold = threshold.unwrap_or(0.0);
        self.dependencies = dependencies;
        self.backup_minutes = props.get(keys::DEP_UPS).and_then(number);
        self.supply_area = props.get(keys::POWER_SUPPLY_AREA).and_then(area);
        self.beds = props
            .get(keys::BEDS)
            .and_then(number)
            .filter(|b| b.is_finite() && *b >= 0.0)
            .map(|b| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let beds = b.round() as u64;
                beds
            });
    }

    /// Encode back into a feature with current state properties.
    pub fn to_feature(&self) -> Feature {
        let mut feature = Feature::new(self.id.as_str(), self.geometry.clone());
        feature.properties.clone_from(&self.properties);
        feature
            .properties
            .insert(keys::STATE.to_owned(), Value::from(self.state.code()));
        feature.properties.insert(
            keys::FAILURE_MODE.to_owned(),
            Value::from(self.failure_mode.bits()),
        );
        if let Some(at) = self.scheduled_failure_at {
            feature
                .properties
                .insert(keys::WILL_FAIL_AT.to_owned(), Value::from(at.timestamp_millis()));
        }
        feature
    }

    /// Vertices sampled for hazard checks.
    pub fn sample_points(&self) -> &[Position] {
        match &self.geometry {
            Geometry::Point(p) => core::slice::from_ref(p),
            Geometry::MultiPoint(points) | Geometry::LineString(points) => points,
            Geometry::MultiLineString(_) | Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
                &[]
            }
        }
    }

    /// Returns true once Failed.
    pub const fn is_failed(&self) -> bool {
        self.state.is_failed()
    }
}

/// Read a number that may be encoded as a string.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn epoch_ms(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let ms = ms.round() as i64;
    Utc.timestamp_millis_opt(ms).single()
}

/// Supply areas arrive either as geometry objects or JSON-encoded strings.
fn area(value: &Value) -> Option<Geometry> {
    match value {
        Value::String(s) => serde_json::from_str(s).ok(),
        Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}
