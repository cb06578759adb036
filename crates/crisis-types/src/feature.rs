//! GeoJSON-style geometry and feature payloads.
//!
//! Positions are `[lon, lat]` pairs; any trailing altitude value in incoming
//! data is accepted and dropped. Feature properties stay an open JSON map so
//! that domain-specific keys survive a load and publish round trip.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct Position {
    /// Longitude.
    pub lon: f64,
    /// Latitude.
    pub lat: f64,
}

impl Position {
    /// Create a position from longitude and latitude.
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = String;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [lon, lat, ..] => Ok(Self::new(*lon, *lat)),
            _ => Err(format!("position needs two coordinates, got {}", values.len())),
        }
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        [p.lon, p.lat]
    }
}

/// Feature geometry, tagged by the GeoJSON `type` member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    /// A single position.
    Point(Position),
    /// Several unconnected positions.
    MultiPoint(Vec<Position>),
    /// A polyline.
    LineString(Vec<Position>),
    /// Several polylines.
    MultiLineString(Vec<Vec<Position>>),
    /// Outer ring followed by optional holes.
    Polygon(Vec<Vec<Position>>),
    /// Several polygons.
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// GeoJSON type name.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::MultiPoint(_) => "MultiPoint",
            Self::LineString(_) => "LineString",
            Self::MultiLineString(_) => "MultiLineString",
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }
}

fn feature_tag() -> String {
    "Feature".to_owned()
}

/// A geometry with an identity and free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// GeoJSON type member, always `Feature`.
    #[serde(rename = "type", default = "feature_tag")]
    pub kind: String,
    /// Feature identity. Assigned at load time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Geometry of the feature.
    pub geometry: Geometry,
    /// Domain properties (`state`, `failureMode`, `_dep_*`, `featureTypeId`, ...).
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Create a feature with no properties.
    pub fn new(id: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            kind: feature_tag(),
            id: Some(id.into()),
            geometry,
            properties: Map::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_owned(), value.into());
        self
    }

    /// String-valued property lookup.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// A GeoJSON feature collection as stored in scenario files.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    /// GeoJSON type member.
    #[serde(rename = "type", default = "collection_tag")]
    pub kind: String,
    /// Member features.
    #[serde(default)]
    pub features: Vec<Feature>,
}

fn collection_tag() -> String {
    "FeatureCollection".to_owned()
}

impl FeatureCollection {
    /// Wrap a list of features.
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: collection_tag(),
            features,
        }
    }
}

/// A published map layer: either a feature set or a text grid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Layer {
    /// Layer identity, e.g. `powerstations`. Taken from the subject when absent.
    #[serde(default)]
    pub id: String,
    /// Human readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Layer kind, e.g. `geojson` or `grid`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Grid payload in ESRI ASCII form, for grid layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Feature payload, for feature layers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,
}

impl Layer {
    /// A feature layer.
    pub fn features(id: &str, features: Vec<Feature>) -> Self {
        Self {
            id: id.to_owned(),
            title: None,
            kind: Some("geojson".to_owned()),
            data: None,
            features,
        }
    }

    /// A grid layer carrying an ESRI ASCII grid.
    pub fn grid(id: &str, data: String) -> Self {
        Self {
            id: id.to_owned(),
            title: None,
            kind: Some("grid".to_owned()),
            data: Some(data),
            features: Vec::new(),
        }
    }
}

/// An externally edited feature.
///
/// With `changeAllFeaturesOfType` set, the state and dependency properties
/// are copied onto every feature sharing the same `featureTypeId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureUpdate {
    /// The edited feature.
    #[serde(flatten)]
    pub feature: Feature,
    /// Apply the edit to every feature of the same type.
    #[serde(
        rename = "changeAllFeaturesOfType",
        default,
        skip_serializing_if = "core::ops::Not::not"
    )]
    pub change_all_features_of_type: bool,
}

/// A batch of feature changes on one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureBatch {
    /// Target layer id. Taken from the subject when absent.
    #[serde(default)]
    pub layer_id: String,
    /// Changed features.
    pub features: Vec<Feature>,
}
