//! Topic naming.
//!
//! Control topics live under a configurable namespace (`Sim` by default):
//!
//! | Subject | Direction | Payload |
//! |---|---|---|
//! | `<ns>.SimState.<node>` | node -> coordinator | [`SimStateReport`](crate::SimStateReport) |
//! | `<ns>.SimTime` | coordinator -> all | [`SimTimeMessage`](crate::SimTimeMessage) |
//! | `<ns>.Job` | client <-> coordinator | [`JobPayload`](crate::JobPayload) |
//! | `<ns>.NextEvent` | client -> coordinator | [`NextEventRequest`](crate::NextEventRequest) |
//! | `<ns>.Load.<NodeType>` | coordinator -> node | [`LoadCommand`](crate::LoadCommand) |
//! | `<ns>.PowerStationCmd` | client -> power node | [`PowerStationCommand`](crate::PowerStationCommand) |
//!
//! Domain data is shared on `layers.<layerId>` (snapshots),
//! `layers.<layerId>.feature` (single updates), `layers.<layerId>.batch`
//! and `keys.<key>` (charts).

use crate::enums::DomainKind;
use crate::messages::Message;

/// Well-known layer ids, one per domain.
pub mod layer_ids {
    /// Flood depth grid.
    pub const FLOOD: &str = "floodsim";
    /// Power stations.
    pub const POWER: &str = "powerstations";
    /// Communication objects.
    pub const COMMUNICATION: &str = "communicationobjects";
    /// Road segments.
    pub const ROADS: &str = "roadobjects";
    /// Critical objects.
    pub const CRITICAL: &str = "criticalobjects";
    /// Hazardous objects.
    pub const HAZARDOUS: &str = "hazardousobjects";
    /// Cell coverage grid.
    pub const COVERAGE: &str = "cellcoverage";
}

impl DomainKind {
    /// Layer id the domain publishes on.
    pub const fn layer_id(self) -> &'static str {
        match self {
            Self::Flooding => layer_ids::FLOOD,
            Self::ElectricalNetwork => layer_ids::POWER,
            Self::Communication => layer_ids::COMMUNICATION,
            Self::CellCoverage => layer_ids::COVERAGE,
            Self::CriticalObjects => layer_ids::CRITICAL,
            Self::HazardousObjects => layer_ids::HAZARDOUS,
            Self::Roads => layer_ids::ROADS,
        }
    }
}

/// A parsed subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Status of the named node.
    SimState(String),
    /// Shared clock.
    SimTime,
    /// Job channel.
    Job,
    /// Fast-forward requests.
    NextEvent,
    /// Load instruction for a domain.
    Load(DomainKind),
    /// Power station override.
    PowerStationCmd,
    /// Layer snapshot.
    Layer(String),
    /// Single feature update on a layer.
    Feature(String),
    /// Feature batch on a layer.
    FeatureBatch(String),
    /// Key/value channel.
    Key(String),
}

/// Subject builder bound to one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    namespace: String,
}

impl Topics {
    /// Create a builder for the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// The namespace in use.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Wire subject for a topic.
    pub fn subject(&self, topic: &Topic) -> String {
        let ns = &self.namespace;
        match topic {
            Topic::SimState(node) => format!("{ns}.SimState.{node}"),
            Topic::SimTime => format!("{ns}.SimTime"),
            Topic::Job => format!("{ns}.Job"),
            Topic::NextEvent => format!("{ns}.NextEvent"),
            Topic::Load(kind) => format!("{ns}.Load.{}", kind.folder_name()),
            Topic::PowerStationCmd => format!("{ns}.PowerStationCmd"),
            Topic::Layer(id) => format!("layers.{id}"),
            Topic::Feature(id) => format!("layers.{id}.feature"),
            Topic::FeatureBatch(id) => format!("layers.{id}.batch"),
            Topic::Key(key) => format!("keys.{key}"),
        }
    }

    /// Wildcard subscriptions covering every topic in the namespace.
    pub fn wildcards(&self) -> Vec<String> {
        vec![
            format!("{}.>", self.namespace),
            "layers.>".to_owned(),
            "keys.>".to_owned(),
        ]
    }

    /// Parse a wire subject. Subjects outside the known families yield `None`.
    pub fn parse(&self, subject: &str) -> Option<Topic> {
        let parts: Vec<&str> = subject.split('.').collect();
        match parts.as_slice() {
            ["layers", id] => Some(Topic::Layer((*id).to_owned())),
            ["layers", id, "feature"] => Some(Topic::Feature((*id).to_owned())),
            ["layers", id, "batch"] => Some(Topic::FeatureBatch((*id).to_owned())),
            ["keys", key] => Some(Topic::Key((*key).to_owned())),
            [ns, rest @ ..] if *ns == self.namespace => match rest {
                ["SimState", node] => Some(Topic::SimState((*node).to_owned())),
                ["SimTime"] => Some(Topic::SimTime),
                ["Job"] => Some(Topic::Job),
                ["NextEvent"] => Some(Topic::NextEvent),
                ["Load", kind] => DomainKind::from_folder_name(kind).map(Topic::Load),
                ["PowerStationCmd"] => Some(Topic::PowerStationCmd),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new("Sim")
    }
}

impl Message {
    /// Topic the message is published on.
    pub fn topic(&self) -> Topic {
        match self {
            Self::SimState(report) => Topic::SimState(report.name.clone()),
            Self::SimTime(_) => Topic::SimTime,
            Self::Job(_) => Topic::Job,
            Self::NextEvent(_) => Topic::NextEvent,
            Self::Load(kind, _) => Topic::Load(*kind),
            Self::PowerStationCmd(_) => Topic::PowerStationCmd,
            Self::Layer(layer) => Topic::Layer(layer.id.clone()),
            Self::Feature(layer_id, _) => Topic::Feature(layer_id.clone()),
            Self::FeatureBatch(batch) => Topic::FeatureBatch(batch.layer_id.clone()),
            Self::Chart(chart) => Topic::Key(chart.id.clone()),
        }
    }
}
