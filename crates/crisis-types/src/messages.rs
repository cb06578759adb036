//! Message payloads exchanged over the simulation topics.
//!
//! Field names follow the camelCase wire schema. Times on the wire are epoch
//! milliseconds.

use serde::{Deserialize, Serialize};

use crate::enums::{DomainKind, InfrastructureState, SimState};
use crate::feature::{FeatureBatch, FeatureUpdate, Layer};
use crate::ids::NodeId;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Status record published by every node on its `SimState` topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimStateReport {
    /// Reporting node.
    pub id: NodeId,
    /// Node name, e.g. `ElectricalNetworkSim`.
    pub name: String,
    /// Current lifecycle state.
    pub state: SimState,
    /// The node's current simulation time (epoch ms).
    pub time: i64,
    /// Earliest pending event in the node (epoch ms), if any.
    #[serde(default)]
    pub next_event: Option<i64>,
    /// Optional human readable note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// Process id of the hosting process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Resident memory of the hosting process in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<u64>,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A number that may arrive as JSON number or as numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    /// A JSON number.
    Number(f64),
    /// A string holding a number.
    Text(String),
}

impl LooseNumber {
    /// Numeric value, if the text form parses.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Value rounded to whole milliseconds, if finite and in range.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn millis(&self) -> Option<i64> {
        self.value()
            .filter(|v| v.is_finite() && v.abs() < i64::MAX as f64)
            .map(|v| v.round() as i64)
    }
}

/// Control object on the time topic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimTimeControl {
    /// New simulation time (epoch ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_time: Option<LooseNumber>,
    /// New rate multiplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_speed: Option<LooseNumber>,
    /// New step interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_time_step: Option<LooseNumber>,
    /// Lifecycle command name, e.g. `Start`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_cmd: Option<String>,
}

/// Payload of the shared time topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SimTimeMessage {
    /// Plain clock broadcast (epoch ms).
    Epoch(i64),
    /// Clock control object.
    Control(SimTimeControl),
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// A request on the job channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobRequest {
    /// Query name; only `scenarios` is answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<String>,
    /// Scenario to switch to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
}

/// Anything seen on the job channel, including the coordinator's own replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobPayload {
    /// List of scenario names (reply to `{get: "scenarios"}`).
    Scenarios(Vec<String>),
    /// A query or command.
    Request(JobRequest),
}

/// Fast-forward request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NextEventRequest {
    /// Must be true for the request to be considered.
    #[serde(default)]
    pub next: bool,
}

/// Instruction to a domain node to (re)initialize from a scenario folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadCommand {
    /// Scenario name (lower-case).
    pub scenario: String,
    /// Domain folder holding the node's input files.
    pub folder: String,
}

/// Operator override of a power station state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerStationCommand {
    /// Station name.
    pub power_station: String,
    /// Forced state.
    pub state: InfrastructureState,
}

// ---------------------------------------------------------------------------
// Charts
// ---------------------------------------------------------------------------

/// A single chart sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// Whole hours since scenario start.
    pub x: i64,
    /// Sample value.
    pub y: u64,
}

/// A named series of samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSeries {
    /// Series name.
    pub name: String,
    /// Samples ordered by `x`.
    pub values: Vec<ChartPoint>,
}

/// Bed availability chart published by the critical objects node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedChart {
    /// Chart id.
    pub id: String,
    /// Chart title.
    pub title: String,
    /// One series per bed state.
    pub series: Vec<ChartSeries>,
}

// ---------------------------------------------------------------------------
// Typed message
// ---------------------------------------------------------------------------

/// Every payload the simulation exchanges, one variant per topic family.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Node status.
    SimState(SimStateReport),
    /// Clock broadcast or control.
    SimTime(SimTimeMessage),
    /// Job query, command or reply.
    Job(JobPayload),
    /// Fast-forward request.
    NextEvent(NextEventRequest),
    /// Scenario load instruction for one domain.
    Load(DomainKind, LoadCommand),
    /// Operator power station override.
    PowerStationCmd(PowerStationCommand),
    /// Full layer snapshot.
    Layer(Layer),
    /// Single feature update on a layer.
    Feature(String, FeatureUpdate),
    /// Batch of feature updates.
    FeatureBatch(FeatureBatch),
    /// Chart key update.
    Chart(BedChart),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn time_topic_accepts_epoch_and_control() {
        let epoch: SimTimeMessage = serde_json::from_str("1700000000000").unwrap();
        assert_eq!(epoch, SimTimeMessage::Epoch(1_700_000_000_000));

        let control: SimTimeMessage =
            serde_json::from_str(r#"{"simSpeed":"4","simCmd":"Pause"}"#).unwrap();
        let expected = SimTimeControl {
            sim_speed: Some(LooseNumber::Text("4".to_owned())),
            sim_cmd: Some("Pause".to_owned()),
            ..SimTimeControl::default()
        };
        assert_eq!(control, SimTimeMessage::Control(expected));
        assert_eq!(LooseNumber::Text("4".to_owned()).value(), Some(4.0));
    }

    #[test]
    fn job_channel_distinguishes_replies() {
        let reply: JobPayload = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert!(matches!(reply, JobPayload::Scenarios(ref v) if v.len() == 2));

        let req: JobPayload = serde_json::from_str(r#"{"start":"Flood1"}"#).unwrap();
        assert!(matches!(req, JobPayload::Request(JobRequest { start: Some(ref s), .. }) if s == "Flood1"));
    }

    #[test]
    fn status_record_wire_shape() {
        let report = SimStateReport {
            id: NodeId::new(),
            name: "RoadSim".to_owned(),
            state: SimState::Ready,
            time: 5,
            next_event: None,
            msg: None,
            pid: Some(1),
            mem: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "Ready");
        assert!(json["nextEvent"].is_null());
        assert!(json.get("msg").is_none());
    }

    #[test]
    fn power_station_command_parses() {
        let cmd: PowerStationCommand =
            serde_json::from_str(r#"{"powerStation":"Centrale","state":2}"#).unwrap();
        assert_eq!(cmd.state, InfrastructureState::Failed);
    }
}
