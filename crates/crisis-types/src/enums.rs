//! Enumeration types for the crisis simulation.
//!
//! Node lifecycle states and commands travel on the wire as their variant
//! names (`"Ready"`, `"Run"`). Infrastructure state travels as an integer
//! (`0`, `1`, `2`) and failure modes as an integer bit set.

use core::fmt;
use core::str::FromStr;

use bitflags::bitflags;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Node lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a simulation node or of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SimState {
    /// Registered but not running a scenario.
    Idle,
    /// Holding position; time updates are ignored.
    Pause,
    /// Caught up with simulation time and waiting for the next step.
    Ready,
    /// Processing a time step or a scenario load.
    Busy,
    /// Terminated. Terminal state.
    Exit,
}

impl SimState {
    /// Every state, in declaration order.
    pub const ALL: [Self; 5] = [Self::Idle, Self::Pause, Self::Ready, Self::Busy, Self::Exit];

    /// Wire name of the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Pause => "Pause",
            Self::Ready => "Ready",
            Self::Busy => "Busy",
            Self::Exit => "Exit",
        }
    }
}

impl fmt::Display for SimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant(s.to_owned()))
    }
}

/// Command that drives a node's lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SimCommand {
    /// Begin or resume a scenario.
    Start,
    /// Suspend a running scenario.
    Pause,
    /// Stop the scenario and return to idle.
    Stop,
    /// Begin processing work.
    Run,
    /// Work complete; back to ready.
    Finish,
    /// Terminate the node.
    Exit,
}

impl SimCommand {
    /// Every command, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Start,
        Self::Pause,
        Self::Stop,
        Self::Run,
        Self::Finish,
        Self::Exit,
    ];

    /// Wire name of the command.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Pause => "Pause",
            Self::Stop => "Stop",
            Self::Run => "Run",
            Self::Finish => "Finish",
            Self::Exit => "Exit",
        }
    }
}

impl fmt::Display for SimCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimCommand {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant(s.to_owned()))
    }
}

/// A string did not name any variant of the target enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

// ---------------------------------------------------------------------------
// Infrastructure state
// ---------------------------------------------------------------------------

/// Operational state of an infrastructure entity, ordered by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InfrastructureState {
    /// Fully operational.
    #[default]
    Ok,
    /// Operating under degraded conditions.
    Stressed,
    /// Not operating.
    Failed,
}

impl InfrastructureState {
    /// Integer wire code.
    pub const fn code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Stressed => 1,
            Self::Failed => 2,
        }
    }

    /// Decode an integer wire code.
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::Stressed),
            2 => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns true for [`InfrastructureState::Failed`].
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl Serialize for InfrastructureState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for InfrastructureState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StateVisitor)
    }
}

/// Accepts the integer code, or the code or variant name as a string.
struct StateVisitor;

impl Visitor<'_> for StateVisitor {
    type Value = InfrastructureState;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an infrastructure state code 0, 1 or 2")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        InfrastructureState::from_code(v)
            .ok_or_else(|| E::custom(format!("invalid infrastructure state {v}")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        let code = u64::try_from(v)
            .map_err(|_err| E::custom(format!("invalid infrastructure state {v}")))?;
        self.visit_u64(code)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if v.fract().abs() > f64::EPSILON || !(0.0..=2.0).contains(&v) {
            return Err(E::custom(format!("invalid infrastructure state {v}")));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let code = v as u64;
        self.visit_u64(code)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        match v.trim() {
            "0" | "Ok" | "ok" => Ok(InfrastructureState::Ok),
            "1" | "Stressed" | "stressed" => Ok(InfrastructureState::Stressed),
            "2" | "Failed" | "failed" => Ok(InfrastructureState::Failed),
            other => Err(E::custom(format!("invalid infrastructure state '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

bitflags! {
    /// Set of reasons an entity is stressed or failed.
    ///
    /// The empty set means no failure mode is recorded.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct FailureMode: u32 {
        /// Cause not known.
        const UNKNOWN = 1;
        /// Under water.
        const FLOODED = 2;
        /// Some upstream power sources failed.
        const LIMITED_POWER = 4;
        /// All upstream power sources failed.
        const NO_MAIN_POWER = 8;
        /// Backup power exhausted.
        const NO_BACKUP_POWER = 16;
        /// Communication links lost.
        const NO_COMMS = 32;
    }
}

impl Serialize for FailureMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for FailureMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

/// Infrastructure or hazard domain simulated by one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DomainKind {
    /// Flood depth grids over time.
    Flooding,
    /// Power stations and substations.
    ElectricalNetwork,
    /// Communication towers and switching objects.
    Communication,
    /// Mobile network coverage derived from tower state.
    CellCoverage,
    /// Hospitals and other objects with backup power.
    CriticalObjects,
    /// Objects that become dangerous when flooded or unpowered.
    HazardousObjects,
    /// Road segments.
    Roads,
}

impl DomainKind {
    /// Every domain, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Flooding,
        Self::ElectricalNetwork,
        Self::Communication,
        Self::CellCoverage,
        Self::CriticalObjects,
        Self::HazardousObjects,
        Self::Roads,
    ];

    /// Scenario sub-folder holding this domain's input files.
    pub const fn folder_name(self) -> &'static str {
        match self {
            Self::Flooding => "Flooding",
            Self::ElectricalNetwork => "ElectricalNetwork",
            Self::Communication => "Communication",
            Self::CellCoverage => "CellCoverage",
            Self::CriticalObjects => "CriticalObjects",
            Self::HazardousObjects => "HazardousObjects",
            Self::Roads => "Roads",
        }
    }

    /// Node name advertised in status reports and load topics.
    pub const fn node_name(self) -> &'static str {
        match self {
            Self::Flooding => "FloodSim",
            Self::ElectricalNetwork => "ElectricalNetworkSim",
            Self::Communication => "CommunicationSim",
            Self::CellCoverage => "CellCoverageSim",
            Self::CriticalObjects => "CriticalObjectsSim",
            Self::HazardousObjects => "HazardousObjectsSim",
            Self::Roads => "RoadSim",
        }
    }

    /// Look a domain up by scenario folder name, case-insensitively.
    pub fn from_folder_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.folder_name().eq_ignore_ascii_case(name))
    }

    /// Look a domain up by node name.
    pub fn from_node_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.node_name() == name)
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sim_state_wire_names() {
        assert_eq!(serde_json::to_string(&SimState::Ready).unwrap(), "\"Ready\"");
        assert_eq!("busy".parse::<SimState>().unwrap(), SimState::Busy);
        assert!("Sleeping".parse::<SimState>().is_err());
    }

    #[test]
    fn command_parse_is_case_insensitive() {
        assert_eq!("start".parse::<SimCommand>().unwrap(), SimCommand::Start);
        assert_eq!("Finish".parse::<SimCommand>().unwrap(), SimCommand::Finish);
        assert!("Jump".parse::<SimCommand>().is_err());
    }

    #[test]
    fn infrastructure_state_is_ordered_by_severity() {
        assert!(InfrastructureState::Ok < InfrastructureState::Stressed);
        assert!(InfrastructureState::Stressed < InfrastructureState::Failed);
    }

    #[test]
    fn infrastructure_state_accepts_numbers_and_strings() {
        let from_int: InfrastructureState = serde_json::from_str("2").unwrap();
        let from_str: InfrastructureState = serde_json::from_str("\"1\"").unwrap();
        assert_eq!(from_int, InfrastructureState::Failed);
        assert_eq!(from_str, InfrastructureState::Stressed);
        assert_eq!(serde_json::to_string(&InfrastructureState::Failed).unwrap(), "2");
        assert!(serde_json::from_str::<InfrastructureState>("7").is_err());
    }

    #[test]
    fn failure_mode_serializes_as_bits() {
        let mode = FailureMode::FLOODED | FailureMode::NO_MAIN_POWER;
        assert_eq!(serde_json::to_string(&mode).unwrap(), "10");
        let back: FailureMode = serde_json::from_str("10").unwrap();
        assert_eq!(back, mode);
        assert!(FailureMode::default().is_empty());
    }

    #[test]
    fn domain_names_resolve() {
        assert_eq!(
            DomainKind::from_folder_name("electricalnetwork"),
            Some(DomainKind::ElectricalNetwork)
        );
        assert_eq!(DomainKind::from_node_name("RoadSim"), Some(DomainKind::Roads));
        assert_eq!(DomainKind::from_folder_name("Weather"), None);
    }
}
