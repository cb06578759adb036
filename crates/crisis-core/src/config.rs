//! Configuration loading and typed config structures for the crisis simulation.
//!
//! The configuration lives in `crisis-config.yaml` (path overridable with
//! `CRISIS_CONFIG`). Every field has a default, so an empty or missing file
//! yields a runnable local setup.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Clock and topic namespace settings.
    #[serde(default)]
    pub simulation: ClockConfig,

    /// Node runtime timing.
    #[serde(default)]
    pub node: NodeConfig,

    /// Transport settings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Scenario data location.
    #[serde(default)]
    pub scenarios: ScenarioConfig,

    /// Cell coverage model settings.
    #[serde(default)]
    pub coverage: CoverageConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `NATS_URL` overrides `infrastructure.nats_url` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.infrastructure.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.sim_step_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "simulation.sim_step_ms must be at least 1".to_owned(),
            });
        }
        if !self.simulation.sim_speed.is_finite() || self.simulation.sim_speed < 0.0 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "simulation.sim_speed must be a non-negative number, got {}",
                    self.simulation.sim_speed
                ),
            });
        }
        if self.node.heartbeat_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "node.heartbeat_ms must be at least 1".to_owned(),
            });
        }
        if !self.coverage.radius_cells.is_finite() || self.coverage.radius_cells <= 0.0 {
            return Err(ConfigError::Invalid {
                reason: "coverage.radius_cells must be positive".to_owned(),
            });
        }
        if self.simulation.namespace.is_empty() || self.simulation.namespace.contains('.') {
            return Err(ConfigError::Invalid {
                reason: "simulation.namespace must be a single non-empty subject token".to_owned(),
            });
        }
        Ok(())
    }
}

/// Clock settings shared by the coordinator and every node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClockConfig {
    /// Topic namespace, e.g. `Sim` for `Sim.SimTime`.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Wall-clock milliseconds between coordinator ticks.
    #[serde(default = "default_sim_step_ms")]
    pub sim_step_ms: u64,

    /// Simulated milliseconds per wall-clock millisecond.
    #[serde(default = "default_sim_speed")]
    pub sim_speed: f64,

    /// Initial simulation time. Wall-clock now when absent.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            sim_step_ms: default_sim_step_ms(),
            sim_speed: default_sim_speed(),
            start_time: None,
        }
    }
}

/// Node runtime timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    /// Interval between unsolicited status reports.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// Minimum spacing between bulk layer publications.
    #[serde(default = "default_publish_throttle_ms")]
    pub publish_throttle_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: default_heartbeat_ms(),
            publish_throttle_ms: default_publish_throttle_ms(),
        }
    }
}

/// Which message transport the engine uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// NATS broker at `infrastructure.nats_url`.
    #[default]
    Nats,
    /// In-process router only.
    Local,
}

/// Infrastructure connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// NATS messaging URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Transport selection.
    #[serde(default)]
    pub transport: Transport,
}

impl InfrastructureConfig {
    /// Override the NATS URL with `NATS_URL` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NATS_URL") {
            self.nats_url = val;
        }
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            transport: Transport::default(),
        }
    }
}

/// Scenario data location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScenarioConfig {
    /// Root folder containing `Scenarios/<name>/<NodeType>/`.
    #[serde(default = "default_data_folder")]
    pub data_folder: PathBuf,

    /// Scenario started automatically once the coordinator is up.
    #[serde(default)]
    pub autostart: Option<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            data_folder: default_data_folder(),
            autostart: None,
        }
    }
}

/// Cell coverage settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CoverageConfig {
    /// Tower reach in longitude cells of the coverage grid.
    #[serde(default = "default_radius_cells")]
    pub radius_cells: f64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            radius_cells: default_radius_cells(),
        }
    }
}

/// Logging output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_namespace() -> String {
    "Sim".to_owned()
}

const fn default_sim_step_ms() -> u64 {
    1000
}

const fn default_sim_speed() -> f64 {
    1.0
}

const fn default_heartbeat_ms() -> u64 {
    5000
}

const fn default_publish_throttle_ms() -> u64 {
    500
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_data_folder() -> PathBuf {
    PathBuf::from("SimulationData")
}

const fn default_radius_cells() -> f64 {
    25.0
}
