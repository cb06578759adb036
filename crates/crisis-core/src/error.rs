//! Error types for the crisis core crate.

use std::path::PathBuf;

use crisis_cascade::CascadeError;
use crisis_geo::GeoError;

use crate::clock::ClockError;
use crate::config::ConfigError;
use crate::fsm::FsmError;

/// Errors raised by runtimes, the coordinator, and scenario loading.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Configuration error.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Clock error.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// Rejected lifecycle command.
    #[error("lifecycle error: {source}")]
    Fsm {
        /// The underlying FSM error.
        #[from]
        source: FsmError,
    },

    /// Cascade model error.
    #[error("cascade error: {source}")]
    Cascade {
        /// The underlying cascade error.
        #[from]
        source: CascadeError,
    },

    /// Grid parsing error.
    #[error("grid error: {source}")]
    Geo {
        /// The underlying geo error.
        #[from]
        source: GeoError,
    },

    /// Payload did not match the topic's schema.
    #[error("payload error on {subject}: {source}")]
    Payload {
        /// Subject the payload arrived on.
        subject: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Reading scenario data failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File or folder being read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A scenario folder lacks a required file.
    #[error("missing scenario data: {}", path.display())]
    MissingData {
        /// Expected path.
        path: PathBuf,
    },

    /// A message channel closed while a component was still running.
    #[error("channel closed: {name}")]
    ChannelClosed {
        /// Which channel.
        name: &'static str,
    },
}
