//! Error types for the crisis engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup, the transport
//! bridge and shutdown, so `main` can propagate with `?`.

/// Top-level error for the crisis engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crisis_core::config::ConfigError,
    },

    /// Simulation clock initialization failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: crisis_core::clock::ClockError,
    },

    /// A coordinator or node actor failed.
    #[error("runtime error: {source}")]
    Core {
        /// The underlying core error.
        #[from]
        source: crisis_core::CoreError,
    },

    /// NATS connection or messaging failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// Installing the Ctrl-C handler failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
