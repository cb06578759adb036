//! Error types for the `crisis-cascade` crate.

use crisis_geo::GeoError;

/// Errors raised by cascade model operations.
#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    /// No entity carries the given name.
    #[error("no entity named '{name}'")]
    UnknownEntity {
        /// The requested name.
        name: String,
    },

    /// A flood keyframe file name is not `<minutes>.asc`.
    #[error("invalid keyframe name '{name}'")]
    InvalidKeyframe {
        /// The offending file name.
        name: String,
    },

    /// A grid could not be read.
    #[error("grid error: {source}")]
    Grid {
        /// Underlying grid error.
        #[from]
        source: GeoError,
    },
}
