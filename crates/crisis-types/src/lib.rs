//! Shared type definitions for the crisis cascade simulation.
//!
//! This crate is the single source of truth for every payload exchanged
//! between simulation nodes and the time coordinator, and for the enums
//! that describe node lifecycle and infrastructure state.
//!
//! # Modules
//!
//! - [`ids`] -- Node and entity identifiers
//! - [`enums`] -- Lifecycle states, commands, infrastructure state, failure modes, domains
//! - [`feature`] -- GeoJSON-style geometry, features, layers and feature updates
//! - [`messages`] -- Status, time, job and command payloads
//! - [`topics`] -- Topic naming and subject parsing

pub mod enums;
pub mod feature;
pub mod ids;
pub mod messages;
pub mod topics;

// Re-export all public types at crate root for convenience.
pub use enums::{DomainKind, FailureMode, InfrastructureState, SimCommand, SimState};
pub use feature::{
    Feature, FeatureBatch, FeatureCollection, FeatureUpdate, Geometry, Layer, Position,
};
pub use ids::{EntityId, NodeId};
pub use messages::{
    BedChart, ChartPoint, ChartSeries, JobPayload, JobRequest, LoadCommand, LooseNumber,
    Message, NextEventRequest, PowerStationCommand, SimStateReport, SimTimeControl,
    SimTimeMessage,
};
pub use topics::{Topic, Topics, layer_ids};
