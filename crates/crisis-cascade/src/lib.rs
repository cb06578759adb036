//! Infrastructure cascade engine for the crisis simulation.
//!
//! One [`CascadeModel`] holds the entities of one domain and turns hazard
//! inputs (flood grids, blackout areas, timed backup exhaustion) and
//! dependency failures into state transitions. Grid-valued domains have
//! their own small models.
//!
//! # Modules
//!
//! - [`entity`] -- Typed entity decoded from a feature's property map.
//! - [`model`] -- [`CascadeModel`] and per-domain rule profiles.
//! - [`coverage`] -- Incremental cell coverage grid.
//! - [`flood`] -- Flood keyframe schedule.
//! - [`beds`] -- Hospital bed chart.
//! - [`error`] -- Error types.

pub mod beds;
pub mod coverage;
pub mod entity;
pub mod error;
pub mod flood;
pub mod model;

pub use beds::{BedChartTracker, BedTotals};
pub use coverage::CoverageModel;
pub use entity::Entity;
pub use error::CascadeError;
pub use flood::FloodSchedule;
pub use model::{CascadeModel, CascadeOutcome, DomainProfile, GeometryKind};
