//! Core runtime for the crisis cascade simulation.
//!
//! Nodes and the coordinator are synchronous state machines that turn one
//! inbound event into a list of outbound messages. The async layer in
//! [`runtime`] owns the timers and the router and performs the I/O.
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration with defaults and validation
//! - [`clock`] -- Paced simulation clock
//! - [`fsm`] -- Lifecycle state machine with enter/exit hooks
//! - [`throttle`] -- Leading/trailing publish throttle
//! - [`bus`] -- Subject and JSON codec for typed messages
//! - [`router`] -- In-process lossless fan-out router
//! - [`domain`] -- Domain behaviours plugged into node runtimes
//! - [`node`] -- Node runtime: lifecycle, clock mirror, status reports
//! - [`coordinator`] -- Time-barrier coordinator
//! - [`scenario`] -- Scenario catalog
//! - [`loader`] -- Scenario file loading
//! - [`runtime`] -- Actor loops for nodes and the coordinator
//! - [`error`] -- Error types

pub mod bus;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod fsm;
pub mod loader;
pub mod node;
pub mod router;
pub mod runtime;
pub mod scenario;
pub mod throttle;

pub use clock::SimClock;
pub use config::SimulationConfig;
pub use coordinator::TimeCoordinator;
pub use domain::{Domain, ScenarioData, build_domain};
pub use error::CoreError;
pub use node::NodeRuntime;
pub use router::Router;
pub use runtime::{ActorHandle, Timing, spawn_coordinator, spawn_node};
pub use scenario::ScenarioCatalog;
