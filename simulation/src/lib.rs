//! # Indras Unread Simulation
//!
//! Replays read-state scenarios against the engine with an in-process
//! server standing in for the real one.
//!
//! ## Architecture
//!
//! - **Scenario** (`scenario.rs`): JSON scenario format and step definitions
//! - **Server** (`server.rs`): scripted transport that echoes flag events
//! - **Surfaces** (`surfaces.rs`): logging UI surfaces and reloader
//! - **Replay** (`replay.rs`): drives the engine through a scenario
//! - **Scenarios** (`scenarios.rs`): built-in scenarios
//!
//! ## Example
//!
//! ```rust,ignore
//! use indras_unread_sim::*;
//!
//! let scenario = builtin("unread-from-here").unwrap();
//! let report = Replay::run(&scenario).await?;
//! assert_eq!(report.counts.total, 0);
//! ```

pub mod replay;
pub mod scenario;
pub mod scenarios;
pub mod server;
pub mod surfaces;

pub use replay::{Replay, ReplayReport};
pub use scenario::{
    Expectation, Scenario, ScenarioError, ScenarioResult, ServerConfig, Step, ViewSetup,
};
pub use scenarios::{BUILTINS, builtin};
pub use server::SimServer;
pub use surfaces::{SimReloader, SurfaceStats, TracingSurfaces};
