//! Mesh Resilience Harness
//!
//! External driver that validates network-wide routing behavior:
//! generates random mesh topologies, injects node/link failures and
//! store outages through the engine's fault hooks, fires bulk route
//! requests, and reports outcome statistics.
//!
//! The harness lives outside the engine; it only uses the public
//! fault-injection surface (`NetworkHandle::force_*`, adapter fault
//! switches), so the same hooks work against a deployed gateway.

pub mod generators;
pub mod reports;
pub mod runner;

pub mod prelude {
    pub use crate::generators::{mesh_network, station_pair};
    pub use crate::reports::{ReportSummary, ResilienceReport};
    pub use crate::runner::{HarnessConfig, ResilienceRunner, TrialResult};
}
