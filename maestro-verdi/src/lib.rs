//! Thin client for the AiiDA `verdi` CLI.
//!
//! Three surfaces, all driven through an injected
//! [`CommandRunner`](maestro_exec::CommandRunner):
//!
//! - [`registry`] — listings feeding the planner's observed state
//! - [`export`] — attribute dumps feeding the comparator
//! - [`verbs`] — the mutating calls the executor applies plans with
//!
//! No state is kept here; every function is a single round trip.

pub mod error;
pub mod export;
pub mod registry;
pub mod verbs;

pub use error::VerdiError;
pub use export::{export_code, export_computer, ComputerExport};
pub use registry::{list_codes, list_computers};
