//! Stale work-chain auditing.
//!
//! A registry that runs for months collects process records stuck outside
//! the terminal states: the daemon died mid-run, an experiment was
//! abandoned, a job was paused and forgotten. This crate finds them and
//! says which ones are safe to remove.
//!
//! - [`store`] — the [`NodeStore`] seam over a provenance graph
//! - [`snapshot`] — JSON graph dumps read into a [`MemoryStore`]
//! - [`scan`](crate::scan::scan) — age/state selection plus the
//!   [`safe_to_delete`] grading
//!
//! Resuming paused records is a registry mutation and lives with the other
//! `verdi` verbs (`maestro_verdi::verbs::process_play`); this crate only
//! reports the pks to feed it.

pub mod error;
pub mod scan;
pub mod snapshot;
pub mod store;

pub use error::AuditError;
pub use scan::{
    first_caller, safe_to_delete, scan, Finding, StaleWorkChainReport, DEFAULT_CUTOFF_DAYS,
    MAX_CALLER_HOPS,
};
pub use snapshot::{load_snapshot, GraphSnapshot, Link};
pub use store::{
    LinkKind, MemoryStore, NodeStore, ProcessKind, ProcessRecord, ProcessState,
};
