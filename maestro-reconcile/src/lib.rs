//! # maestro-reconcile
//!
//! Declared profile × live registry → ordered, idempotent updates.
//!
//! [`RunContext::check`] builds an [`UpdatePlan`] without touching
//! anything; [`RunContext::apply`] plays one through `verdi`, the client
//! SSH config, the remote uenv repositories, and the post-apply command
//! groups.

pub mod apply;
pub mod compare;
pub mod custom;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod source;
pub mod ssh;
pub mod uenv;

pub use apply::{apply_plan, ApplySummary};
pub use compare::{CompareOptions, Comparison};
pub use custom::{run_custom_commands, CommandReport};
pub use error::ReconcileError;
pub use pipeline::{ApplyReport, CheckReport, RunContext, GRANT_KEY};
pub use plan::{
    build_plan, ExportSource, InstanceState, LiveExports, PlanReport, Rename, SshDirective,
    UpdateDirective, UpdatePlan,
};
pub use source::GitSource;
pub use ssh::{check_ssh_config, write_ssh_config};
pub use uenv::{ensure_images, required_images};
