//! Subprocess execution for maestro.
//!
//! Everything maestro does to the outside world goes through a
//! [`CommandRunner`]: `verdi` verbs, `ssh` probes, `uenv` image pulls,
//! git refreshes. The runner never raises; callers inspect the returned
//! [`Outcome`] and decide what a failure means for their stage.
//!
//! Remote commands (argv spawned through `ssh`, `scp`, or `ssh-keyscan`)
//! are retried on the transient "Connection closed by remote host"
//! signature; everything else runs exactly once.
//!
//! [`fake::ScriptedRunner`] is the test double the rest of the workspace
//! drives its tests with.

pub mod fake;
pub mod runner;

pub use fake::ScriptedRunner;
pub use runner::{CommandRunner, CommandSpec, Outcome, RetryPolicy, ShellRunner, TRANSIENT_SIGNATURE};
