//! Blocking execution of external argv-vector commands.
//!
//! Every command returns an [`Outcome`] — failure is data, never a panic or
//! an error type, because callers decide per stage whether a failed command
//! aborts the pass. Remote commands are wrapped in an `ssh <host> …`
//! invocation and retried under the configured [`RetryPolicy`] when the
//! failure text looks transient.

use std::process::Command;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Command spec
// ---------------------------------------------------------------------------

/// An argv-vector command, optionally addressed to a remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub remote_host: Option<String>,
}

impl CommandSpec {
    /// A command executed on the local machine.
    pub fn local<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { argv: argv.into_iter().map(Into::into).collect(), remote_host: None }
    }

    /// A command executed on `host` through `ssh`.
    pub fn remote<I, S>(host: &str, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            remote_host: Some(host.to_owned()),
        }
    }

    /// The argv actually executed: remote specs get the `ssh <host>` prefix.
    pub fn resolved(&self) -> Vec<String> {
        match &self.remote_host {
            Some(host) => {
                let mut argv = Vec::with_capacity(self.argv.len() + 2);
                argv.push("ssh".to_owned());
                argv.push(host.clone());
                argv.extend(self.argv.iter().cloned());
                argv
            }
            None => self.argv.clone(),
        }
    }

    /// Space-joined resolved argv, for logs and failure messages.
    pub fn rendered(&self) -> String {
        self.resolved().join(" ")
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Captured result of one command: output text plus a success flag.
///
/// On success the output is the trimmed stdout; on failure it is the trimmed
/// stderr (falling back to stdout when stderr is empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub output: String,
    pub success: bool,
}

impl Outcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { output: output.into(), success: true }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self { output: output.into(), success: false }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Failure text of a dropped SSH connection; the only failure worth
/// retrying automatically.
pub const TRANSIENT_SIGNATURE: &str = "Connection closed by remote host";

/// When and how often a failed command is retried.
///
/// The matcher decides from the failure text; non-matching failures return
/// immediately. Only remote-shell commands (`ssh`, `scp`, `ssh-keyscan`)
/// are eligible at all — plain local commands always run once.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub matcher: fn(&str) -> bool,
    pub backoff: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Production policy: retry the transient connection-closed signature,
    /// 5 s apart, at most 5 attempts.
    pub fn transient() -> Self {
        Self {
            matcher: |text| text.contains(TRANSIENT_SIGNATURE),
            backoff: Duration::from_secs(5),
            max_attempts: 5,
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self { matcher: |_| false, backoff: Duration::ZERO, max_attempts: 1 }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transient()
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("backoff", &self.backoff)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Something that can execute a [`CommandSpec`].
///
/// The live implementation is [`ShellRunner`]; tests script outcomes with
/// [`crate::fake::ScriptedRunner`].
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Outcome;
}

/// Live subprocess runner.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    pub retry: RetryPolicy,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self { retry }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, spec: &CommandSpec) -> Outcome {
        let argv = spec.resolved();
        let Some(program) = argv.first() else {
            return Outcome::failed("empty command");
        };

        let attempts_allowed = if is_remote_shell(program) { self.retry.max_attempts.max(1) } else { 1 };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = execute(program, &argv[1..]);
            if outcome.success {
                tracing::debug!(command = %spec.rendered(), "command succeeded");
                return outcome;
            }
            if attempt < attempts_allowed && (self.retry.matcher)(&outcome.output) {
                tracing::warn!(
                    command = %spec.rendered(),
                    attempt,
                    max_attempts = attempts_allowed,
                    "transient failure, retrying"
                );
                std::thread::sleep(self.retry.backoff);
                continue;
            }
            tracing::warn!(command = %spec.rendered(), output = %outcome.output, "command failed");
            return outcome;
        }
    }
}

fn is_remote_shell(program: &str) -> bool {
    let base = std::path::Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program);
    matches!(base, "ssh" | "scp" | "ssh-keyscan")
}

fn execute(program: &str, args: &[String]) -> Outcome {
    match Command::new(program).args(args).output() {
        Ok(output) => {
            if output.status.success() {
                Outcome::ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
                if stderr.is_empty() {
                    Outcome::failed(String::from_utf8_lossy(&output.stdout).trim().to_owned())
                } else {
                    Outcome::failed(stderr)
                }
            }
        }
        Err(err) => Outcome::failed(format!("failed to spawn '{program}': {err}")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
