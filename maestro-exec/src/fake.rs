//! Scripted [`CommandRunner`] for tests.
//!
//! Dependent crates drive the registry reader, planner, and executor
//! against canned `verdi`/`ssh` output without touching a live profile.
//! Rules match on a substring of the space-joined resolved argv; the first
//! matching rule wins, unmatched commands get the default outcome.

use std::sync::Mutex;

use crate::runner::{CommandRunner, CommandSpec, Outcome};

struct Rule {
    needle: String,
    outcome: Outcome,
}

/// Records every invocation and answers from a rule table.
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
    default: Outcome,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRunner {
    /// A runner that answers every command with empty success output.
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            default: Outcome::ok(""),
        }
    }

    /// A runner whose unmatched commands fail with `output`.
    pub fn failing(output: &str) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            default: Outcome::failed(output),
        }
    }

    /// Succeed with `output` for commands whose rendered argv contains `needle`.
    pub fn respond(self, needle: &str, output: &str) -> Self {
        self.push(needle, Outcome::ok(output));
        self
    }

    /// Fail with `output` for commands whose rendered argv contains `needle`.
    pub fn fail(self, needle: &str, output: &str) -> Self {
        self.push(needle, Outcome::failed(output));
        self
    }

    fn push(&self, needle: &str, outcome: Outcome) {
        self.rules
            .lock()
            .expect("rules lock")
            .push(Rule { needle: needle.to_owned(), outcome });
    }

    /// Every spec run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Rendered argv of every spec run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::rendered).collect()
    }

    /// Index of the first recorded command containing `needle`.
    pub fn position_of(&self, needle: &str) -> Option<usize> {
        self.commands().iter().position(|cmd| cmd.contains(needle))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Outcome {
        self.calls.lock().expect("calls lock").push(spec.clone());
        let rendered = spec.rendered();
        let rules = self.rules.lock().expect("rules lock");
        for rule in rules.iter() {
            if rendered.contains(&rule.needle) {
                return rule.outcome.clone();
            }
        }
        self.default.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
