//! Live registry listings.
//!
//! The planner's observed state comes from here: which computers and codes
//! the profile currently has registered, partitioned into active and
//! inactive sets. A failed listing fails the whole read; the planner never
//! works from a partial snapshot.

use std::collections::BTreeSet;

use maestro_core::types::{CodeEntry, CodeListing, ComputerListing, Label, Pk};
use maestro_exec::{CommandRunner, CommandSpec};

use crate::error::VerdiError;

/// Registered computers, split into active and inactive sets.
///
/// `verdi computer list -a` prints every computer, prefixing enabled ones
/// with `* `. Report lines are skipped.
pub fn list_computers(runner: &dyn CommandRunner) -> Result<ComputerListing, VerdiError> {
    let output = run_listing(runner, &["verdi", "computer", "list", "-a"])?;
    let mut listing = ComputerListing::default();
    for line in output.lines() {
        let line = line.trim();
        if let Some(label) = line.strip_prefix("* ") {
            listing.active.insert(Label::from(label));
        } else if !line.is_empty() && !line.starts_with("Report:") {
            listing.inactive.insert(Label::from(line));
        }
    }
    tracing::debug!(
        active = listing.active.len(),
        inactive = listing.inactive.len(),
        "computer listing"
    );
    Ok(listing)
}

/// Registered codes, split into active and hidden sets.
///
/// `verdi code list -a` prints every code and `verdi code list` only the
/// visible ones; the hidden set is their difference. Code rows are the
/// lines whose first column is a `label@computer` identity and whose
/// second column is a numeric pk; header and report chrome is skipped.
pub fn list_codes(runner: &dyn CommandRunner) -> Result<CodeListing, VerdiError> {
    let all = parse_code_rows(&run_listing(runner, &["verdi", "code", "list", "-a"])?);
    let active = parse_code_rows(&run_listing(runner, &["verdi", "code", "list"])?);
    let inactive: BTreeSet<CodeEntry> = all.difference(&active).cloned().collect();
    tracing::debug!(active = active.len(), inactive = inactive.len(), "code listing");
    Ok(CodeListing { active, inactive })
}

fn run_listing(runner: &dyn CommandRunner, argv: &[&str]) -> Result<String, VerdiError> {
    let spec = CommandSpec::local(argv.iter().copied());
    let outcome = runner.run(&spec);
    if outcome.success {
        Ok(outcome.output)
    } else {
        Err(VerdiError::Command { command: spec.rendered(), output: outcome.output })
    }
}

fn parse_code_rows(output: &str) -> BTreeSet<CodeEntry> {
    output
        .lines()
        .filter(|line| line.contains('@'))
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let label = columns.next()?;
            let pk = columns.next()?.parse::<u64>().ok()?;
            Some(CodeEntry { label: Label::from(label), pk: Pk(pk) })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
