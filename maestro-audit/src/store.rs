//! Provenance-graph access for the auditor.
//!
//! [`NodeStore`] is the seam between the audit logic and wherever the graph
//! actually lives. [`MemoryStore`] is the one implementation: production
//! code fills it from a JSON snapshot (see [`crate::snapshot`]); tests build
//! it record by record.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use maestro_core::Pk;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Records and links
// ---------------------------------------------------------------------------

/// Lifecycle state of a process record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Created,
    Waiting,
    Running,
    Finished,
    Excepted,
    Killed,
}

impl ProcessState {
    /// Terminal records are settled and never audited.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Excepted | Self::Killed)
    }
}

/// Kind of a process node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    WorkChain,
    CalcJob,
    CalcFunction,
}

/// One process node of the provenance graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pk: Pk,
    pub kind: ProcessKind,
    /// Creation time, the staleness clock.
    pub ctime: DateTime<Utc>,
    pub state: ProcessState,
    #[serde(default)]
    pub paused: bool,
}

/// Direction-bearing edge kind of the provenance graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Process calls a sub-process.
    Call,
    /// Process produces a data artifact.
    Create,
    /// Data artifact is a direct input of a process.
    Input,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Read access to a provenance graph.
///
/// The audit logic only ever asks four questions, so a live-database store
/// can implement this without materializing the whole graph.
pub trait NodeStore {
    /// Every process record, ascending by pk.
    fn processes(&self) -> Vec<ProcessRecord>;

    /// The process that called `pk`, if any.
    fn caller_of(&self, pk: Pk) -> Option<Pk>;

    /// All data artifacts reachable from `pk` by following links forward.
    fn data_descendants(&self, pk: Pk) -> Vec<Pk>;

    /// All processes taking any of `artifacts` as a direct input.
    fn consumers_of(&self, artifacts: &[Pk]) -> Vec<Pk>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Provenance graph held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<Pk, ProcessRecord>,
    data: BTreeSet<Pk>,
    /// Forward adjacency over every link kind.
    children: BTreeMap<Pk, BTreeSet<Pk>>,
    /// Callee to caller, from `Call` links.
    callers: BTreeMap<Pk, Pk>,
    /// Artifact to direct consumers, from `Input` links.
    consumers: BTreeMap<Pk, BTreeSet<Pk>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_process(&mut self, record: ProcessRecord) {
        self.records.insert(record.pk, record);
    }

    pub fn insert_data(&mut self, pk: impl Into<Pk>) {
        self.data.insert(pk.into());
    }

    /// Add a directed link. The kind decides which indexes it feeds.
    pub fn link(&mut self, source: impl Into<Pk>, target: impl Into<Pk>, kind: LinkKind) {
        let (source, target) = (source.into(), target.into());
        self.children.entry(source).or_default().insert(target);
        match kind {
            LinkKind::Call => {
                self.callers.insert(target, source);
            }
            LinkKind::Input => {
                self.consumers.entry(source).or_default().insert(target);
            }
            LinkKind::Create => {}
        }
    }
}

impl NodeStore for MemoryStore {
    fn processes(&self) -> Vec<ProcessRecord> {
        self.records.values().cloned().collect()
    }

    fn caller_of(&self, pk: Pk) -> Option<Pk> {
        self.callers.get(&pk).copied()
    }

    fn data_descendants(&self, pk: Pk) -> Vec<Pk> {
        let mut seen = BTreeSet::new();
        let mut found = BTreeSet::new();
        let mut stack = vec![pk];
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            if let Some(targets) = self.children.get(&node) {
                for &target in targets {
                    if self.data.contains(&target) {
                        found.insert(target);
                    }
                    stack.push(target);
                }
            }
        }
        found.into_iter().collect()
    }

    fn consumers_of(&self, artifacts: &[Pk]) -> Vec<Pk> {
        let mut out = BTreeSet::new();
        for artifact in artifacts {
            if let Some(targets) = self.consumers.get(artifact) {
                // Input links only ever point at processes, but a hand-built
                // graph may disagree; unknown pks are dropped.
                out.extend(targets.iter().filter(|t| self.records.contains_key(*t)));
            }
        }
        out.into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
