//! Staleness scan and deletion-safety grading.
//!
//! Long-lived registries accumulate process records that never reach a
//! terminal state: crashed daemons, abandoned experiments, paused jobs
//! nobody resumed. [`scan`] selects them by age and state, and in the
//! default mode grades each candidate with [`safe_to_delete`] so an
//! operator knows which records can go without orphaning artifacts some
//! other workflow still depends on.

use chrono::{DateTime, Duration, Utc};
use maestro_core::Pk;
use serde::{Deserialize, Serialize};

use crate::store::{NodeStore, ProcessKind, ProcessState};

/// Upper bound on caller-link hops per trace.
pub const MAX_CALLER_HOPS: usize = 5000;

/// Cutoff applied when the caller does not pick one.
pub const DEFAULT_CUTOFF_DAYS: u32 = 30;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One record selected by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub pk: Pk,
    pub ctime: DateTime<Utc>,
    pub state: ProcessState,
    pub paused: bool,
    /// `None` when the scan mode does not grade safety (paused mode).
    pub safe_to_delete: Option<bool>,
}

/// Outcome of one staleness scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleWorkChainReport {
    pub cutoff_days: u32,
    pub reverse: bool,
    pub paused_only: bool,
    pub findings: Vec<Finding>,
}

impl StaleWorkChainReport {
    /// True when the scan selected nothing.
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Pks of every finding, in store order.
    pub fn pks(&self) -> Vec<Pk> {
        self.findings.iter().map(|f| f.pk).collect()
    }

    /// Records that can be deleted without orphaning anything.
    pub fn deletable(&self) -> Vec<Pk> {
        self.findings
            .iter()
            .filter(|f| f.safe_to_delete == Some(true))
            .map(|f| f.pk)
            .collect()
    }

    /// Records some other workflow still depends on.
    pub fn blocked(&self) -> Vec<Pk> {
        self.findings
            .iter()
            .filter(|f| f.safe_to_delete == Some(false))
            .map(|f| f.pk)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// Select stale process records.
///
/// Default mode picks work chains created more than `cutoff_days` ago that
/// are not in a terminal state, and grades each for deletion safety.
/// `reverse` flips the age comparison to recently created records.
/// `paused_only` instead selects paused work chains and calc jobs from the
/// recent window and skips the grading; those pks feed
/// `verdi process play`.
pub fn scan(
    store: &dyn NodeStore,
    cutoff_days: u32,
    reverse: bool,
    paused_only: bool,
) -> StaleWorkChainReport {
    let cutoff = Utc::now() - Duration::days(i64::from(cutoff_days));
    let mut findings = Vec::new();
    for record in store.processes() {
        if record.state.is_terminal() {
            continue;
        }
        if paused_only {
            if record.kind == ProcessKind::CalcFunction || !record.paused {
                continue;
            }
            if record.ctime <= cutoff {
                continue;
            }
            findings.push(Finding {
                pk: record.pk,
                ctime: record.ctime,
                state: record.state,
                paused: record.paused,
                safe_to_delete: None,
            });
        } else {
            if record.kind != ProcessKind::WorkChain {
                continue;
            }
            let selected = if reverse {
                record.ctime > cutoff
            } else {
                record.ctime < cutoff
            };
            if !selected {
                continue;
            }
            findings.push(Finding {
                pk: record.pk,
                ctime: record.ctime,
                state: record.state,
                paused: record.paused,
                safe_to_delete: Some(safe_to_delete(store, record.pk)),
            });
        }
    }
    tracing::info!(
        findings = findings.len(),
        cutoff_days,
        reverse,
        paused_only,
        "staleness scan done"
    );
    StaleWorkChainReport {
        cutoff_days,
        reverse,
        paused_only,
        findings,
    }
}

// ---------------------------------------------------------------------------
// Safety
// ---------------------------------------------------------------------------

/// Whether `pk` can be deleted without orphaning anything.
///
/// Collects the record's data-artifact descendants and every process that
/// consumes one of them as input. Safe only if each consumer traces back,
/// caller by caller, to the candidate itself.
pub fn safe_to_delete(store: &dyn NodeStore, pk: Pk) -> bool {
    let artifacts = store.data_descendants(pk);
    let consumers = store.consumers_of(&artifacts);
    consumers
        .into_iter()
        .all(|consumer| first_caller(store, consumer) == pk)
}

/// Root of `pk`'s caller chain; `pk` itself when nothing called it.
///
/// The walk gives up after [`MAX_CALLER_HOPS`] links and reports wherever
/// it stopped.
pub fn first_caller(store: &dyn NodeStore, pk: Pk) -> Pk {
    let mut current = pk;
    for _ in 0..MAX_CALLER_HOPS {
        match store.caller_of(current) {
            Some(caller) => current = caller,
            None => break,
        }
    }
    current
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LinkKind, MemoryStore, ProcessRecord, ProcessState};

    fn record(pk: u64, kind: ProcessKind, age_days: i64, state: ProcessState) -> ProcessRecord {
        ProcessRecord {
            pk: Pk(pk),
            kind,
            ctime: Utc::now() - Duration::days(age_days),
            state,
            paused: false,
        }
    }

    /// Work chain 1 called calc job 2, which produced artifact 10; 2 also
    /// fed 10 back into calc job 3 inside the same chain.
    fn self_contained() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert_process(record(1, ProcessKind::WorkChain, 60, ProcessState::Waiting));
        store.insert_process(record(2, ProcessKind::CalcJob, 60, ProcessState::Finished));
        store.insert_process(record(3, ProcessKind::CalcJob, 60, ProcessState::Finished));
        store.insert_data(10);
        store.link(1, 2, LinkKind::Call);
        store.link(2, 10, LinkKind::Create);
        store.link(10, 3, LinkKind::Input);
        store.link(1, 3, LinkKind::Call);
        store
    }

    #[test]
    fn chain_consuming_only_its_own_artifacts_is_safe() {
        let store = self_contained();
        assert!(safe_to_delete(&store, Pk(1)));
    }

    #[test]
    fn external_consumer_blocks_deletion() {
        let mut store = self_contained();
        // Work chain 5 picked up artifact 10 through its own calc job 6.
        store.insert_process(record(5, ProcessKind::WorkChain, 5, ProcessState::Running));
        store.insert_process(record(6, ProcessKind::CalcJob, 5, ProcessState::Running));
        store.link(5, 6, LinkKind::Call);
        store.link(10, 6, LinkKind::Input);
        assert!(!safe_to_delete(&store, Pk(1)));
        // The borrower itself produced nothing, so it stays deletable.
        assert!(safe_to_delete(&store, Pk(5)));
    }

    #[test]
    fn record_without_descendants_is_safe() {
        let mut store = MemoryStore::new();
        store.insert_process(record(1, ProcessKind::WorkChain, 60, ProcessState::Waiting));
        assert!(safe_to_delete(&store, Pk(1)));
    }

    #[test]
    fn first_caller_walks_to_the_root() {
        let mut store = MemoryStore::new();
        for pk in [1, 2, 3] {
            store.insert_process(record(pk, ProcessKind::WorkChain, 1, ProcessState::Running));
        }
        store.link(1, 2, LinkKind::Call);
        store.link(2, 3, LinkKind::Call);
        assert_eq!(first_caller(&store, Pk(3)), Pk(1));
        assert_eq!(first_caller(&store, Pk(1)), Pk(1));
    }

    #[test]
    fn first_caller_survives_a_call_cycle() {
        let mut store = MemoryStore::new();
        store.insert_process(record(2, ProcessKind::WorkChain, 1, ProcessState::Running));
        store.insert_process(record(3, ProcessKind::WorkChain, 1, ProcessState::Running));
        store.link(2, 3, LinkKind::Call);
        store.link(3, 2, LinkKind::Call);
        let root = first_caller(&store, Pk(2));
        assert!(root == Pk(2) || root == Pk(3));
    }

    #[test]
    fn default_mode_needs_the_record_old_and_unsettled() {
        let mut store = MemoryStore::new();
        store.insert_process(record(1, ProcessKind::WorkChain, 60, ProcessState::Waiting));
        store.insert_process(record(2, ProcessKind::WorkChain, 5, ProcessState::Waiting));
        store.insert_process(record(3, ProcessKind::WorkChain, 60, ProcessState::Finished));
        store.insert_process(record(4, ProcessKind::CalcJob, 60, ProcessState::Waiting));
        let report = scan(&store, 30, false, false);
        assert_eq!(report.pks(), vec![Pk(1)]);
        assert_eq!(report.deletable(), vec![Pk(1)]);
        let finding = report.findings[0];
        assert_eq!(finding.state, ProcessState::Waiting);
        assert!(!finding.paused);
    }

    #[test]
    fn reverse_mode_selects_the_recent_window() {
        let mut store = MemoryStore::new();
        store.insert_process(record(1, ProcessKind::WorkChain, 60, ProcessState::Waiting));
        store.insert_process(record(2, ProcessKind::WorkChain, 5, ProcessState::Waiting));
        let report = scan(&store, 30, true, false);
        assert_eq!(report.pks(), vec![Pk(2)]);
    }

    #[test]
    fn paused_mode_takes_recent_paused_jobs_and_skips_grading() {
        let mut store = MemoryStore::new();
        let mut chain = record(1, ProcessKind::WorkChain, 5, ProcessState::Waiting);
        chain.paused = true;
        let mut job = record(2, ProcessKind::CalcJob, 5, ProcessState::Waiting);
        job.paused = true;
        let mut func = record(3, ProcessKind::CalcFunction, 5, ProcessState::Waiting);
        func.paused = true;
        let mut old = record(4, ProcessKind::WorkChain, 60, ProcessState::Waiting);
        old.paused = true;
        store.insert_process(chain);
        store.insert_process(job);
        store.insert_process(func);
        store.insert_process(old);
        store.insert_process(record(5, ProcessKind::WorkChain, 5, ProcessState::Waiting));
        let report = scan(&store, 30, false, true);
        assert_eq!(report.pks(), vec![Pk(1), Pk(2)]);
        assert!(report.findings.iter().all(|f| f.safe_to_delete.is_none()));
        assert!(report.deletable().is_empty());
    }

    #[test]
    fn clean_store_yields_a_clean_report() {
        let report = scan(&MemoryStore::new(), 30, false, false);
        assert!(report.is_clean());
        assert_eq!(report.cutoff_days, 30);
    }
}
