//! JSON snapshot of a provenance graph.
//!
//! Production graphs live inside AiiDA's database; a dump script exports the
//! slice the auditor needs (process records, data pks, links) as one JSON
//! document. [`load_snapshot`] reads such a file into a [`MemoryStore`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use maestro_core::Pk;

use crate::error::AuditError;
use crate::store::{LinkKind, MemoryStore, ProcessRecord};

/// One directed link of the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: Pk,
    pub target: Pk,
    pub kind: LinkKind,
}

/// Wire form of a provenance graph dump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,
    #[serde(default)]
    pub data: Vec<Pk>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl From<GraphSnapshot> for MemoryStore {
    fn from(snapshot: GraphSnapshot) -> Self {
        let mut store = MemoryStore::new();
        for record in snapshot.processes {
            store.insert_process(record);
        }
        for pk in snapshot.data {
            store.insert_data(pk);
        }
        for link in snapshot.links {
            store.link(link.source, link.target, link.kind);
        }
        store
    }
}

/// Read a snapshot file into a queryable store.
pub fn load_snapshot(path: &Path) -> Result<MemoryStore, AuditError> {
    let raw = fs::read_to_string(path)?;
    let snapshot: GraphSnapshot = serde_json::from_str(&raw).map_err(|e| AuditError::Snapshot {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::debug!(
        path = %path.display(),
        processes = snapshot.processes.len(),
        links = snapshot.links.len(),
        "loaded provenance snapshot"
    );
    Ok(MemoryStore::from(snapshot))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NodeStore, ProcessKind, ProcessState};

    const SNAPSHOT: &str = r#"{
      "processes": [
        {"pk": 101, "kind": "work_chain", "ctime": "2026-05-01T09:30:00Z", "state": "waiting"},
        {"pk": 102, "kind": "calc_job", "ctime": "2026-05-01T09:31:00Z", "state": "finished", "paused": true}
      ],
      "data": [4001],
      "links": [
        {"source": 101, "target": 102, "kind": "call"},
        {"source": 102, "target": 4001, "kind": "create"}
      ]
    }"#;

    #[test]
    fn snapshot_becomes_a_queryable_store() {
        let snapshot: GraphSnapshot = serde_json::from_str(SNAPSHOT).expect("parse");
        let store = MemoryStore::from(snapshot);
        assert_eq!(store.caller_of(Pk(102)), Some(Pk(101)));
        assert_eq!(store.data_descendants(Pk(101)), vec![Pk(4001)]);
        let records = store.processes();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, ProcessKind::WorkChain);
        assert_eq!(records[0].state, ProcessState::Waiting);
        assert!(!records[0].paused, "paused defaults to false");
        assert!(records[1].paused);
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph.json");
        fs::write(&path, SNAPSHOT).expect("write snapshot");
        let store = load_snapshot(&path).expect("load");
        assert_eq!(store.processes().len(), 2);
    }

    #[test]
    fn malformed_snapshot_names_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph.json");
        fs::write(&path, "{\"processes\": [{}]}").expect("write snapshot");
        let err = load_snapshot(&path).unwrap_err();
        assert!(err.to_string().contains("graph.json"), "got: {err}");
    }

    #[test]
    fn empty_document_is_an_empty_graph() {
        let snapshot: GraphSnapshot = serde_json::from_str("{}").expect("parse");
        let store = MemoryStore::from(snapshot);
        assert!(store.processes().is_empty());
    }
}
