//! The local slice of the replicated name directory.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

// Layer 2: Third-party crate imports
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

// Layer 3: Internal module imports
use super::discovery::Endpoint;
use crate::message::Message;

/// One directory record: where a named actor lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub node: Endpoint,
    pub kind: String,
    pub metadata: HashMap<String, String>,
    /// Monotonic version; quorum reads return the highest one observed.
    pub version: u64,
}

impl Message for DirectoryEntry {
    const TYPE_URL: &'static str = "aktos.cluster/DirectoryEntry";
}

/// Versioned local store. Applies are last-writer-wins on version, which
/// keeps replica convergence independent of arrival order.
pub(crate) struct Directory {
    entries: DashMap<String, DirectoryEntry>,
    table_size: usize,
    version_seq: AtomicU64,
}

impl Directory {
    pub(crate) fn new(table_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            table_size,
            version_seq: AtomicU64::new(0),
        }
    }

    /// Next version for a locally-originated write: wall-clock millis,
    /// bumped past anything already observed.
    pub(crate) fn next_version(&self) -> u64 {
        let wall = Utc::now().timestamp_millis().max(0) as u64;
        self.version_seq
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                Some(prev.max(wall) + 1)
            })
            .map(|prev| prev.max(wall) + 1)
            .unwrap_or(wall + 1)
    }

    /// Apply an entry if it is newer than what we hold. Returns the newer
    /// version on conflict.
    pub(crate) fn apply(&self, entry: DirectoryEntry) -> Result<(), u64> {
        if self.entries.len() >= self.table_size && !self.entries.contains_key(&entry.name) {
            warn!(
                table_size = self.table_size,
                "directory at capacity, accepting entry anyway"
            );
        }
        match self.entries.entry(entry.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut existing) => {
                if existing.get().version >= entry.version {
                    return Err(existing.get().version);
                }
                existing.insert(entry);
                Ok(())
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    pub(crate) fn remove(&self, name: &str) -> Option<DirectoryEntry> {
        self.entries.remove(name).map(|(_, entry)| entry)
    }

    /// Lock-free snapshot read.
    pub(crate) fn get(&self, name: &str) -> Option<DirectoryEntry> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    /// Entries owned by this node, for anti-entropy pushes.
    pub(crate) fn entries_for_node(&self, node: &Endpoint) -> Vec<DirectoryEntry> {
        self.entries
            .iter()
            .filter(|e| &e.value().node == node)
            .map(|e| e.value().clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
