//! Optional actor-state snapshots.
//!
//! The runtime itself persists nothing. Actors that implement the
//! `snapshot`/`restore` hooks get their state captured when passivated and
//! handed back at the next spawn under the same address, through whatever
//! [`SnapshotStore`] the system was configured with.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

// Layer 3: Internal module imports
use crate::address::Address;
use crate::message::Payload;

/// Snapshot backend failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot backend failure: {0}")]
    Backend(String),
}

/// Storage for actor snapshots, keyed by actor address.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    async fn save(&self, address: &Address, snapshot: Payload) -> Result<(), SnapshotError>;
    async fn load(&self, address: &Address) -> Result<Option<Payload>, SnapshotError>;
    async fn delete(&self, address: &Address) -> Result<(), SnapshotError>;
}

/// In-process snapshot store. Useful for passivation within a node's
/// lifetime and for tests; contents do not survive the process.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    entries: DashMap<Address, Payload>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, address: &Address, snapshot: Payload) -> Result<(), SnapshotError> {
        self.entries.insert(address.clone(), snapshot);
        Ok(())
    }

    async fn load(&self, address: &Address) -> Result<Option<Payload>, SnapshotError> {
        Ok(self.entries.get(address).map(|e| e.value().clone()))
    }

    async fn delete(&self, address: &Address) -> Result<(), SnapshotError> {
        self.entries.remove(address);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::{Message, Payload};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CounterState {
        count: u64,
    }

    impl Message for CounterState {
        const TYPE_URL: &'static str = "test/CounterState";
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = InMemorySnapshotStore::new();
        let addr = Address::local("sys", "counter");
        let snap = Payload::encode(&CounterState { count: 9 }).unwrap();

        store.save(&addr, snap).await.unwrap();
        let loaded = store.load(&addr).await.unwrap().unwrap();
        assert_eq!(loaded.decode::<CounterState>().unwrap().count, 9);

        store.delete(&addr).await.unwrap();
        assert!(store.load(&addr).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = InMemorySnapshotStore::new();
        let addr = Address::local("sys", "nobody");
        assert!(store.load(&addr).await.unwrap().is_none());
    }
}
