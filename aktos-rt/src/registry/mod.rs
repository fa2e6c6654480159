//! The local address registry.
//!
//! Maps actor names and lineage paths to live cells. Names are unique per
//! system; registration is atomic (the entry is visible before `pre_start`
//! is scheduled) and removal happens exactly once, before any `Terminated`
//! notification fires. The watch relation is an explicit many-to-many table
//! so cycles are harmless: termination delivery is idempotent.

// Layer 1: Standard library imports
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::Mutex;

// Layer 3: Internal module imports
use crate::actor::cell::CellHandle;
use crate::address::Address;

pub(crate) struct Registry {
    by_name: DashMap<String, Arc<CellHandle>>,
    by_path: DashMap<String, Arc<CellHandle>>,
    // watched -> watchers
    watches: Mutex<HashMap<Address, HashSet<Address>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_path: DashMap::new(),
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a cell under its name and path. Fails when the name is taken;
    /// the occupied check and the insert are one atomic entry operation.
    pub(crate) fn register(&self, handle: Arc<CellHandle>) -> Result<(), Arc<CellHandle>> {
        let name = handle.address().name().to_owned();
        match self.by_name.entry(name) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(handle),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&handle));
                self.by_path
                    .insert(handle.address().path().to_owned(), handle);
                Ok(())
            }
        }
    }

    /// Remove a cell from both maps. Idempotent.
    pub(crate) fn remove(&self, address: &Address) -> Option<Arc<CellHandle>> {
        self.by_path.remove(address.path());
        self.by_name.remove(address.name()).map(|(_, h)| h)
    }

    /// Resolve by name. Cells past `Restarting` are unreachable.
    pub(crate) fn get_by_name(&self, name: &str) -> Option<Arc<CellHandle>> {
        self.by_name
            .get(name)
            .map(|e| Arc::clone(e.value()))
            .filter(|h| h.is_reachable())
    }

    /// Resolve by lineage path.
    pub(crate) fn get_by_path(&self, path: &str) -> Option<Arc<CellHandle>> {
        self.by_path
            .get(path)
            .map(|e| Arc::clone(e.value()))
            .filter(|h| h.is_reachable())
    }

    /// Resolve by name regardless of lifecycle state. The stop sequence
    /// needs the handle after it became unreachable.
    pub(crate) fn get_any_by_name(&self, name: &str) -> Option<Arc<CellHandle>> {
        self.by_name.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Resolve by path regardless of lifecycle state.
    pub(crate) fn get_any_by_path(&self, path: &str) -> Option<Arc<CellHandle>> {
        self.by_path.get(path).map(|e| Arc::clone(e.value()))
    }

    /// Register a watch edge. Self-watches are ignored.
    pub(crate) fn watch(&self, watcher: Address, watched: Address) {
        if watcher == watched {
            return;
        }
        self.watches
            .lock()
            .entry(watched)
            .or_default()
            .insert(watcher);
    }

    pub(crate) fn unwatch(&self, watcher: &Address, watched: &Address) {
        let mut watches = self.watches.lock();
        if let Some(set) = watches.get_mut(watched) {
            set.remove(watcher);
            if set.is_empty() {
                watches.remove(watched);
            }
        }
    }

    /// Claim and clear every watcher of a stopped cell. Also drops any
    /// outgoing edges the stopped cell had registered as a watcher.
    pub(crate) fn take_watchers(&self, watched: &Address) -> Vec<Address> {
        let mut watches = self.watches.lock();
        let watchers = watches
            .remove(watched)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for set in watches.values_mut() {
            set.remove(watched);
        }
        watchers
    }

    /// Cells without a parent, i.e. roots of the supervision forest.
    pub(crate) fn roots(&self) -> Vec<Arc<CellHandle>> {
        self.by_name
            .iter()
            .filter(|e| e.value().parent().is_none())
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_name.len()
    }
}
