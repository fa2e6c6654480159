//! The ask coordinator: pending request/reply correlation.
//!
//! Process-wide map from correlation id (the request envelope's id) to a
//! reply promise. The lock is sharded by id so concurrent asks on different
//! actors never contend. Deadlines live in a min-heap swept by a single
//! timer task; an expired entry's promise is dropped, which the asking side
//! observes as `AskTimeout`, within one timer tick.

// Layer 1: Standard library imports
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Instant;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

// Layer 3: Internal module imports
use crate::message::Payload;

const SHARDS: usize = 16;

pub(crate) struct AskCoordinator {
    shards: Vec<Mutex<HashMap<u64, oneshot::Sender<Payload>>>>,
    deadlines: Mutex<BinaryHeap<Reverse<(Instant, u64)>>>,
    wake: Notify,
}

impl AskCoordinator {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            deadlines: Mutex::new(BinaryHeap::new()),
            wake: Notify::new(),
        })
    }

    fn shard(&self, id: u64) -> &Mutex<HashMap<u64, oneshot::Sender<Payload>>> {
        &self.shards[(id as usize) % SHARDS]
    }

    /// Register a pending ask and get the reply promise.
    pub(crate) fn register(&self, id: u64, deadline: Instant) -> oneshot::Receiver<Payload> {
        let (tx, rx) = oneshot::channel();
        self.shard(id).lock().insert(id, tx);
        self.deadlines.lock().push(Reverse((deadline, id)));
        self.wake.notify_one();
        rx
    }

    /// Resolve a pending ask. Returns false when the slot already expired
    /// or was resolved (late replies are dropped).
    pub(crate) fn complete(&self, id: u64, payload: Payload) -> bool {
        match self.shard(id).lock().remove(&id) {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    /// Discard a pending ask (caller gave up).
    pub(crate) fn cancel(&self, id: u64) {
        self.shard(id).lock().remove(&id);
    }

    /// Number of in-flight asks, for tests and diagnostics.
    pub(crate) fn pending(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Spawn the deadline sweeper. Dropping the promise resolves the asking
    /// side with a timeout; the heap entry is freed in the same pass.
    pub(crate) fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let next = {
                    let mut heap = coordinator.deadlines.lock();
                    // Drop entries that are due or already resolved.
                    loop {
                        match heap.peek() {
                            Some(Reverse((deadline, id))) if *deadline <= Instant::now() => {
                                let id = *id;
                                heap.pop();
                                coordinator.shard(id).lock().remove(&id);
                            }
                            Some(Reverse((deadline, _))) => break Some(*deadline),
                            None => break None,
                        }
                    }
                };

                match next {
                    Some(deadline) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(deadline.into()) => {}
                            _ = coordinator.wake.notified() => {}
                        }
                    }
                    None => coordinator.wake.notified().await,
                }
            }
        })
    }
}
