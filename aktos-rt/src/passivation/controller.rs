//! The shared passivation controller.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

// Layer 3: Internal module imports
use super::strategy::{DEFAULT_RESOLUTION, MIN_RESOLUTION};
use crate::actor::cell::{ActorState, CellHandle};
use crate::address::Address;

/// One timer task serving every passivating cell in the system.
///
/// Registration is keyed by address; the tick resolution follows the finest
/// hint among registered strategies, never below [`MIN_RESOLUTION`].
pub(crate) struct PassivationController {
    cells: DashMap<Address, Arc<CellHandle>>,
    resolution: Mutex<Duration>,
    wake: Notify,
}

impl PassivationController {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            cells: DashMap::new(),
            resolution: Mutex::new(DEFAULT_RESOLUTION),
            wake: Notify::new(),
        })
    }

    /// Track a cell. Cells with a disabled strategy are ignored.
    pub(crate) fn register(&self, handle: Arc<CellHandle>) {
        if handle.passivation().is_disabled() {
            return;
        }
        self.cells.insert(handle.address().clone(), handle);
        self.recompute_resolution();
        self.wake.notify_one();
    }

    pub(crate) fn deregister(&self, address: &Address) {
        if self.cells.remove(address).is_some() {
            self.recompute_resolution();
        }
    }

    fn recompute_resolution(&self) {
        let finest = self
            .cells
            .iter()
            .filter_map(|entry| entry.value().passivation().resolution())
            .min()
            .unwrap_or(DEFAULT_RESOLUTION);
        *self.resolution.lock() = finest.max(MIN_RESOLUTION);
    }

    pub(crate) fn tracked(&self) -> usize {
        self.cells.len()
    }

    /// Spawn the tick loop. Due cells receive one tagged `PoisonPill`; the
    /// mark is cleared by the cell if the pill turns out stale.
    pub(crate) fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let tick = *controller.resolution.lock();
                tokio::select! {
                    _ = tokio::time::sleep(tick) => {}
                    _ = controller.wake.notified() => continue,
                }

                let now = Instant::now();
                let candidates: Vec<Arc<CellHandle>> = controller
                    .cells
                    .iter()
                    .map(|entry| Arc::clone(entry.value()))
                    .collect();

                for handle in candidates {
                    if handle.state() != ActorState::Running {
                        continue;
                    }
                    let view = handle.passivation_view();
                    if !handle.passivation().due(&view, now) {
                        continue;
                    }
                    if !handle.mark_pill_pending() {
                        continue; // pill already in flight
                    }
                    debug!(actor = %handle.address(), "passivation candidate");
                    if handle.enqueue_poison_pill(true).is_err() {
                        // Cell is already going away; stop tracking it.
                        controller.deregister(handle.address());
                    }
                }
            }
        })
    }
}
