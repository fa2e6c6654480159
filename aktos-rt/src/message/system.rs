//! Reserved control messages.
//!
//! Control messages travel through the same mailboxes as user traffic, tagged
//! with type URLs under the reserved `aktos.sys/` prefix. `PostStart` and
//! `Terminated` are delivered to user `receive` implementations; `PoisonPill`
//! and `Escalated` are intercepted by the dispatcher.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::payload::Message;
use crate::address::Address;

/// First message every actor observes, after `pre_start` has succeeded and
/// before any user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStart;

impl Message for PostStart {
    const TYPE_URL: &'static str = "aktos.sys/PostStart";
}

/// Terminal sentinel. When dequeued the cell begins its stop sequence;
/// everything still queued behind it becomes a dead letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoisonPill;

impl Message for PoisonPill {
    const TYPE_URL: &'static str = "aktos.sys/PoisonPill";
}

/// Why a cell stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Explicit shutdown or system stop.
    Shutdown,
    /// Evicted by a passivation strategy.
    Passivated,
    /// Stopped by a supervision directive after a failure.
    Failed,
}

/// Death notification, delivered to every watcher of a stopped cell and to
/// its parent. Delivery is idempotent; watch cycles terminate because a
/// stopped cell is removed from the registry exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminated {
    pub address: Address,
    pub reason: StopReason,
}

impl Message for Terminated {
    const TYPE_URL: &'static str = "aktos.sys/Terminated";
}

/// A child re-raised its failure to its parent. Dispatcher-intercepted: the
/// parent treats the cause as its own failure and consults its supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalated {
    pub child: Address,
    pub cause: String,
}

impl Message for Escalated {
    const TYPE_URL: &'static str = "aktos.sys/Escalated";
}
