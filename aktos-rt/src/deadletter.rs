//! Dead-letter sink.
//!
//! Envelopes that cannot be delivered land here instead of being silently
//! dropped. The sink is observable through a broadcast subscription and is
//! never fatal.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};

// Layer 2: Third-party crate imports
use tokio::sync::broadcast;
use tracing::debug;

// Layer 3: Internal module imports
use crate::message::Envelope;

const DEAD_LETTER_BUFFER: usize = 1024;

/// Why an envelope became a dead letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// No actor registered under the receiver name.
    NoRecipient,
    /// The receiver had already stopped or was stopping.
    RecipientStopped,
    /// The receiver's mailbox was closed mid-delivery.
    MailboxClosed,
    /// Drained from the mailbox of a stopping cell.
    Drained,
    /// The receiving behavior declined the message.
    Unhandled,
}

/// A dead letter: the undeliverable envelope plus the reason.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: Envelope,
    pub reason: DeadLetterReason,
}

/// Process-wide dead-letter channel, one per actor system.
pub(crate) struct DeadLetterSink {
    tx: broadcast::Sender<DeadLetter>,
    count: AtomicU64,
}

impl DeadLetterSink {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEAD_LETTER_BUFFER);
        Self {
            tx,
            count: AtomicU64::new(0),
        }
    }

    /// Record a dead letter and notify subscribers, if any.
    pub(crate) fn publish(&self, envelope: Envelope, reason: DeadLetterReason) {
        self.count.fetch_add(1, Ordering::Relaxed);
        debug!(
            receiver = %envelope.receiver(),
            type_url = envelope.payload().type_url(),
            ?reason,
            "dead letter"
        );
        let _ = self.tx.send(DeadLetter { envelope, reason });
    }

    /// Subscribe to dead letters from this point on.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<DeadLetter> {
        self.tx.subscribe()
    }

    /// Total dead letters since the system started.
    pub(crate) fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
