//! Mailbox construction recipes.

// Layer 1: Standard library imports
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::queue::{self, MailboxReceiver, MailboxSender};
use crate::message::Envelope;

/// Ordering function for priority mailboxes.
///
/// Must be a strict weak order over envelopes. `Ordering::Less` means the
/// left envelope dequeues first; envelopes that compare equal dequeue in
/// enqueue order (FIFO on ties).
pub type EnvelopeComparator = Arc<dyn Fn(&Envelope, &Envelope) -> Ordering + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Discipline {
    Unbounded,
    Bounded(usize),
    Priority(EnvelopeComparator),
}

/// Recipe for a cell's mailbox, passed at spawn time.
///
/// # Example
/// ```rust
/// use aktos_rt::mailbox::MailboxSpec;
///
/// let default = MailboxSpec::unbounded();
/// let bounded = MailboxSpec::bounded(64);
/// let priority = MailboxSpec::priority(|a, b| b.id().cmp(&a.id()));
/// # let _ = (default, bounded, priority);
/// ```
#[derive(Clone)]
pub struct MailboxSpec {
    pub(crate) discipline: Discipline,
}

impl MailboxSpec {
    /// Unbounded FIFO mailbox (the default discipline).
    pub fn unbounded() -> Self {
        Self {
            discipline: Discipline::Unbounded,
        }
    }

    /// Bounded FIFO mailbox. `enqueue` fails with `MailboxError::Full` once
    /// `capacity` envelopes are queued.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            discipline: Discipline::Bounded(capacity),
        }
    }

    /// Unbounded priority mailbox ordered by `cmp`; ties break FIFO.
    pub fn priority<F>(cmp: F) -> Self
    where
        F: Fn(&Envelope, &Envelope) -> Ordering + Send + Sync + 'static,
    {
        Self {
            discipline: Discipline::Priority(Arc::new(cmp)),
        }
    }

    /// Materialize the mailbox halves.
    pub(crate) fn build(&self) -> (MailboxSender, MailboxReceiver) {
        queue::mailbox(self.discipline.clone())
    }
}

impl Default for MailboxSpec {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl fmt::Debug for MailboxSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.discipline {
            Discipline::Unbounded => write!(f, "MailboxSpec::Unbounded"),
            Discipline::Bounded(n) => write!(f, "MailboxSpec::Bounded({n})"),
            Discipline::Priority(_) => write!(f, "MailboxSpec::Priority"),
        }
    }
}
