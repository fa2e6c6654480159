//! Per-cell envelope queues.
//!
//! Every cell owns exactly one mailbox with one of three disciplines:
//!
//! - unbounded FIFO (the default)
//! - bounded FIFO with a fixed capacity, failing fast when full
//! - unbounded priority ordered by a user comparator, FIFO on ties
//!
//! Mailboxes are multi-producer / single-consumer. The producer half
//! ([`MailboxSender`]) is cheap to clone; the consumer half
//! ([`MailboxReceiver`]) is owned exclusively by the cell's dispatcher.
//! `enqueue` never waits for user code: the critical section is a short
//! mutex-guarded queue operation.

pub mod queue;
pub mod spec;

pub use queue::{MailboxError, MailboxReceiver, MailboxSender};
pub use spec::{EnvelopeComparator, MailboxSpec};
