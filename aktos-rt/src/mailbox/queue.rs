//! The shared queue behind all three mailbox disciplines.

// Layer 1: Standard library imports
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

// Layer 3: Internal module imports
use super::spec::{Discipline, EnvelopeComparator};
use crate::message::Envelope;

/// Capacity and lifecycle failures of a mailbox.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailboxError {
    /// Bounded mailbox is at capacity.
    #[error("mailbox full: capacity {capacity} reached")]
    Full { capacity: usize },

    /// The mailbox was closed; no further envelopes are accepted.
    #[error("mailbox closed")]
    Closed,
}

enum Queue {
    Fifo(VecDeque<Envelope>),
    Priority {
        // Sorted by the comparator; `seq` breaks ties in enqueue order.
        items: Vec<(Envelope, u64)>,
        cmp: EnvelopeComparator,
        seq: u64,
    },
}

impl Queue {
    fn len(&self) -> usize {
        match self {
            Queue::Fifo(q) => q.len(),
            Queue::Priority { items, .. } => items.len(),
        }
    }

    fn push(&mut self, env: Envelope) {
        match self {
            Queue::Fifo(q) => q.push_back(env),
            Queue::Priority { items, cmp, seq } => {
                // Everything that compares Less or Equal stays ahead of the
                // newcomer, which is exactly FIFO-on-tie.
                let at = items.partition_point(|(e, _)| cmp(e, &env) != Ordering::Greater);
                items.insert(at, (env, *seq));
                *seq += 1;
            }
        }
    }

    fn pop(&mut self) -> Option<Envelope> {
        match self {
            Queue::Fifo(q) => q.pop_front(),
            Queue::Priority { items, .. } => {
                if items.is_empty() {
                    None
                } else {
                    Some(items.remove(0).0)
                }
            }
        }
    }

    fn drain(&mut self) -> Vec<Envelope> {
        match self {
            Queue::Fifo(q) => q.drain(..).collect(),
            Queue::Priority { items, .. } => items.drain(..).map(|(e, _)| e).collect(),
        }
    }
}

struct MailboxCore {
    queue: Mutex<Queue>,
    notify: Notify,
    closed: AtomicBool,
    capacity: Option<usize>,
}

/// Producer half of a mailbox. Cloneable; `enqueue` never blocks on user
/// code, only on the internal queue mutex.
#[derive(Clone)]
pub struct MailboxSender {
    core: Arc<MailboxCore>,
}

/// Consumer half of a mailbox. Exactly one exists per cell.
pub struct MailboxReceiver {
    core: Arc<MailboxCore>,
}

pub(crate) fn mailbox(discipline: Discipline) -> (MailboxSender, MailboxReceiver) {
    let (queue, capacity) = match discipline {
        Discipline::Unbounded => (Queue::Fifo(VecDeque::new()), None),
        Discipline::Bounded(n) => (Queue::Fifo(VecDeque::with_capacity(n)), Some(n)),
        Discipline::Priority(cmp) => (
            Queue::Priority {
                items: Vec::new(),
                cmp,
                seq: 0,
            },
            None,
        ),
    };
    let core = Arc::new(MailboxCore {
        queue: Mutex::new(queue),
        notify: Notify::new(),
        closed: AtomicBool::new(false),
        capacity,
    });
    (
        MailboxSender {
            core: Arc::clone(&core),
        },
        MailboxReceiver { core },
    )
}

impl MailboxSender {
    /// Enqueue an envelope.
    pub fn enqueue(&self, env: Envelope) -> Result<(), MailboxError> {
        if self.core.closed.load(AtomicOrdering::Acquire) {
            return Err(MailboxError::Closed);
        }
        {
            let mut queue = self.core.queue.lock();
            if let Some(capacity) = self.core.capacity {
                if queue.len() >= capacity {
                    return Err(MailboxError::Full { capacity });
                }
            }
            queue.push(env);
        }
        self.core.notify.notify_one();
        Ok(())
    }

    /// Number of envelopes currently queued.
    pub fn len(&self) -> usize {
        self.core.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the mailbox. Later `enqueue` calls fail with `Closed`; the
    /// consumer drains whatever is already queued, then observes the end.
    pub fn close(&self) {
        self.core.closed.store(true, AtomicOrdering::Release);
        self.core.notify.notify_waiters();
        self.core.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(AtomicOrdering::Acquire)
    }

    /// Close and remove every queued envelope. Used when a cell is force
    /// released and its remainder becomes dead letters.
    pub(crate) fn drain_remaining(&self) -> Vec<Envelope> {
        self.close();
        self.core.queue.lock().drain()
    }
}

impl MailboxReceiver {
    /// Await the next envelope. Returns `None` once the mailbox is closed
    /// and fully drained.
    pub async fn dequeue(&self) -> Option<Envelope> {
        loop {
            let notified = self.core.notify.notified();
            tokio::pin!(notified);
            // Arm the waiter before checking so a concurrent enqueue cannot
            // slip between the check and the await.
            notified.as_mut().enable();

            if let Some(env) = self.try_dequeue() {
                return Some(env);
            }
            if self.core.closed.load(AtomicOrdering::Acquire) {
                return self.try_dequeue();
            }
            notified.await;
        }
    }

    /// Pop without waiting.
    pub fn try_dequeue(&self) -> Option<Envelope> {
        self.core.queue.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.core.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close from the consumer side (stop sequence).
    pub fn close(&self) {
        self.core.closed.store(true, AtomicOrdering::Release);
        self.core.notify.notify_waiters();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::mailbox::MailboxSpec;
    use crate::message::{Message, Payload};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Numbered {
        n: u64,
        priority: i64,
    }

    impl Message for Numbered {
        const TYPE_URL: &'static str = "test/Numbered";
    }

    fn envelope(n: u64, priority: i64) -> Envelope {
        Envelope::new(
            Address::local("sys", "target"),
            Payload::encode(&Numbered { n, priority }).unwrap(),
        )
    }

    fn number(env: &Envelope) -> u64 {
        env.payload().decode::<Numbered>().unwrap().n
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = MailboxSpec::unbounded().build();
        for n in 0..5 {
            tx.enqueue(envelope(n, 0)).unwrap();
        }
        for n in 0..5 {
            assert_eq!(number(&rx.dequeue().await.unwrap()), n);
        }
    }

    #[tokio::test]
    async fn test_bounded_rejects_when_full() {
        let (tx, _rx) = MailboxSpec::bounded(4).build();
        for n in 0..4 {
            tx.enqueue(envelope(n, 0)).unwrap();
        }
        assert_eq!(
            tx.enqueue(envelope(4, 0)),
            Err(MailboxError::Full { capacity: 4 })
        );
        assert_eq!(tx.len(), 4);
    }

    #[tokio::test]
    async fn test_priority_order_with_fifo_ties() {
        // Larger priority first.
        let spec = MailboxSpec::priority(|a, b| {
            let pa = a.payload().decode::<Numbered>().unwrap().priority;
            let pb = b.payload().decode::<Numbered>().unwrap().priority;
            pb.cmp(&pa)
        });
        let (tx, mut rx) = spec.build();
        for (n, p) in [(0, 1), (1, 3), (2, 2), (3, 5), (4, 4), (5, 3)] {
            tx.enqueue(envelope(n, p)).unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..6 {
            let env = rx.dequeue().await.unwrap();
            let msg = env.payload().decode::<Numbered>().unwrap();
            seen.push((msg.priority, msg.n));
        }
        // 5, 4, 3 (n=1 before n=5: enqueue order), 2, 1
        assert_eq!(seen, vec![(5, 3), (4, 4), (3, 1), (3, 5), (2, 2), (1, 0)]);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let (tx, mut rx) = MailboxSpec::unbounded().build();
        tx.enqueue(envelope(0, 0)).unwrap();
        tx.enqueue(envelope(1, 0)).unwrap();
        tx.close();

        assert_eq!(tx.enqueue(envelope(2, 0)), Err(MailboxError::Closed));
        assert_eq!(number(&rx.dequeue().await.unwrap()), 0);
        assert_eq!(number(&rx.dequeue().await.unwrap()), 1);
        assert!(rx.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let (tx, mut rx) = MailboxSpec::unbounded().build();
        let waiter = tokio::spawn(async move { rx.dequeue().await.map(|e| number(&e)) });
        tokio::task::yield_now().await;
        tx.enqueue(envelope(7, 0)).unwrap();
        assert_eq!(waiter.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_close() {
        let (tx, mut rx) = MailboxSpec::unbounded().build();
        let waiter = tokio::spawn(async move { rx.dequeue().await });
        tokio::task::yield_now().await;
        tx.close();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_many_producers_fifo_per_producer() {
        let (tx, mut rx) = MailboxSpec::unbounded().build();
        let mut handles = Vec::new();
        for p in 0..4u64 {
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100u64 {
                    tx.enqueue(envelope(p * 1000 + i, 0)).unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut last = [None::<u64>; 4];
        for _ in 0..400 {
            let n = number(&rx.dequeue().await.unwrap());
            let p = (n / 1000) as usize;
            let i = n % 1000;
            if let Some(prev) = last[p] {
                assert!(i > prev, "producer {p} out of order: {i} after {prev}");
            }
            last[p] = Some(i);
        }
    }

    #[tokio::test]
    async fn test_drain_remaining() {
        let (tx, _rx) = MailboxSpec::unbounded().build();
        tx.enqueue(envelope(0, 0)).unwrap();
        tx.enqueue(envelope(1, 0)).unwrap();

        let drained = tx.drain_remaining();
        assert_eq!(drained.len(), 2);
        assert!(tx.is_closed());
        assert!(tx.is_empty());
    }
}
