//! Envelopes: payloads plus routing metadata.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};

// Layer 3: Internal module imports
use super::payload::Payload;
use crate::address::Address;

/// Header marking an envelope as originating from the passivation controller.
pub(crate) const PASSIVATION_HEADER: &str = "aktos-passivation";

static ENVELOPE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Allocate the next process-monotonic envelope id.
///
/// Ids double as ask correlation ids: a reply envelope references the id of
/// the request it answers via `in_reply_to`.
pub fn next_envelope_id() -> u64 {
    ENVELOPE_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// A message in flight: the opaque payload plus everything the runtime needs
/// to route, correlate, and expire it. Immutable once enqueued.
///
/// # Example
/// ```rust
/// use aktos_rt::address::Address;
/// use aktos_rt::message::{Envelope, Message, Payload};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Ping;
/// impl Message for Ping {
///     const TYPE_URL: &'static str = "example/Ping";
/// }
///
/// let to = Address::local("sys", "echo");
/// let env = Envelope::new(to, Payload::encode(&Ping).unwrap())
///     .with_sender(Address::local("sys", "caller"));
///
/// assert!(env.sender().is_some());
/// assert!(env.payload().is::<Ping>());
/// ```
#[derive(Debug, Clone)]
pub struct Envelope {
    id: u64,
    sender: Option<Address>,
    receiver: Address,
    payload: Payload,
    headers: HashMap<String, String>,
    in_reply_to: Option<u64>,
    deadline: Option<DateTime<Utc>>,
    timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Create a new envelope with a fresh monotonic id.
    pub fn new(receiver: Address, payload: Payload) -> Self {
        Self {
            id: next_envelope_id(),
            sender: None,
            receiver,
            payload,
            headers: HashMap::new(),
            in_reply_to: None,
            deadline: None,
            timestamp: Utc::now(),
        }
    }

    /// Builder method: set the sender address.
    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Builder method: attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Builder method: mark this envelope as a reply to a previous one.
    pub fn with_in_reply_to(mut self, id: u64) -> Self {
        self.in_reply_to = Some(id);
        self
    }

    /// Builder method: set an absolute delivery deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    pub fn receiver(&self) -> &Address {
        &self.receiver
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consume the envelope, yielding its payload.
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn in_reply_to(&self) -> Option<u64> {
        self.in_reply_to
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether the deadline, if any, has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Utc::now() > d)
    }

    pub(crate) fn is_passivation(&self) -> bool {
        self.headers.contains_key(PASSIVATION_HEADER)
    }
}
