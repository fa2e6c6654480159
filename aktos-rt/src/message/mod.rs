//! Messages, envelopes, and the opaque payload codec.
//!
//! The runtime never interprets user message shapes. A message crosses every
//! boundary as a [`Payload`]: a codec-tagged, length-delimited blob identified
//! by a type URL. Typed dispatch happens inside user `receive` implementations
//! by structural matching on the tag.
//!
//! # Components
//!
//! - [`Message`] - trait tagging user types with a compile-time type URL
//! - [`Payload`] - opaque `{type_url, bytes}` blob
//! - [`Envelope`] - payload plus routing metadata (sender, receiver, headers)
//! - [`system`] - reserved control messages (`PostStart`, `PoisonPill`, ...)

pub mod envelope;
pub mod payload;
pub mod system;

pub use envelope::{next_envelope_id, Envelope};
pub use payload::{CodecError, Message, Payload};
pub use system::{Escalated, PoisonPill, PostStart, StopReason, Terminated};
