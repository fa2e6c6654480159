//! Opaque, codec-tagged message payloads.

// Layer 1: Standard library imports
use std::fmt::Debug;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Reserved type-URL prefix for runtime control messages.
pub(crate) const SYSTEM_URL_PREFIX: &str = "aktos.sys/";

/// Trait for user message types with compile-time type identification.
///
/// The type URL is the structural tag carried on the wire; the runtime routes
/// on it without ever inspecting the payload shape.
///
/// # Example
/// ```rust
/// use aktos_rt::message::{Message, Payload};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Greet {
///     who: String,
/// }
///
/// impl Message for Greet {
///     const TYPE_URL: &'static str = "example/Greet";
/// }
///
/// let payload = Payload::encode(&Greet { who: "world".into() }).unwrap();
/// assert!(payload.is::<Greet>());
/// assert_eq!(payload.decode::<Greet>().unwrap().who, "world");
/// ```
pub trait Message: Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Unique message type identifier (compile-time constant).
    const TYPE_URL: &'static str;
}

/// Payload codec failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload carries a different type URL than the requested type.
    #[error("payload type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// Message could not be serialized by the default codec.
    #[error("payload encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Payload bytes are not a valid encoding of the requested type.
    #[error("payload decoding failed: {0}")]
    Decode(#[source] serde_json::Error),
}

/// An opaque message payload: a type URL plus codec-encoded bytes.
///
/// Cloning is cheap ([`Bytes`] is reference counted), and equality is
/// byte-for-byte, which is what frame round-trip checks rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    type_url: String,
    data: Bytes,
}

impl Payload {
    /// Encode a typed message into an opaque payload.
    pub fn encode<M: Message>(message: &M) -> Result<Self, CodecError> {
        let data = serde_json::to_vec(message).map_err(CodecError::Encode)?;
        Ok(Self {
            type_url: M::TYPE_URL.to_owned(),
            data: Bytes::from(data),
        })
    }

    /// Reassemble a payload from its wire parts.
    pub fn from_parts(type_url: impl Into<String>, data: Bytes) -> Self {
        Self {
            type_url: type_url.into(),
            data,
        }
    }

    /// Decode into a typed message, checking the structural tag first.
    pub fn decode<M: Message>(&self) -> Result<M, CodecError> {
        if self.type_url != M::TYPE_URL {
            return Err(CodecError::TypeMismatch {
                expected: M::TYPE_URL,
                found: self.type_url.clone(),
            });
        }
        serde_json::from_slice(&self.data).map_err(CodecError::Decode)
    }

    /// Whether the payload carries the given message type.
    pub fn is<M: Message>(&self) -> bool {
        self.type_url == M::TYPE_URL
    }

    /// Structural tag of the payload.
    pub fn type_url(&self) -> &str {
        &self.type_url
    }

    /// Encoded bytes of the payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Reserved payloads belong to the runtime, not to user traffic.
    pub(crate) fn is_system(&self) -> bool {
        self.type_url.starts_with(SYSTEM_URL_PREFIX)
    }

    /// Size of the payload on the wire: tag, bytes, and cell framing.
    pub(crate) fn wire_len(&self) -> usize {
        2 + self.type_url.len() + 4 + self.data.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestMessage {
        value: u32,
    }

    impl Message for TestMessage {
        const TYPE_URL: &'static str = "test/TestMessage";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OtherMessage;

    impl Message for OtherMessage {
        const TYPE_URL: &'static str = "test/OtherMessage";
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let payload = Payload::encode(&TestMessage { value: 7 }).unwrap();

        assert_eq!(payload.type_url(), "test/TestMessage");
        assert_eq!(payload.decode::<TestMessage>().unwrap().value, 7);
    }

    #[test]
    fn test_type_mismatch() {
        let payload = Payload::encode(&TestMessage { value: 7 }).unwrap();

        assert!(!payload.is::<OtherMessage>());
        let err = payload.decode::<OtherMessage>().unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn test_malformed_bytes() {
        let payload = Payload::from_parts(TestMessage::TYPE_URL, Bytes::from_static(b"not-json"));
        assert!(matches!(
            payload.decode::<TestMessage>(),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn test_system_prefix() {
        let user = Payload::encode(&TestMessage { value: 1 }).unwrap();
        assert!(!user.is_system());

        let sys = Payload::from_parts("aktos.sys/PoisonPill", Bytes::new());
        assert!(sys.is_system());
    }

    #[test]
    fn test_payload_equality() {
        let a = Payload::encode(&TestMessage { value: 3 }).unwrap();
        let b = Payload::encode(&TestMessage { value: 3 }).unwrap();
        let c = Payload::encode(&TestMessage { value: 4 }).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
