//! Transport error taxonomy.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::message::CodecError;

/// Failures of the remoting transport.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The connection to a peer dropped or could not be established.
    #[error("connection to {peer} lost: {detail}")]
    ConnectionLost { peer: String, detail: String },

    /// An encoded frame exceeds the configured maximum.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    /// A send or request did not complete in time.
    #[error("remote operation timed out after {0:?}")]
    Timeout(Duration),

    /// TLS negotiation with a peer failed.
    #[error("tls handshake with {peer} failed: {detail}")]
    TlsHandshake { peer: String, detail: String },

    /// Certificate or key material could not be loaded.
    #[error("invalid tls material: {0}")]
    TlsConfig(String),

    /// Bytes on the wire did not parse as a frame.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A batch send failed part-way; `delivered` envelopes made it.
    #[error("batch failed after {delivered} deliveries: {detail}")]
    BatchFailed { delivered: u64, detail: String },

    /// The peer answered with an error frame.
    #[error("remote peer rejected the request: {0}")]
    Rejected(String),

    /// Underlying socket failure.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Payload codec failure on the send path.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
