//! The wire frame: `{header_len | header | payload cells}`.
//!
//! The outer transport adds a 4-byte length prefix per frame
//! (`LengthDelimitedCodec`); inside, a JSON header carries routing and
//! correlation metadata, followed by zero or more opaque payload cells of
//! the form `{u16 type_url_len | type_url | u32 data_len | data}`.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::error::RemoteError;
use crate::address::Address;
use crate::message::Payload;

/// What a frame means to the receiving node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    /// Fire-and-forget delivery to a named actor.
    Tell,
    /// Order-preserving multi-envelope delivery; answered by `BatchAck`.
    BatchTell,
    /// Acknowledges a `BatchTell`, reporting the delivered count.
    BatchAck,
    /// Request expecting a `Reply` under the same correlation id.
    Ask,
    /// Answer to an `Ask`.
    Reply,
    /// Name resolution probe; answered by `LookupReply`.
    Lookup,
    /// Answer to a `Lookup`; `to` carries the resolved address, if any.
    LookupReply,
    /// Keep-alive. Resets the server's idle timer, no response.
    Heartbeat,
    /// Error answer to any correlated request.
    Fail,
    /// Cluster directory write; answered by `DirAck` or `Fail`.
    DirPut,
    /// Acknowledges a `DirPut` or `DirDel`.
    DirAck,
    /// Cluster directory read; answered by `DirGetReply`.
    DirGet,
    /// Answer to a `DirGet`; the payload cell holds the entry, if found.
    DirGetReply,
    /// Cluster directory removal; answered by `DirAck`.
    DirDel,
    /// Peer join / liveness announcement; answered by `JoinAck`.
    Join,
    /// Answer to a `Join`; the payload cell holds the responder's peer view.
    JoinAck,
}

/// Frame metadata. Serialized as JSON on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub kind: FrameKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub from: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correlation_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deadline_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delivered: Option<u64>,
    #[serde(default)]
    pub flags: u32,
}

impl FrameHeader {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            from: None,
            to: None,
            name: None,
            correlation_id: None,
            deadline_ms: None,
            error: None,
            delivered: None,
            flags: 0,
        }
    }
}

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payloads: Vec<Payload>,
}

impl Frame {
    pub fn tell(from: Option<Address>, to: Address, payload: Payload) -> Self {
        let mut header = FrameHeader::new(FrameKind::Tell);
        header.from = from;
        header.to = Some(to);
        Self {
            header,
            payloads: vec![payload],
        }
    }

    pub fn batch_tell(
        from: Option<Address>,
        to: Address,
        payloads: Vec<Payload>,
        correlation_id: u64,
    ) -> Self {
        let mut header = FrameHeader::new(FrameKind::BatchTell);
        header.from = from;
        header.to = Some(to);
        header.correlation_id = Some(correlation_id);
        Self { header, payloads }
    }

    pub fn batch_ack(correlation_id: u64, delivered: u64) -> Self {
        let mut header = FrameHeader::new(FrameKind::BatchAck);
        header.correlation_id = Some(correlation_id);
        header.delivered = Some(delivered);
        Self {
            header,
            payloads: Vec::new(),
        }
    }

    pub fn ask(
        from: Option<Address>,
        to: Address,
        payload: Payload,
        correlation_id: u64,
        deadline_ms: u64,
    ) -> Self {
        let mut header = FrameHeader::new(FrameKind::Ask);
        header.from = from;
        header.to = Some(to);
        header.correlation_id = Some(correlation_id);
        header.deadline_ms = Some(deadline_ms);
        Self {
            header,
            payloads: vec![payload],
        }
    }

    pub fn reply(correlation_id: u64, payload: Payload) -> Self {
        let mut header = FrameHeader::new(FrameKind::Reply);
        header.correlation_id = Some(correlation_id);
        Self {
            header,
            payloads: vec![payload],
        }
    }

    pub fn lookup(name: impl Into<String>, correlation_id: u64) -> Self {
        let mut header = FrameHeader::new(FrameKind::Lookup);
        header.name = Some(name.into());
        header.correlation_id = Some(correlation_id);
        Self {
            header,
            payloads: Vec::new(),
        }
    }

    pub fn lookup_reply(correlation_id: u64, found: Option<Address>) -> Self {
        let mut header = FrameHeader::new(FrameKind::LookupReply);
        header.correlation_id = Some(correlation_id);
        header.to = found;
        Self {
            header,
            payloads: Vec::new(),
        }
    }

    pub fn heartbeat() -> Self {
        Self {
            header: FrameHeader::new(FrameKind::Heartbeat),
            payloads: Vec::new(),
        }
    }

    pub fn fail(correlation_id: u64, error: impl Into<String>, delivered: Option<u64>) -> Self {
        let mut header = FrameHeader::new(FrameKind::Fail);
        header.correlation_id = Some(correlation_id);
        header.error = Some(error.into());
        header.delivered = delivered;
        Self {
            header,
            payloads: Vec::new(),
        }
    }

    /// Cluster frame with one payload cell and a correlation id.
    pub fn cluster(kind: FrameKind, correlation_id: u64, payload: Option<Payload>) -> Self {
        let mut header = FrameHeader::new(kind);
        header.correlation_id = Some(correlation_id);
        Self {
            header,
            payloads: payload.into_iter().collect(),
        }
    }

    /// Cluster frame addressed by bare name (directory reads/removals).
    pub fn cluster_named(kind: FrameKind, correlation_id: u64, name: impl Into<String>) -> Self {
        let mut header = FrameHeader::new(kind);
        header.correlation_id = Some(correlation_id);
        header.name = Some(name.into());
        Self {
            header,
            payloads: Vec::new(),
        }
    }

    pub fn correlation_id(&self) -> Option<u64> {
        self.header.correlation_id
    }

    /// First payload cell, for single-payload frame kinds.
    pub fn payload(&self) -> Option<&Payload> {
        self.payloads.first()
    }

    /// Wire size of this frame's payload section.
    pub fn payload_wire_len(&self) -> usize {
        self.payloads.iter().map(Payload::wire_len).sum()
    }

    /// Encode into the body of a length-delimited frame, enforcing the
    /// configured cap.
    pub fn encode(&self, max_frame_size: usize) -> Result<Bytes, RemoteError> {
        let header = serde_json::to_vec(&self.header)
            .map_err(|e| RemoteError::Malformed(format!("header encode: {e}")))?;

        let size = 4 + header.len() + self.payload_wire_len();
        if size > max_frame_size {
            return Err(RemoteError::FrameTooLarge {
                size,
                max: max_frame_size,
            });
        }

        let mut buf = BytesMut::with_capacity(size);
        buf.put_u32(header.len() as u32);
        buf.put_slice(&header);
        for payload in &self.payloads {
            buf.put_u16(payload.type_url().len() as u16);
            buf.put_slice(payload.type_url().as_bytes());
            buf.put_u32(payload.data().len() as u32);
            buf.put_slice(payload.data());
        }
        Ok(buf.freeze())
    }

    /// Decode a frame body.
    pub fn decode(mut buf: Bytes) -> Result<Self, RemoteError> {
        if buf.remaining() < 4 {
            return Err(RemoteError::Malformed("truncated header length".into()));
        }
        let header_len = buf.get_u32() as usize;
        if buf.remaining() < header_len {
            return Err(RemoteError::Malformed("truncated header".into()));
        }
        let header: FrameHeader = serde_json::from_slice(&buf.split_to(header_len))
            .map_err(|e| RemoteError::Malformed(format!("header decode: {e}")))?;

        let mut payloads = Vec::new();
        while buf.has_remaining() {
            if buf.remaining() < 2 {
                return Err(RemoteError::Malformed("truncated payload tag length".into()));
            }
            let url_len = buf.get_u16() as usize;
            if buf.remaining() < url_len {
                return Err(RemoteError::Malformed("truncated payload tag".into()));
            }
            let type_url = String::from_utf8(buf.split_to(url_len).to_vec())
                .map_err(|e| RemoteError::Malformed(format!("payload tag: {e}")))?;
            if buf.remaining() < 4 {
                return Err(RemoteError::Malformed("truncated payload length".into()));
            }
            let data_len = buf.get_u32() as usize;
            if buf.remaining() < data_len {
                return Err(RemoteError::Malformed("truncated payload".into()));
            }
            payloads.push(Payload::from_parts(type_url, buf.split_to(data_len)));
        }

        Ok(Self { header, payloads })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::Message;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u64,
    }

    impl Message for Ping {
        const TYPE_URL: &'static str = "test/Ping";
    }

    fn payload(seq: u64) -> Payload {
        Payload::encode(&Ping { seq }).unwrap()
    }

    #[test]
    fn test_tell_round_trip() {
        let frame = Frame::tell(
            Some(Address::remote("sys", "10.0.0.1", 5051, "ping")),
            Address::remote("sys", "10.0.0.2", 5051, "pong"),
            payload(1),
        );

        let bytes = frame.encode(1024 * 1024).unwrap();
        let decoded = Frame::decode(bytes).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.payload().unwrap().decode::<Ping>().unwrap().seq, 1);
    }

    #[test]
    fn test_batch_round_trip_preserves_order() {
        let payloads: Vec<Payload> = (0..100).map(payload).collect();
        let frame = Frame::batch_tell(
            None,
            Address::remote("sys", "10.0.0.2", 5051, "pong"),
            payloads,
            7,
        );

        let decoded = Frame::decode(frame.encode(10 * 1024 * 1024).unwrap()).unwrap();
        let seqs: Vec<u64> = decoded
            .payloads
            .iter()
            .map(|p| p.decode::<Ping>().unwrap().seq)
            .collect();
        assert_eq!(seqs, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_oversize_frame_fails_encode() {
        let frame = Frame::tell(
            None,
            Address::remote("sys", "10.0.0.2", 5051, "pong"),
            payload(1),
        );
        let err = frame.encode(16).unwrap_err();
        assert!(matches!(err, RemoteError::FrameTooLarge { max: 16, .. }));
    }

    #[test]
    fn test_empty_payload_frames() {
        for frame in [
            Frame::heartbeat(),
            Frame::batch_ack(3, 42),
            Frame::fail(4, "boom", Some(2)),
            Frame::lookup("pong", 5),
            Frame::lookup_reply(5, None),
        ] {
            let decoded = Frame::decode(frame.encode(4096).unwrap()).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn test_lookup_reply_carries_address() {
        let found = Address::remote("sys", "10.0.0.2", 5051, "pong");
        let frame = Frame::lookup_reply(9, Some(found.clone()));
        let decoded = Frame::decode(frame.encode(4096).unwrap()).unwrap();
        assert_eq!(decoded.header.to, Some(found));
    }

    #[test]
    fn test_truncated_input() {
        assert!(Frame::decode(Bytes::from_static(&[0, 0])).is_err());
        assert!(Frame::decode(Bytes::from_static(&[0, 0, 0, 99, 1])).is_err());
    }
}
