//! Remoting: the framed RPC transport between nodes.
//!
//! Wire model: length-prefixed binary frames carrying a JSON header plus
//! zero or more opaque payload cells. Connections are long-lived,
//! multiplexed by correlation id, and kept alive by client heartbeats.
//! Primitives: `remote_tell`, `remote_ask`, `remote_batch_tell`,
//! `remote_lookup`. Cluster directory traffic rides the same transport.

pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod server;
pub mod tls;

pub use config::RemoteConfig;
pub use error::RemoteError;
pub use frame::{Frame, FrameHeader, FrameKind};
pub use tls::{ClientTlsConfig, ServerTlsConfig};

pub(crate) use client::RemotingClient;
pub(crate) use server::RemotingServer;
