//! Outbound remoting: the connection pool and send primitives.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::config::RemoteConfig;
use super::error::RemoteError;
use super::frame::{Frame, FrameKind};
use super::tls;
use crate::address::Address;
use crate::message::Payload;

const OUTBOUND_QUEUE: usize = 1024;

trait AsyncIo: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncIo for T {}

type BoxIo = Box<dyn AsyncIo>;

struct Connection {
    peer: String,
    outbound: mpsc::Sender<Bytes>,
    pending: Arc<DashMap<u64, oneshot::Sender<Frame>>>,
    alive: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    fn close(&self) {
        self.alive.store(false, Ordering::Release);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.pending.clear();
    }
}

/// Multiplexed, keep-alive'd connections to remote nodes. One instance per
/// actor system; connections are created on first use and reused until they
/// fail or the system stops.
pub(crate) struct RemotingClient {
    config: RemoteConfig,
    connector: Option<TlsConnector>,
    connections: DashMap<String, Arc<Connection>>,
    correlations: AtomicU64,
}

impl RemotingClient {
    pub(crate) fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let connector = match config.client_tls() {
            Some(tls_config) => Some(tls::build_connector(tls_config)?),
            None => None,
        };
        Ok(Self {
            config,
            connector,
            connections: DashMap::new(),
            correlations: AtomicU64::new(1),
        })
    }

    fn next_correlation(&self) -> u64 {
        self.correlations.fetch_add(1, Ordering::Relaxed)
    }

    /// Fire-and-forget delivery: at-most-once per attempt.
    pub(crate) async fn tell(
        &self,
        to: &Address,
        payload: Payload,
        from: Option<Address>,
    ) -> Result<(), RemoteError> {
        let (host, port) = require_location(to)?;
        let connection = self.connection(host, port).await?;
        let frame = Frame::tell(from, to.clone(), payload);
        self.send(&connection, &frame).await
    }

    /// Request/response with a deadline.
    pub(crate) async fn ask(
        &self,
        to: &Address,
        payload: Payload,
        from: Option<Address>,
        deadline: Duration,
    ) -> Result<Payload, RemoteError> {
        let (host, port) = require_location(to)?;
        let correlation = self.next_correlation();
        let frame = Frame::ask(
            from,
            to.clone(),
            payload,
            correlation,
            deadline.as_millis() as u64,
        );

        let response = self.request(host, port, frame, deadline).await?;
        match response.header.kind {
            FrameKind::Reply => response
                .payloads
                .into_iter()
                .next()
                .ok_or_else(|| RemoteError::Malformed("reply without payload".into())),
            FrameKind::Fail => Err(RemoteError::Rejected(
                response.header.error.unwrap_or_else(|| "unknown".into()),
            )),
            other => Err(RemoteError::Malformed(format!(
                "unexpected response kind {other:?}"
            ))),
        }
    }

    /// Order-preserving batch delivery. Envelopes are packed greedily into
    /// frames under `max_frame_size`; each frame is acknowledged before the
    /// next is sent, so partial failure reports an exact delivered count.
    pub(crate) async fn batch_tell(
        &self,
        to: &Address,
        payloads: Vec<Payload>,
        from: Option<Address>,
    ) -> Result<(), RemoteError> {
        let (host, port) = require_location(to)?;
        let max = self.config.max_frame_size();
        // Frame overhead: length prefix is external; header stays small but
        // is budgeted generously.
        let budget = max.saturating_sub(1024);

        let mut delivered: u64 = 0;
        let mut chunk: Vec<Payload> = Vec::new();
        let mut chunk_size = 0usize;
        let mut chunks: Vec<Vec<Payload>> = Vec::new();

        for payload in payloads {
            let cell = payload.wire_len();
            if cell > budget {
                return Err(RemoteError::FrameTooLarge { size: cell, max });
            }
            if chunk_size + cell > budget && !chunk.is_empty() {
                chunks.push(std::mem::take(&mut chunk));
                chunk_size = 0;
            }
            chunk_size += cell;
            chunk.push(payload);
        }
        if !chunk.is_empty() {
            chunks.push(chunk);
        }

        for payloads in chunks {
            let count = payloads.len() as u64;
            let correlation = self.next_correlation();
            let frame = Frame::batch_tell(from.clone(), to.clone(), payloads, correlation);
            let response = self
                .request(host, port, frame, self.config.write_timeout())
                .await
                .map_err(|err| RemoteError::BatchFailed {
                    delivered,
                    detail: err.to_string(),
                })?;

            match response.header.kind {
                FrameKind::BatchAck => {
                    delivered += response.header.delivered.unwrap_or(count);
                }
                FrameKind::Fail => {
                    return Err(RemoteError::BatchFailed {
                        delivered: delivered + response.header.delivered.unwrap_or(0),
                        detail: response.header.error.unwrap_or_else(|| "unknown".into()),
                    });
                }
                other => {
                    return Err(RemoteError::BatchFailed {
                        delivered,
                        detail: format!("unexpected response kind {other:?}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolve a name on a specific node.
    pub(crate) async fn lookup(
        &self,
        host: &str,
        port: u16,
        name: &str,
    ) -> Result<Option<Address>, RemoteError> {
        let correlation = self.next_correlation();
        let frame = Frame::lookup(name, correlation);
        let response = self
            .request(host, port, frame, self.config.write_timeout())
            .await?;
        match response.header.kind {
            FrameKind::LookupReply => Ok(response.header.to),
            FrameKind::Fail => Err(RemoteError::Rejected(
                response.header.error.unwrap_or_else(|| "unknown".into()),
            )),
            other => Err(RemoteError::Malformed(format!(
                "unexpected response kind {other:?}"
            ))),
        }
    }

    /// Correlated request over the multiplexed connection. Used by asks,
    /// batches, lookups, and the cluster directory.
    pub(crate) async fn request(
        &self,
        host: &str,
        port: u16,
        frame: Frame,
        deadline: Duration,
    ) -> Result<Frame, RemoteError> {
        let correlation = frame
            .correlation_id()
            .ok_or_else(|| RemoteError::Malformed("request frame without correlation".into()))?;
        let connection = self.connection(host, port).await?;

        let (reply_tx, reply_rx) = oneshot::channel();
        connection.pending.insert(correlation, reply_tx);

        if let Err(err) = self.send(&connection, &frame).await {
            connection.pending.remove(&correlation);
            return Err(err);
        }

        match timeout(deadline, reply_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RemoteError::ConnectionLost {
                peer: connection.peer.clone(),
                detail: "connection closed while awaiting reply".into(),
            }),
            Err(_) => {
                connection.pending.remove(&correlation);
                Err(RemoteError::Timeout(deadline))
            }
        }
    }

    async fn send(&self, connection: &Connection, frame: &Frame) -> Result<(), RemoteError> {
        let bytes = frame.encode(self.config.max_frame_size())?;
        timeout(self.config.write_timeout(), connection.outbound.send(bytes))
            .await
            .map_err(|_| RemoteError::Timeout(self.config.write_timeout()))?
            .map_err(|_| RemoteError::ConnectionLost {
                peer: connection.peer.clone(),
                detail: "writer task gone".into(),
            })
    }

    async fn connection(&self, host: &str, port: u16) -> Result<Arc<Connection>, RemoteError> {
        let peer = format!("{host}:{port}");
        if let Some(existing) = self.connections.get(&peer) {
            if existing.alive.load(Ordering::Acquire) {
                return Ok(Arc::clone(existing.value()));
            }
            drop(existing);
            self.connections.remove(&peer);
        }

        let connection = self.connect(host, port, &peer).await?;
        self.connections.insert(peer, Arc::clone(&connection));
        Ok(connection)
    }

    async fn connect(
        &self,
        host: &str,
        port: u16,
        peer: &str,
    ) -> Result<Arc<Connection>, RemoteError> {
        let tcp = timeout(self.config.write_timeout(), TcpStream::connect((host, port)))
            .await
            .map_err(|_| RemoteError::Timeout(self.config.write_timeout()))?
            .map_err(|e| RemoteError::ConnectionLost {
                peer: peer.to_owned(),
                detail: e.to_string(),
            })?;
        let _ = tcp.set_nodelay(true);

        let io: BoxIo = match &self.connector {
            Some(connector) => {
                let domain = self
                    .config
                    .client_tls()
                    .and_then(|t| t.domain())
                    .unwrap_or(host)
                    .to_owned();
                let server_name =
                    ServerName::try_from(domain).map_err(|e| RemoteError::TlsHandshake {
                        peer: peer.to_owned(),
                        detail: e.to_string(),
                    })?;
                let stream = connector.connect(server_name, tcp).await.map_err(|e| {
                    RemoteError::TlsHandshake {
                        peer: peer.to_owned(),
                        detail: e.to_string(),
                    }
                })?;
                Box::new(stream)
            }
            None => Box::new(tcp),
        };

        let mut codec = LengthDelimitedCodec::new();
        codec.set_max_frame_length(self.config.max_frame_size());
        let framed = Framed::new(io, codec);
        let (mut sink, mut stream) = framed.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE);
        let pending: Arc<DashMap<u64, oneshot::Sender<Frame>>> = Arc::new(DashMap::new());
        let alive = Arc::new(AtomicBool::new(true));

        let write_timeout = self.config.write_timeout();
        let writer_alive = Arc::clone(&alive);
        let writer_peer = peer.to_owned();
        let writer = tokio::spawn(async move {
            while let Some(bytes) = outbound_rx.recv().await {
                match timeout(write_timeout, sink.send(bytes)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!(peer = %writer_peer, error = %err, "remote write failed");
                        break;
                    }
                    Err(_) => {
                        warn!(peer = %writer_peer, "remote write timed out");
                        break;
                    }
                }
            }
            writer_alive.store(false, Ordering::Release);
        });

        let reader_alive = Arc::clone(&alive);
        let reader_pending = Arc::clone(&pending);
        let reader_peer = peer.to_owned();
        let reader = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let bytes = match item {
                    Ok(bytes) => bytes.freeze(),
                    Err(err) => {
                        debug!(peer = %reader_peer, error = %err, "remote read failed");
                        break;
                    }
                };
                let frame = match Frame::decode(bytes) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(peer = %reader_peer, error = %err, "dropping malformed frame");
                        continue;
                    }
                };
                if let Some(correlation) = frame.correlation_id() {
                    if let Some((_, tx)) = reader_pending.remove(&correlation) {
                        let _ = tx.send(frame);
                    }
                }
            }
            reader_alive.store(false, Ordering::Release);
            // Dropping the senders resolves every waiter with an error.
            reader_pending.clear();
        });

        // Client-side keep-alive: a heartbeat well inside the server's idle
        // window.
        let heartbeat_interval = self
            .config
            .read_idle_timeout()
            .checked_div(3)
            .unwrap_or(Duration::from_secs(20))
            .max(Duration::from_millis(100));
        let heartbeat_tx = outbound_tx.clone();
        let heartbeat_alive = Arc::clone(&alive);
        let max_frame = self.config.max_frame_size();
        let heartbeat = tokio::spawn(async move {
            loop {
                tokio::time::sleep(heartbeat_interval).await;
                if !heartbeat_alive.load(Ordering::Acquire) {
                    break;
                }
                let Ok(bytes) = Frame::heartbeat().encode(max_frame) else {
                    break;
                };
                if heartbeat_tx.send(bytes).await.is_err() {
                    break;
                }
            }
        });

        debug!(peer = %peer, tls = self.connector.is_some(), "remote connection established");

        Ok(Arc::new(Connection {
            peer: peer.to_owned(),
            outbound: outbound_tx,
            pending,
            alive,
            tasks: Mutex::new(vec![writer, reader, heartbeat]),
        }))
    }

    /// Drop every pooled connection.
    pub(crate) fn shutdown(&self) {
        for entry in self.connections.iter() {
            entry.value().close();
        }
        self.connections.clear();
    }
}

impl Drop for RemotingClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl RemotingClient {
    /// Allocate a correlation id for callers that assemble their own
    /// request frames (the cluster engine does).
    pub(crate) fn correlation(&self) -> u64 {
        self.next_correlation()
    }
}

fn require_location(address: &Address) -> Result<(&str, u16), RemoteError> {
    address.location().ok_or_else(|| {
        RemoteError::Malformed(format!("address {address} carries no host and port"))
    })
}
