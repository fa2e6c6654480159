//! Inbound remoting: the per-node frame server.

// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::time::Duration;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::config::RemoteConfig;
use super::error::RemoteError;
use super::frame::{Frame, FrameKind};
use super::tls;
use crate::deadletter::DeadLetterReason;
use crate::message::Envelope;
use crate::system::actor_system::ActorSystem;

const RESPONSE_QUEUE: usize = 1024;
const DEFAULT_ASK_DEADLINE: Duration = Duration::from_secs(30);

/// The node's listening endpoint. One accept loop, one task per connection.
pub(crate) struct RemotingServer {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl RemotingServer {
    pub(crate) async fn start(
        system: ActorSystem,
        config: RemoteConfig,
    ) -> Result<Self, RemoteError> {
        let listener = TcpListener::bind((config.host(), config.port())).await?;
        let local_addr = listener.local_addr()?;

        let acceptor = match config.server_tls() {
            Some(tls_config) => Some(tls::build_acceptor(tls_config)?),
            None => None,
        };

        debug!(addr = %local_addr, tls = acceptor.is_some(), "remoting server listening");

        let accept_task = tokio::spawn(accept_loop(listener, acceptor, system, config));

        Ok(Self {
            local_addr,
            accept_task,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn shutdown(&self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    system: ActorSystem,
    config: RemoteConfig,
) {
    loop {
        let (tcp, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
        };
        let _ = tcp.set_nodelay(true);

        let system = system.clone();
        let config = config.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            match acceptor {
                Some(acceptor) => match acceptor.accept(tcp).await {
                    Ok(stream) => serve_connection(system, config, stream, peer).await,
                    Err(err) => {
                        warn!(peer = %peer, error = %err, "tls handshake failed");
                    }
                },
                None => serve_connection(system, config, tcp, peer).await,
            }
        });
    }
}

async fn serve_connection<S>(system: ActorSystem, config: RemoteConfig, stream: S, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut codec = LengthDelimitedCodec::new();
    codec.set_max_frame_length(config.max_frame_size());
    let framed = Framed::new(stream, codec);
    let (mut sink, mut stream) = framed.split();

    // Responses (ask replies in particular) come from concurrently spawned
    // tasks; a writer task serializes them onto the socket.
    let (response_tx, mut response_rx) = mpsc::channel::<Bytes>(RESPONSE_QUEUE);
    let write_timeout = config.write_timeout();
    let writer = tokio::spawn(async move {
        while let Some(bytes) = response_rx.recv().await {
            match timeout(write_timeout, sink.send(bytes)).await {
                Ok(Ok(())) => {}
                _ => break,
            }
        }
    });

    loop {
        let next = timeout(config.read_idle_timeout(), stream.next()).await;
        let item = match next {
            Ok(Some(item)) => item,
            Ok(None) => {
                debug!(peer = %peer, "remote connection closed");
                break;
            }
            Err(_) => {
                debug!(peer = %peer, "closing idle remote connection");
                break;
            }
        };

        let bytes = match item {
            Ok(bytes) => bytes.freeze(),
            Err(err) => {
                warn!(peer = %peer, error = %err, "remote read failed");
                break;
            }
        };

        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(peer = %peer, error = %err, "dropping malformed frame");
                continue;
            }
        };

        dispatch(&system, &config, frame, &response_tx).await;
    }

    writer.abort();
}

/// Route one inbound frame. Tells and batches run inline so arrival order
/// is delivery order; asks are answered from spawned tasks.
async fn dispatch(
    system: &ActorSystem,
    config: &RemoteConfig,
    frame: Frame,
    responses: &mpsc::Sender<Bytes>,
) {
    match frame.header.kind {
        FrameKind::Heartbeat => {
            // Receiving it already reset the idle timer.
        }
        FrameKind::Tell => {
            let Some(to) = frame.header.to.clone() else {
                warn!("tell frame without receiver");
                return;
            };
            let Some(payload) = frame.payloads.into_iter().next() else {
                warn!("tell frame without payload");
                return;
            };
            let mut env = Envelope::new(to.clone(), payload);
            if let Some(from) = frame.header.from {
                env = env.with_sender(from);
            }
            match system.local_actor(to.name()) {
                Some(target) => {
                    if let Err(err) = target.deliver(env).await {
                        debug!(receiver = %to, error = %err, "remote tell not delivered");
                    }
                }
                None => system.dead_letter(env, DeadLetterReason::NoRecipient),
            }
        }
        FrameKind::BatchTell => {
            let correlation = frame.header.correlation_id.unwrap_or(0);
            let Some(to) = frame.header.to.clone() else {
                respond(responses, config, Frame::fail(correlation, "batch without receiver", Some(0))).await;
                return;
            };
            let target = match system.local_actor(to.name()) {
                Some(target) => target,
                None => {
                    respond(
                        responses,
                        config,
                        Frame::fail(correlation, format!("no actor named '{}'", to.name()), Some(0)),
                    )
                    .await;
                    return;
                }
            };

            let mut delivered: u64 = 0;
            let mut failure: Option<String> = None;
            let from = frame.header.from.clone();
            for payload in frame.payloads {
                let mut env = Envelope::new(to.clone(), payload);
                if let Some(from) = from.clone() {
                    env = env.with_sender(from);
                }
                match target.deliver(env).await {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        failure = Some(err.to_string());
                        break;
                    }
                }
            }

            let response = match failure {
                Some(detail) => Frame::fail(correlation, detail, Some(delivered)),
                None => Frame::batch_ack(correlation, delivered),
            };
            respond(responses, config, response).await;
        }
        FrameKind::Ask => {
            let Some(correlation) = frame.header.correlation_id else {
                warn!("ask frame without correlation");
                return;
            };
            let Some(to) = frame.header.to.clone() else {
                respond(responses, config, Frame::fail(correlation, "ask without receiver", None)).await;
                return;
            };
            let Some(payload) = frame.payloads.into_iter().next() else {
                respond(responses, config, Frame::fail(correlation, "ask without payload", None)).await;
                return;
            };
            let deadline = frame
                .header
                .deadline_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_ASK_DEADLINE);

            let system = system.clone();
            let responses = responses.clone();
            let config = config.clone();
            // The local ask bridges the wire request to the coordinator; the
            // reply is written back on this connection.
            tokio::spawn(async move {
                let response = match system.local_actor(to.name()) {
                    Some(target) => match target.ask_payload(payload, deadline).await {
                        Ok(reply) => Frame::reply(correlation, reply),
                        Err(err) => Frame::fail(correlation, err.to_string(), None),
                    },
                    None => Frame::fail(correlation, format!("no actor named '{}'", to.name()), None),
                };
                respond(&responses, &config, response).await;
            });
        }
        FrameKind::Lookup => {
            let Some(correlation) = frame.header.correlation_id else {
                return;
            };
            let found = frame
                .header
                .name
                .as_deref()
                .and_then(|name| system.local_actor(name))
                .map(|actor| system.advertised_address(actor.address()));
            respond(responses, config, Frame::lookup_reply(correlation, found)).await;
        }
        FrameKind::DirPut
        | FrameKind::DirGet
        | FrameKind::DirDel
        | FrameKind::Join => {
            let correlation = frame.header.correlation_id.unwrap_or(0);
            let response = match system.cluster_engine() {
                Some(engine) => engine.handle_frame(frame).await,
                None => Frame::fail(correlation, "cluster not enabled on this node", None),
            };
            respond(responses, config, response).await;
        }
        FrameKind::Reply
        | FrameKind::Fail
        | FrameKind::BatchAck
        | FrameKind::LookupReply
        | FrameKind::DirAck
        | FrameKind::DirGetReply
        | FrameKind::JoinAck => {
            // Response kinds never originate a server-side action.
            debug!(kind = ?frame.header.kind, "ignoring response frame on server path");
        }
    }
}

async fn respond(responses: &mpsc::Sender<Bytes>, config: &RemoteConfig, frame: Frame) {
    match frame.encode(config.max_frame_size()) {
        Ok(bytes) => {
            let _ = responses.send(bytes).await;
        }
        Err(err) => warn!(error = %err, "failed to encode response frame"),
    }
}

impl Drop for RemotingServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
