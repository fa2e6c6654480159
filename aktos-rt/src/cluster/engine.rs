//! The cluster engine: membership, liveness, and quorum directory access.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use super::config::ClusterConfig;
use super::directory::{Directory, DirectoryEntry};
use super::discovery::{DiscoveryProvider, Endpoint};
use super::error::ClusterError;
use super::ring::PartitionRing;
use crate::message::{Message, Payload};
use crate::remote::client::RemotingClient;
use crate::remote::frame::{Frame, FrameKind};

const JOIN_RETRY_INTERVAL: Duration = Duration::from_millis(500);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const HEARTBEAT_JITTER_MS: u64 = 250;
const LIVENESS_WINDOW: Duration = Duration::from_secs(3);

/// Peer join / liveness announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PeerInfo {
    pub node: Endpoint,
}

impl Message for PeerInfo {
    const TYPE_URL: &'static str = "aktos.cluster/PeerInfo";
}

/// A responder's peer view, returned on join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PeerList {
    pub peers: Vec<Endpoint>,
}

impl Message for PeerList {
    const TYPE_URL: &'static str = "aktos.cluster/PeerList";
}

/// Membership state machine of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum MembershipState {
    Bootstrapping = 0,
    Joined = 1,
    Running = 2,
    Leaving = 3,
    Left = 4,
}

impl MembershipState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Bootstrapping,
            1 => Self::Joined,
            2 => Self::Running,
            3 => Self::Leaving,
            _ => Self::Left,
        }
    }
}

struct PeerState {
    endpoint: Endpoint,
    last_seen: Instant,
}

struct EngineInner {
    config: ClusterConfig,
    node: Endpoint,
    node_id: String,
    discovery: Arc<dyn DiscoveryProvider>,
    client: Arc<RemotingClient>,
    directory: Directory,
    ring: RwLock<PartitionRing>,
    peers: DashMap<String, PeerState>,
    state: AtomicU8,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Cheap clonable handle on the engine.
#[derive(Clone)]
pub(crate) struct ClusterEngine {
    inner: Arc<EngineInner>,
}

impl ClusterEngine {
    /// Bootstrap membership: discover peers, join until the minimum quorum
    /// is live (self included), then start liveness and anti-entropy tasks.
    pub(crate) async fn start(
        config: ClusterConfig,
        node: Endpoint,
        discovery: Arc<dyn DiscoveryProvider>,
        client: Arc<RemotingClient>,
    ) -> Result<Self, ClusterError> {
        config.validate().map_err(ClusterError::Config)?;

        let node_id = node.to_string();
        let inner = Arc::new(EngineInner {
            ring: RwLock::new(PartitionRing::new(config.partitions_count(), config.hasher())),
            directory: Directory::new(config.table_size()),
            config,
            node,
            node_id,
            discovery,
            client,
            peers: DashMap::new(),
            state: AtomicU8::new(MembershipState::Bootstrapping as u8),
            tasks: Mutex::new(Vec::new()),
        });
        let engine = Self { inner };

        engine.inner.discovery.initialize().await?;

        let deadline = Instant::now() + engine.inner.config.bootstrap_timeout();
        let required = engine.inner.config.minimum_peers_quorum();
        loop {
            let endpoints = engine.inner.discovery.discover_peers().await?;
            for endpoint in endpoints {
                if endpoint == engine.inner.node {
                    continue;
                }
                if let Err(err) = engine.join_peer(&endpoint).await {
                    debug!(peer = %endpoint, error = %err, "join attempt failed");
                }
            }

            let live = 1 + engine.live_peer_count();
            if live >= required as usize {
                break;
            }
            if Instant::now() >= deadline {
                engine.set_state(MembershipState::Left);
                return Err(ClusterError::QuorumUnmet {
                    required,
                    acked: live as u32,
                });
            }
            tokio::time::sleep(JOIN_RETRY_INTERVAL).await;
        }

        engine.set_state(MembershipState::Joined);
        engine.rebuild_ring();
        engine.spawn_background_tasks();
        engine.set_state(MembershipState::Running);
        info!(node = %engine.inner.node_id, peers = engine.live_peer_count(), "cluster running");
        Ok(engine)
    }

    pub(crate) fn state(&self) -> MembershipState {
        MembershipState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: MembershipState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    fn live_peer_count(&self) -> usize {
        self.inner.peers.len()
    }

    pub(crate) fn directory_len(&self) -> usize {
        self.inner.directory.len()
    }

    fn rebuild_ring(&self) {
        let mut nodes: Vec<String> = Vec::with_capacity(1 + self.inner.peers.len());
        nodes.push(self.inner.node_id.clone());
        for peer in self.inner.peers.iter() {
            nodes.push(peer.key().clone());
        }
        nodes.sort();
        self.inner.ring.write().set_nodes(&nodes);
    }

    fn endpoint_for(&self, node_id: &str) -> Option<Endpoint> {
        if node_id == self.inner.node_id {
            return Some(self.inner.node.clone());
        }
        self.inner
            .peers
            .get(node_id)
            .map(|peer| peer.endpoint.clone())
    }

    async fn join_peer(&self, endpoint: &Endpoint) -> Result<(), ClusterError> {
        let payload = Payload::encode(&PeerInfo {
            node: self.inner.node.clone(),
        })?;
        let frame = Frame::cluster(FrameKind::Join, self.inner.client.correlation(), Some(payload));
        let response = self
            .inner
            .client
            .request(
                &endpoint.host,
                endpoint.port,
                frame,
                self.inner.config.write_timeout(),
            )
            .await?;

        if response.header.kind != FrameKind::JoinAck {
            return Err(ClusterError::Transport(crate::remote::RemoteError::Rejected(
                response.header.error.unwrap_or_else(|| "join rejected".into()),
            )));
        }

        self.observe_peer(endpoint.clone());
        if let Some(list) = response.payload().and_then(|p| p.decode::<PeerList>().ok()) {
            for peer in list.peers {
                if peer != self.inner.node {
                    self.observe_peer(peer);
                }
            }
        }
        Ok(())
    }

    fn observe_peer(&self, endpoint: Endpoint) {
        let node_id = endpoint.to_string();
        let new = !self.inner.peers.contains_key(&node_id);
        self.inner.peers.insert(
            node_id,
            PeerState {
                endpoint,
                last_seen: Instant::now(),
            },
        );
        if new && self.state() >= MembershipState::Joined {
            self.rebuild_ring();
        }
    }

    fn spawn_background_tasks(&self) {
        let heartbeat = {
            let engine = self.clone();
            tokio::spawn(async move { engine.heartbeat_loop().await })
        };
        let sync = {
            let engine = self.clone();
            tokio::spawn(async move { engine.sync_loop().await })
        };
        self.inner.tasks.lock().extend([heartbeat, sync]);
    }

    async fn heartbeat_loop(&self) {
        loop {
            let jitter = {
                let mut rng = rand::thread_rng();
                Duration::from_millis(rng.gen_range(0..HEARTBEAT_JITTER_MS))
            };
            tokio::time::sleep(HEARTBEAT_INTERVAL + jitter).await;

            let peers: Vec<Endpoint> = self
                .inner
                .peers
                .iter()
                .map(|p| p.value().endpoint.clone())
                .collect();
            for endpoint in peers {
                if let Err(err) = self.join_peer(&endpoint).await {
                    debug!(peer = %endpoint, error = %err, "heartbeat failed");
                }
            }

            // Prune peers that have gone silent.
            let Some(cutoff) = Instant::now().checked_sub(LIVENESS_WINDOW) else {
                continue;
            };
            let before = self.inner.peers.len();
            self.inner.peers.retain(|_, peer| peer.last_seen >= cutoff);
            if self.inner.peers.len() != before {
                warn!(
                    dropped = before - self.inner.peers.len(),
                    "peers went silent, rebuilding ring"
                );
                self.rebuild_ring();
            }
        }
    }

    /// Anti-entropy: periodically re-push entries this node owns to their
    /// replicas.
    async fn sync_loop(&self) {
        loop {
            tokio::time::sleep(self.inner.config.cache_sync_interval()).await;
            let entries = self.inner.directory.entries_for_node(&self.inner.node);
            for entry in entries {
                let owners = self
                    .inner
                    .ring
                    .read()
                    .owners_for_key(&entry.name, self.inner.config.replica_count() as usize);
                for owner in owners {
                    if owner == self.inner.node_id {
                        continue;
                    }
                    let Some(endpoint) = self.endpoint_for(&owner) else {
                        continue;
                    };
                    let Ok(payload) = Payload::encode(&entry) else {
                        continue;
                    };
                    let frame = Frame::cluster(
                        FrameKind::DirPut,
                        self.inner.client.correlation(),
                        Some(payload),
                    );
                    let _ = self
                        .inner
                        .client
                        .request(
                            &endpoint.host,
                            endpoint.port,
                            frame,
                            self.inner.config.write_timeout(),
                        )
                        .await;
                }
            }
        }
    }

    /// Publish `(name -> this node)` with quorum replication. On a missed
    /// quorum every staged copy is withdrawn, so no partially-visible state
    /// survives.
    pub(crate) async fn put_actor(
        &self,
        name: &str,
        kind: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), ClusterError> {
        self.ensure_serving()?;
        let entry = DirectoryEntry {
            name: name.to_owned(),
            node: self.inner.node.clone(),
            kind: kind.to_owned(),
            metadata,
            version: self.inner.directory.next_version(),
        };

        let replica_count = self.inner.config.replica_count() as usize;
        let (partition, owners) = {
            let ring = self.inner.ring.read();
            let partition = ring.partition_for(name);
            (partition, ring.owners(partition, replica_count))
        };
        if owners.is_empty() {
            return Err(ClusterError::PartitionUnavailable(partition));
        }

        let required = self.inner.config.write_quorum();
        let mut acked: u32 = 0;
        let mut applied_local = false;
        let mut acked_remotes: Vec<Endpoint> = Vec::new();

        for owner in owners {
            if owner == self.inner.node_id {
                match self.inner.directory.apply(entry.clone()) {
                    Ok(()) => {
                        acked += 1;
                        applied_local = true;
                    }
                    Err(newer) => {
                        return Err(ClusterError::StaleView {
                            name: name.to_owned(),
                            version: entry.version,
                            newer,
                        });
                    }
                }
                continue;
            }
            let Some(endpoint) = self.endpoint_for(&owner) else {
                continue;
            };
            let payload = Payload::encode(&entry)?;
            let frame = Frame::cluster(
                FrameKind::DirPut,
                self.inner.client.correlation(),
                Some(payload),
            );
            match self
                .inner
                .client
                .request(
                    &endpoint.host,
                    endpoint.port,
                    frame,
                    self.inner.config.write_timeout(),
                )
                .await
            {
                Ok(response) if response.header.kind == FrameKind::DirAck => {
                    acked += 1;
                    acked_remotes.push(endpoint);
                }
                Ok(response) => {
                    debug!(
                        peer = %endpoint,
                        error = response.header.error.as_deref().unwrap_or("unknown"),
                        "replica rejected directory write"
                    );
                }
                Err(err) => {
                    debug!(peer = %endpoint, error = %err, "replica write failed");
                }
            }
        }

        if acked < required {
            // Withdraw staged copies before surfacing the failure.
            if applied_local {
                self.inner.directory.remove(name);
            }
            for endpoint in acked_remotes {
                let frame = Frame::cluster_named(
                    FrameKind::DirDel,
                    self.inner.client.correlation(),
                    name,
                );
                let _ = self
                    .inner
                    .client
                    .request(
                        &endpoint.host,
                        endpoint.port,
                        frame,
                        self.inner.config.write_timeout(),
                    )
                    .await;
            }
            warn!(name, required, acked, "directory write missed quorum");
            return Err(ClusterError::QuorumUnmet { required, acked });
        }
        Ok(())
    }

    /// Withdraw `name` from the directory, best effort.
    pub(crate) async fn remove_actor(&self, name: &str) {
        self.inner.directory.remove(name);
        let replica_count = self.inner.config.replica_count() as usize;
        let owners = self.inner.ring.read().owners_for_key(name, replica_count);
        for owner in owners {
            if owner == self.inner.node_id {
                continue;
            }
            let Some(endpoint) = self.endpoint_for(&owner) else {
                continue;
            };
            let frame =
                Frame::cluster_named(FrameKind::DirDel, self.inner.client.correlation(), name);
            let _ = self
                .inner
                .client
                .request(
                    &endpoint.host,
                    endpoint.port,
                    frame,
                    self.inner.config.write_timeout(),
                )
                .await;
        }
    }

    /// Quorum read: gather up to `read_quorum` replica answers and return
    /// the entry with the highest version.
    pub(crate) async fn whereis(&self, name: &str) -> Result<Option<DirectoryEntry>, ClusterError> {
        self.ensure_serving()?;
        let replica_count = self.inner.config.replica_count() as usize;
        let owners = self.inner.ring.read().owners_for_key(name, replica_count);
        let required = self.inner.config.read_quorum();

        let mut responses: u32 = 0;
        let mut best: Option<DirectoryEntry> = None;

        for owner in owners {
            if responses >= required {
                break;
            }
            if owner == self.inner.node_id {
                // Lock-free local snapshot.
                merge_best(&mut best, self.inner.directory.get(name));
                responses += 1;
                continue;
            }
            let Some(endpoint) = self.endpoint_for(&owner) else {
                continue;
            };
            let frame =
                Frame::cluster_named(FrameKind::DirGet, self.inner.client.correlation(), name);
            match self
                .inner
                .client
                .request(
                    &endpoint.host,
                    endpoint.port,
                    frame,
                    self.inner.config.read_timeout(),
                )
                .await
            {
                Ok(response) if response.header.kind == FrameKind::DirGetReply => {
                    merge_best(
                        &mut best,
                        response.payload().and_then(|p| p.decode::<DirectoryEntry>().ok()),
                    );
                    responses += 1;
                }
                Ok(_) | Err(_) => {}
            }
        }

        if responses < required {
            return Err(ClusterError::QuorumUnmet {
                required,
                acked: responses,
            });
        }
        Ok(best)
    }

    fn ensure_serving(&self) -> Result<(), ClusterError> {
        match self.state() {
            MembershipState::Joined | MembershipState::Running => Ok(()),
            other => Err(ClusterError::NotRunning(other)),
        }
    }

    /// Server-side handler for inbound cluster frames.
    pub(crate) async fn handle_frame(&self, frame: Frame) -> Frame {
        let correlation = frame.correlation_id().unwrap_or(0);
        match frame.header.kind {
            FrameKind::DirPut => {
                let Some(entry) = frame.payload().and_then(|p| p.decode::<DirectoryEntry>().ok())
                else {
                    return Frame::fail(correlation, "malformed directory entry", None);
                };
                let version = entry.version;
                let name = entry.name.clone();
                match self.inner.directory.apply(entry) {
                    Ok(()) => Frame::cluster(FrameKind::DirAck, correlation, None),
                    Err(newer) => Frame::fail(
                        correlation,
                        format!("stale view of '{name}': version {version} is behind {newer}"),
                        None,
                    ),
                }
            }
            FrameKind::DirGet => {
                let entry = frame
                    .header
                    .name
                    .as_deref()
                    .and_then(|name| self.inner.directory.get(name));
                let payload = entry.and_then(|e| Payload::encode(&e).ok());
                Frame::cluster(FrameKind::DirGetReply, correlation, payload)
            }
            FrameKind::DirDel => {
                if let Some(name) = frame.header.name.as_deref() {
                    self.inner.directory.remove(name);
                }
                Frame::cluster(FrameKind::DirAck, correlation, None)
            }
            FrameKind::Join => {
                if let Some(info) = frame.payload().and_then(|p| p.decode::<PeerInfo>().ok()) {
                    self.observe_peer(info.node);
                }
                let mut peers = vec![self.inner.node.clone()];
                peers.extend(self.inner.peers.iter().map(|p| p.value().endpoint.clone()));
                let payload = Payload::encode(&PeerList { peers }).ok();
                Frame::cluster(FrameKind::JoinAck, correlation, payload)
            }
            _ => Frame::fail(correlation, "unsupported cluster frame", None),
        }
    }

    /// Leave the cluster: withdraw owned entries, deregister discovery,
    /// stop background tasks. Withdrawal is bounded by the configured
    /// cluster shutdown timeout.
    pub(crate) async fn leave(&self) {
        self.set_state(MembershipState::Leaving);
        let withdrawal = async {
            let owned = self.inner.directory.entries_for_node(&self.inner.node);
            for entry in owned {
                self.remove_actor(&entry.name).await;
            }
        };
        if tokio::time::timeout(self.inner.config.shutdown_timeout(), withdrawal)
            .await
            .is_err()
        {
            warn!("cluster withdrawal exceeded the shutdown timeout");
        }
        if let Err(err) = self.inner.discovery.deregister().await {
            debug!(error = %err, "discovery deregistration failed");
        }
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        self.set_state(MembershipState::Left);
        info!(node = %self.inner.node_id, "left cluster");
    }
}

fn merge_best(best: &mut Option<DirectoryEntry>, candidate: Option<DirectoryEntry>) {
    if let Some(entry) = candidate {
        match best {
            Some(current) if current.version >= entry.version => {}
            _ => *best = Some(entry),
        }
    }
}
