//! The actor system facade.

// Layer 1: Standard library
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

// Layer 3: Internal
use super::config::SystemConfig;
use super::errors::SystemError;
use super::spawn::SpawnOptions;
use crate::actor::actor_ref::ActorRef;
use crate::actor::cell::{ActorState, CellHandle, Dispatcher};
use crate::actor::context::ActorContext;
use crate::actor::traits::Actor;
use crate::address::Address;
use crate::ask::AskCoordinator;
use crate::cluster::{ClusterEngine, Endpoint};
use crate::deadletter::{DeadLetter, DeadLetterReason, DeadLetterSink};
use crate::message::{Envelope, Message, Payload, PostStart, StopReason, Terminated};
use crate::passivation::PassivationController;
use crate::registry::Registry;
use crate::remote::{RemotingClient, RemotingServer};
use crate::snapshot::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SystemState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

struct RemotingRuntime {
    client: Arc<RemotingClient>,
    server: RemotingServer,
    advertised: Endpoint,
}

pub(crate) struct SystemInner {
    config: SystemConfig,
    registry: Registry,
    dead_letters: DeadLetterSink,
    ask: Arc<AskCoordinator>,
    passivation: Arc<PassivationController>,
    remoting: RwLock<Option<RemotingRuntime>>,
    cluster: RwLock<Option<ClusterEngine>>,
    state: AtomicU8,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// One self-contained actor system.
///
/// The handle is cheap to clone; every clone shares the same registry,
/// dead-letter sink, ask coordinator, passivation controller, and (when
/// configured) remoting endpoint and cluster engine. Several systems can
/// coexist in one process.
///
/// # Example
/// ```rust,no_run
/// use aktos_rt::prelude::*;
///
/// # struct Echo;
/// # #[async_trait::async_trait]
/// # impl Actor for Echo {
/// #     async fn receive(&mut self, _ctx: &mut ReceiveContext) -> Result<(), BoxError> { Ok(()) }
/// # }
/// # #[tokio::main]
/// # async fn main() -> Result<(), SystemError> {
/// let system = ActorSystem::new(SystemConfig::new("demo"))?;
/// system.start().await?;
///
/// let echo = system.spawn("echo", Echo).await?;
/// echo.shutdown().await?;
///
/// system.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl ActorSystem {
    /// Create a system from a validated configuration. The system accepts
    /// no work until [`ActorSystem::start`].
    pub fn new(config: SystemConfig) -> Result<Self, SystemError> {
        config.validate().map_err(SystemError::Config)?;
        Ok(Self {
            inner: Arc::new(SystemInner {
                config,
                registry: Registry::new(),
                dead_letters: DeadLetterSink::new(),
                ask: AskCoordinator::new(),
                passivation: PassivationController::new(),
                remoting: RwLock::new(None),
                cluster: RwLock::new(None),
                state: AtomicU8::new(SystemState::Created as u8),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn name(&self) -> &str {
        self.inner.config.name()
    }

    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    fn state(&self) -> SystemState {
        match self.inner.state.load(Ordering::Acquire) {
            0 => SystemState::Created,
            1 => SystemState::Running,
            2 => SystemState::Stopping,
            _ => SystemState::Stopped,
        }
    }

    /// Start background services, the remoting endpoint, and cluster
    /// membership.
    pub async fn start(&self) -> Result<(), SystemError> {
        if self
            .inner
            .state
            .compare_exchange(
                SystemState::Created as u8,
                SystemState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(SystemError::Config("system already started".into()));
        }

        {
            let mut tasks = self.inner.tasks.lock();
            tasks.push(self.inner.ask.spawn_sweeper());
            tasks.push(self.inner.passivation.spawn());
        }

        if let Some(remote_config) = self.inner.config.remote().cloned() {
            let client = Arc::new(RemotingClient::new(remote_config.clone())?);
            let server = RemotingServer::start(self.clone(), remote_config.clone()).await?;
            let advertised = Endpoint::new(remote_config.host(), server.local_addr().port());
            info!(system = self.name(), endpoint = %advertised, "remoting started");
            *self.inner.remoting.write() = Some(RemotingRuntime {
                client,
                server,
                advertised,
            });
        }

        if let Some(cluster_config) = self.inner.config.cluster().cloned() {
            // Validation guarantees both of these exist in cluster mode.
            let (client, advertised) = {
                let remoting = self.inner.remoting.read();
                let Some(rt) = remoting.as_ref() else {
                    return Err(SystemError::RemotingDisabled);
                };
                (Arc::clone(&rt.client), rt.advertised.clone())
            };
            let Some(discovery) = self.inner.config.discovery() else {
                return Err(SystemError::Config(
                    "cluster mode requires a discovery provider".into(),
                ));
            };
            let engine =
                ClusterEngine::start(cluster_config, advertised, discovery, client).await?;
            *self.inner.cluster.write() = Some(engine);
        }

        info!(system = self.name(), "actor system started");
        Ok(())
    }

    /// Stop the system: leave the cluster, stop every root actor (children
    /// follow post-order), then tear down transport and timers.
    pub async fn stop(&self) -> Result<(), SystemError> {
        match self.state() {
            SystemState::Running => {}
            SystemState::Stopped | SystemState::Stopping => return Ok(()),
            SystemState::Created => return Err(SystemError::NotStarted),
        }
        self.inner
            .state
            .store(SystemState::Stopping as u8, Ordering::Release);
        info!(system = self.name(), "actor system stopping");

        let engine = self.inner.cluster.read().clone();
        if let Some(engine) = engine {
            engine.leave().await;
        }

        let roots = self.inner.registry.roots();
        let stops = roots.iter().map(|handle| self.stop_actor(handle.address()));
        for result in join_all(stops).await {
            if let Err(err) = result {
                debug!(system = self.name(), error = %err, "root stop reported");
            }
        }

        if let Some(rt) = self.inner.remoting.write().take() {
            rt.server.shutdown();
            rt.client.shutdown();
        }
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }

        self.inner
            .state
            .store(SystemState::Stopped as u8, Ordering::Release);
        info!(system = self.name(), "actor system stopped");
        Ok(())
    }

    /// Spawn a top-level actor with default options.
    pub async fn spawn<A: Actor>(&self, name: &str, actor: A) -> Result<ActorRef, SystemError> {
        self.spawn_internal(name, actor, SpawnOptions::default(), None)
            .await
    }

    /// Spawn a top-level actor with explicit options.
    pub async fn spawn_with<A: Actor>(
        &self,
        name: &str,
        actor: A,
        options: SpawnOptions,
    ) -> Result<ActorRef, SystemError> {
        self.spawn_internal(name, actor, options, None).await
    }

    pub(crate) async fn spawn_child<A: Actor>(
        &self,
        parent: &Address,
        name: &str,
        actor: A,
        options: SpawnOptions,
    ) -> Result<ActorRef, SystemError> {
        let parent_handle = self
            .inner
            .registry
            .get_by_path(parent.path())
            .ok_or_else(|| SystemError::UnknownAddress(parent.name().to_owned()))?;
        self.spawn_internal(name, actor, options, Some(parent_handle))
            .await
    }

    async fn spawn_internal<A: Actor>(
        &self,
        name: &str,
        actor: A,
        options: SpawnOptions,
        parent: Option<Arc<CellHandle>>,
    ) -> Result<ActorRef, SystemError> {
        match self.state() {
            SystemState::Running => {}
            SystemState::Created => return Err(SystemError::NotStarted),
            _ => return Err(SystemError::ShuttingDown),
        }
        validate_actor_name(name)?;

        if let Some(parent_handle) = &parent {
            if parent_handle.has_child_named(name) {
                return Err(SystemError::NameConflict(name.to_owned()));
            }
        }

        let mut address = match &parent {
            Some(parent_handle) => parent_handle.address().child(name),
            None => Address::local(self.name(), name),
        };
        if let Some((host, port)) = self.advertised_location() {
            address = address.at(host, port);
        }

        let (sender, receiver) = options.mailbox.build();
        let strategy = options
            .supervisor
            .clone()
            .unwrap_or_else(|| self.inner.config.supervisor().clone());
        let handle = CellHandle::new(
            address.clone(),
            parent.as_ref().map(|p| p.address().clone()),
            sender,
            strategy,
            options.passivation.clone(),
        );

        // Registration is atomic and happens before pre_start is scheduled.
        self.inner
            .registry
            .register(Arc::clone(&handle))
            .map_err(|_| SystemError::NameConflict(name.to_owned()))?;

        let mut boxed: Box<dyn Actor> = Box::new(actor);
        let mut ctx = ActorContext::new(self.clone(), address.clone());
        let max_attempts = self.inner.config.actor_init_max_retries();
        let mut attempt = 0;
        loop {
            match boxed.pre_start(&mut ctx).await {
                Ok(()) => break,
                Err(source) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        self.inner.registry.remove(&address);
                        return Err(SystemError::InitFailed {
                            name: name.to_owned(),
                            source,
                        });
                    }
                    debug!(actor = %address, attempt, "pre_start failed, retrying");
                }
            }
        }

        if let Some(store) = self.snapshot_store() {
            if let Ok(Some(snapshot)) = store.load(&address).await {
                if let Err(source) = boxed.restore(snapshot, &mut ctx).await {
                    self.inner.registry.remove(&address);
                    return Err(SystemError::InitFailed {
                        name: name.to_owned(),
                        source,
                    });
                }
            }
        }

        // PostStart is the first envelope the cell observes.
        if let Ok(payload) = Payload::encode(&PostStart) {
            let _ = handle.enqueue_control(Envelope::new(address.clone(), payload));
        }
        handle.set_state(ActorState::Running);

        if let Some(parent_handle) = &parent {
            parent_handle.add_child(address.clone());
            self.inner
                .registry
                .watch(parent_handle.address().clone(), address.clone());
        }
        self.inner.passivation.register(Arc::clone(&handle));

        if let Some(engine) = self.cluster_engine() {
            if let Err(err) = engine
                .put_actor(name, std::any::type_name::<A>(), Default::default())
                .await
            {
                self.inner.registry.remove(&address);
                self.inner.passivation.deregister(&address);
                if let Some(parent_handle) = &parent {
                    parent_handle.remove_child(&address);
                }
                return Err(err.into());
            }
        }

        Dispatcher::new(
            self.clone(),
            Arc::clone(&handle),
            boxed,
            receiver,
        )
        .spawn();

        debug!(actor = %address, "spawned");
        Ok(ActorRef::local(self.clone(), handle))
    }

    /// Stop one actor: flip to `Stopping`, enqueue the sentinel, await the
    /// drain. Past the window the dispatcher is force released and the
    /// remaining envelopes become dead letters.
    pub async fn stop_actor(&self, address: &Address) -> Result<(), SystemError> {
        let handle = self
            .inner
            .registry
            .get_any_by_path(address.path())
            .or_else(|| self.inner.registry.get_any_by_name(address.name()))
            .ok_or_else(|| SystemError::UnknownAddress(address.name().to_owned()))?;

        if handle.state() == ActorState::Stopped {
            return Err(SystemError::AlreadyStopped(address.clone()));
        }

        if handle.begin_stopping() {
            let _ = handle.enqueue_poison_pill(false);
        }

        let window = self.inner.config.shutdown_timeout();
        if timeout(window, handle.wait_terminated()).await.is_ok() {
            return Ok(());
        }

        warn!(actor = %address, "drain window exceeded, force releasing dispatcher");
        if let Some(task) = handle.take_task() {
            task.abort();
        }
        for env in handle.sender().drain_remaining() {
            if !env.payload().is_system() {
                self.dead_letter(env, DeadLetterReason::Drained);
            }
        }
        self.cell_stopped(&handle, StopReason::Shutdown).await;
        handle.mark_stopped();
        Err(SystemError::ShutdownDeadline(window))
    }

    /// Post-stop bookkeeping shared by the dispatcher and the force path:
    /// registry removal first, then `Terminated` fan-out to watchers.
    pub(crate) async fn cell_stopped(&self, handle: &Arc<CellHandle>, reason: StopReason) {
        let address = handle.address();
        self.inner.registry.remove(address);
        self.inner.passivation.deregister(address);

        if let Some(engine) = self.cluster_engine() {
            engine.remove_actor(address.name()).await;
        }

        if let Some(parent) = handle.parent() {
            if let Some(parent_handle) = self.inner.registry.get_any_by_path(parent.path()) {
                parent_handle.remove_child(address);
            }
        }

        let watchers = self.inner.registry.take_watchers(address);
        if watchers.is_empty() {
            return;
        }
        let Ok(payload) = Payload::encode(&Terminated {
            address: address.clone(),
            reason,
        }) else {
            return;
        };
        for watcher in watchers {
            if let Some(watcher_handle) = self.inner.registry.get_any_by_name(watcher.name()) {
                let env = Envelope::new(watcher.clone(), payload.clone())
                    .with_sender(address.clone());
                let _ = watcher_handle.enqueue_control(env);
            }
        }
    }

    /// Send to an actor reference.
    pub async fn tell<M: Message>(
        &self,
        target: &ActorRef,
        message: &M,
    ) -> Result<(), SystemError> {
        target.tell(message).await
    }

    /// Request/response against an actor reference.
    pub async fn ask<M: Message>(
        &self,
        target: &ActorRef,
        message: &M,
        timeout: Duration,
    ) -> Result<Payload, SystemError> {
        target.ask(message, timeout).await
    }

    /// Send by name. Resolves locally first, then through the cluster
    /// directory.
    pub async fn send_async<M: Message>(
        &self,
        name: &str,
        message: &M,
    ) -> Result<(), SystemError> {
        let target = self.lookup(name).await?;
        target.tell(message).await
    }

    /// Resolve a name to a reference: the local registry first, then the
    /// replicated directory (yielding a remote stub).
    pub async fn lookup(&self, name: &str) -> Result<ActorRef, SystemError> {
        if let Some(handle) = self.inner.registry.get_by_name(name) {
            return Ok(ActorRef::local(self.clone(), handle));
        }
        if let Some(engine) = self.cluster_engine() {
            if let Some(entry) = engine.whereis(name).await? {
                let address =
                    Address::remote(self.name(), entry.node.host.clone(), entry.node.port, name);
                return Ok(ActorRef::remote(self.clone(), address));
            }
        }
        Err(SystemError::UnknownAddress(name.to_owned()))
    }

    /// Local-only resolution.
    pub fn actor_of(&self, name: &str) -> Option<ActorRef> {
        self.inner
            .registry
            .get_by_name(name)
            .map(|handle| ActorRef::local(self.clone(), handle))
    }

    /// Resolve a name on an explicit remote node.
    pub async fn remote_lookup(
        &self,
        host: &str,
        port: u16,
        name: &str,
    ) -> Result<Option<Address>, SystemError> {
        let client = self.remoting_client()?;
        client
            .lookup(host, port, name)
            .await
            .map_err(SystemError::from)
    }

    /// Subscribe to dead letters.
    pub fn subscribe_dead_letters(&self) -> broadcast::Receiver<DeadLetter> {
        self.inner.dead_letters.subscribe()
    }

    pub fn dead_letter_count(&self) -> u64 {
        self.inner.dead_letters.count()
    }

    /// Number of registered actors.
    pub fn actor_count(&self) -> usize {
        self.inner.registry.len()
    }

    // ---- crate-internal surface -------------------------------------------

    pub(crate) fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub(crate) fn coordinator(&self) -> &Arc<AskCoordinator> {
        &self.inner.ask
    }

    pub(crate) fn dead_letter(&self, env: Envelope, reason: DeadLetterReason) {
        self.inner.dead_letters.publish(env, reason);
    }

    pub(crate) fn snapshot_store(&self) -> Option<Arc<dyn SnapshotStore>> {
        self.inner.config.snapshots()
    }

    pub(crate) fn remoting_client(&self) -> Result<Arc<RemotingClient>, SystemError> {
        self.inner
            .remoting
            .read()
            .as_ref()
            .map(|rt| Arc::clone(&rt.client))
            .ok_or(SystemError::RemotingDisabled)
    }

    pub(crate) fn cluster_engine(&self) -> Option<ClusterEngine> {
        self.inner.cluster.read().clone()
    }

    pub(crate) fn local_actor(&self, name: &str) -> Option<ActorRef> {
        self.actor_of(name)
    }

    fn advertised_location(&self) -> Option<(String, u16)> {
        self.inner
            .remoting
            .read()
            .as_ref()
            .map(|rt| (rt.advertised.host.clone(), rt.advertised.port))
    }

    /// Pin a local address to this node's advertised endpoint.
    pub(crate) fn advertised_address(&self, address: &Address) -> Address {
        match self.advertised_location() {
            Some((host, port)) if address.is_local() => address.clone().at(host, port),
            _ => address.clone(),
        }
    }

    /// Map an address to a reference: local cells directly, anything else
    /// through a remote stub.
    pub(crate) async fn resolve_address(&self, address: &Address) -> Result<ActorRef, SystemError> {
        let local = address.is_local()
            || self
                .advertised_location()
                .is_some_and(|(host, port)| address.location() == Some((host.as_str(), port)));
        if local {
            return self
                .inner
                .registry
                .get_by_name(address.name())
                .map(|handle| ActorRef::local(self.clone(), handle))
                .ok_or_else(|| SystemError::UnknownAddress(address.name().to_owned()));
        }
        Ok(ActorRef::remote(self.clone(), address.clone()))
    }
}

fn validate_actor_name(name: &str) -> Result<(), SystemError> {
    if name.is_empty()
        || name.contains('/')
        || name.starts_with('$')
        || !name.chars().all(|c| c.is_ascii_graphic())
    {
        return Err(SystemError::Config(format!("invalid actor name '{name}'")));
    }
    Ok(())
}
