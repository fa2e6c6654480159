//! Actor cells and the dispatcher loop.
//!
//! A cell owns everything that makes an actor live: its mailbox, its
//! dispatcher task, its lifecycle state, and its position in the
//! supervision tree. The [`CellHandle`] is the shared, cheaply-clonable
//! view; the [`Dispatcher`] is the single consumer task that drives the
//! behavior.

// Layer 1: Standard library imports
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::actor_ref::ActorRef;
use super::context::{ActorContext, ReceiveContext};
use super::traits::Actor;
use crate::address::Address;
use crate::deadletter::DeadLetterReason;
use crate::mailbox::{MailboxError, MailboxReceiver, MailboxSender};
use crate::message::{Envelope, Escalated, Message, Payload, PoisonPill, StopReason};
use crate::message::envelope::PASSIVATION_HEADER;
use crate::passivation::{PassivationStrategy, PassivationView};
use crate::supervisor::{Directive, FailureCause, SupervisorStrategy};
use crate::system::actor_system::ActorSystem;
use crate::system::errors::SystemError;

/// Lifecycle state of a cell.
///
/// A cell is reachable from the registry only while in one of the first
/// four states. The `Running -> Stopping` transition happens exactly once,
/// whichever of passivation or explicit shutdown wins the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ActorState {
    Starting = 0,
    Running = 1,
    Suspended = 2,
    Restarting = 3,
    Stopping = 4,
    Stopped = 5,
}

impl ActorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Suspended,
            3 => Self::Restarting,
            4 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Shared runtime handle of a cell.
pub(crate) struct CellHandle {
    address: Address,
    parent: Option<Address>,
    sender: MailboxSender,
    state: AtomicU8,
    started_at: Instant,
    last_message_at: Mutex<Instant>,
    message_count: AtomicU64,
    children: Mutex<Vec<Address>>,
    strategy: SupervisorStrategy,
    passivation: PassivationStrategy,
    pill_pending: AtomicBool,
    terminated: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CellHandle {
    pub(crate) fn new(
        address: Address,
        parent: Option<Address>,
        sender: MailboxSender,
        strategy: SupervisorStrategy,
        passivation: PassivationStrategy,
    ) -> Arc<Self> {
        Arc::new(Self {
            address,
            parent,
            sender,
            state: AtomicU8::new(ActorState::Starting as u8),
            started_at: Instant::now(),
            last_message_at: Mutex::new(Instant::now()),
            message_count: AtomicU64::new(0),
            children: Mutex::new(Vec::new()),
            strategy,
            passivation,
            pill_pending: AtomicBool::new(false),
            terminated: Notify::new(),
            task: Mutex::new(None),
        })
    }

    pub(crate) fn address(&self) -> &Address {
        &self.address
    }

    pub(crate) fn parent(&self) -> Option<&Address> {
        self.parent.as_ref()
    }

    pub(crate) fn state(&self) -> ActorState {
        ActorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ActorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn is_reachable(&self) -> bool {
        self.state() <= ActorState::Restarting
    }

    /// Transition into `Stopping`, once. Returns false when the cell was
    /// already stopping or stopped.
    pub(crate) fn begin_stopping(&self) -> bool {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current >= ActorState::Stopping as u8 {
                return false;
            }
            if self
                .state
                .compare_exchange(
                    current,
                    ActorState::Stopping as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    pub(crate) fn mark_stopped(&self) {
        self.set_state(ActorState::Stopped);
        self.terminated.notify_waiters();
    }

    /// Await the transition to `Stopped`.
    pub(crate) async fn wait_terminated(&self) {
        loop {
            let notified = self.terminated.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state() == ActorState::Stopped {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn strategy(&self) -> &SupervisorStrategy {
        &self.strategy
    }

    pub(crate) fn passivation(&self) -> &PassivationStrategy {
        &self.passivation
    }

    pub(crate) fn sender(&self) -> &MailboxSender {
        &self.sender
    }

    pub(crate) fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    fn record_dispatch(&self) {
        self.message_count.fetch_add(1, Ordering::Relaxed);
        *self.last_message_at.lock() = Instant::now();
    }

    fn touch(&self) {
        *self.last_message_at.lock() = Instant::now();
    }

    pub(crate) fn passivation_view(&self) -> PassivationView {
        let now = Instant::now();
        PassivationView {
            idle: now.duration_since(*self.last_message_at.lock()),
            message_count: self.message_count(),
            age: now.duration_since(self.started_at),
        }
    }

    pub(crate) fn mark_pill_pending(&self) -> bool {
        self.pill_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn clear_pill_pending(&self) {
        self.pill_pending.store(false, Ordering::Release);
    }

    /// Enqueue a user envelope. Cells at or past `Stopping` reject with a
    /// dead-letter error; bounded mailboxes surface `Full`.
    pub(crate) fn enqueue_user(&self, env: Envelope) -> Result<(), SystemError> {
        if self.state() >= ActorState::Stopping {
            return Err(SystemError::DeadLetter(self.address.clone()));
        }
        // The pill re-check reads this: traffic accepted before the pill is
        // dequeued rescues the cell.
        self.touch();
        self.sender.enqueue(env).map_err(|err| match err {
            MailboxError::Closed => SystemError::DeadLetter(self.address.clone()),
            full @ MailboxError::Full { .. } => SystemError::Mailbox(full),
        })
    }

    /// Enqueue a control envelope, bypassing the `Stopping` gate (the stop
    /// sequence itself relies on this).
    pub(crate) fn enqueue_control(&self, env: Envelope) -> Result<(), MailboxError> {
        self.sender.enqueue(env)
    }

    fn pill_payload() -> Payload {
        Payload::encode(&PoisonPill)
            .unwrap_or_else(|_| Payload::from_parts(PoisonPill::TYPE_URL, Bytes::from_static(b"null")))
    }

    /// Enqueue the terminal sentinel.
    pub(crate) fn enqueue_poison_pill(&self, passivation: bool) -> Result<(), MailboxError> {
        let mut env = Envelope::new(self.address.clone(), Self::pill_payload());
        if passivation {
            env = env.with_header(PASSIVATION_HEADER, "1");
        }
        self.enqueue_control(env)
    }

    pub(crate) fn add_child(&self, child: Address) {
        self.children.lock().push(child);
    }

    pub(crate) fn remove_child(&self, child: &Address) {
        self.children.lock().retain(|c| c != child);
    }

    pub(crate) fn children(&self) -> Vec<Address> {
        self.children.lock().clone()
    }

    pub(crate) fn has_child_named(&self, name: &str) -> bool {
        self.children.lock().iter().any(|c| c.name() == name)
    }

    pub(crate) fn attach_task(&self, task: JoinHandle<()>) {
        *self.task.lock() = Some(task);
    }

    pub(crate) fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task.lock().take()
    }
}

/// Outcome of handling one envelope.
enum LoopAction {
    Continue,
    Stop(StopReason),
}

/// The single consumer loop of a cell.
pub(crate) struct Dispatcher {
    system: ActorSystem,
    handle: Arc<CellHandle>,
    actor: Box<dyn Actor>,
    receiver: MailboxReceiver,
    restarts: Vec<Instant>,
}

impl Dispatcher {
    pub(crate) fn new(
        system: ActorSystem,
        handle: Arc<CellHandle>,
        actor: Box<dyn Actor>,
        receiver: MailboxReceiver,
    ) -> Self {
        Self {
            system,
            handle,
            actor,
            receiver,
            restarts: Vec::new(),
        }
    }

    /// Start the dispatcher task. The cell must already be `Running`.
    pub(crate) fn spawn(self) {
        let handle = Arc::clone(&self.handle);
        let task = tokio::spawn(self.run());
        handle.attach_task(task);
    }

    async fn run(mut self) {
        let reason = self.message_loop().await;
        self.finish(reason).await;
    }

    async fn message_loop(&mut self) -> StopReason {
        loop {
            let Some(env) = self.receiver.dequeue().await else {
                // Mailbox closed underneath us: force release.
                return StopReason::Shutdown;
            };

            if env.payload().is::<PoisonPill>() {
                if env.is_passivation() {
                    let view = self.handle.passivation_view();
                    if !self.handle.passivation().due(&view, Instant::now()) {
                        // Traffic arrived after the pill was queued.
                        self.handle.clear_pill_pending();
                        continue;
                    }
                    if !self.handle.begin_stopping() {
                        return StopReason::Shutdown;
                    }
                    return StopReason::Passivated;
                }
                // Explicit shutdown already transitioned the state.
                self.handle.begin_stopping();
                return StopReason::Shutdown;
            }

            if let Ok(escalated) = env.payload().decode::<Escalated>() {
                let cause = FailureCause::Escalated {
                    child: escalated.child,
                    message: escalated.cause,
                };
                match self.on_failure(cause).await {
                    LoopAction::Continue => continue,
                    LoopAction::Stop(reason) => return reason,
                }
            }

            if !env.payload().is_system() {
                self.handle.record_dispatch();
            }

            match self.deliver(env).await {
                Ok(()) => {}
                Err(cause) => match self.on_failure(cause).await {
                    LoopAction::Continue => {}
                    LoopAction::Stop(reason) => return reason,
                },
            }
        }
    }

    /// Invoke the behavior, trapping both error returns and panics.
    async fn deliver(&mut self, env: Envelope) -> Result<(), FailureCause> {
        let mut ctx = ReceiveContext::new(
            self.system.clone(),
            ActorRef::local(self.system.clone(), Arc::clone(&self.handle)),
            env,
        );

        let outcome = AssertUnwindSafe(self.actor.receive(&mut ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                if ctx.take_unhandled() {
                    self.system
                        .dead_letter(ctx.into_envelope(), DeadLetterReason::Unhandled);
                }
                Ok(())
            }
            Ok(Err(err)) => Err(FailureCause::Error(Arc::new(err))),
            Err(panic) => Err(FailureCause::Panic(panic_message(panic))),
        }
    }

    async fn on_failure(&mut self, cause: FailureCause) -> LoopAction {
        self.handle.set_state(ActorState::Suspended);
        warn!(actor = %self.handle.address(), cause = %cause, "actor failure");

        let mut directive = self.handle.strategy().decide(&cause);
        if directive == Directive::Restart && !self.restart_allowed() {
            warn!(actor = %self.handle.address(), "restart budget exhausted");
            directive = Directive::Stop;
        }

        match directive {
            Directive::Resume => {
                self.handle.set_state(ActorState::Running);
                LoopAction::Continue
            }
            Directive::Restart => match self.restart().await {
                Ok(()) => LoopAction::Continue,
                Err(err) => {
                    warn!(actor = %self.handle.address(), error = %err, "restart failed");
                    LoopAction::Stop(StopReason::Failed)
                }
            },
            Directive::Stop => LoopAction::Stop(StopReason::Failed),
            Directive::Escalate => {
                self.escalate(&cause);
                LoopAction::Stop(StopReason::Failed)
            }
        }
    }

    fn restart_allowed(&mut self) -> bool {
        let window = self.handle.strategy().retry_window();
        let now = Instant::now();
        self.restarts
            .retain(|at| now.duration_since(*at) <= window);
        if self.restarts.len() >= self.handle.strategy().max_retries() as usize {
            return false;
        }
        self.restarts.push(now);
        true
    }

    /// Re-initialize the behavior in place. The mailbox is retained.
    async fn restart(&mut self) -> Result<(), crate::supervisor::BoxError> {
        self.handle.set_state(ActorState::Restarting);
        debug!(actor = %self.handle.address(), "restarting");

        self.stop_children().await;

        let mut ctx = ActorContext::new(self.system.clone(), self.handle.address().clone());
        if let Err(err) = self.actor.post_stop(&mut ctx).await {
            warn!(actor = %self.handle.address(), error = %err, "post_stop failed during restart");
        }
        self.actor.pre_start(&mut ctx).await?;

        self.handle.set_state(ActorState::Running);
        Ok(())
    }

    fn escalate(&self, cause: &FailureCause) {
        let Some(parent) = self.handle.parent() else {
            return;
        };
        let Some(parent_handle) = self.system.registry().get_by_path(parent.path()) else {
            return;
        };
        let escalated = Escalated {
            child: self.handle.address().clone(),
            cause: cause.message(),
        };
        if let Ok(payload) = Payload::encode(&escalated) {
            let env = Envelope::new(parent.clone(), payload);
            let _ = parent_handle.enqueue_control(env);
        }
    }

    /// Stop all children, post-order relative to this cell: every child (and
    /// transitively its own children) is fully stopped before we proceed.
    async fn stop_children(&mut self) {
        let children = self.handle.children();
        for child in children.iter().rev() {
            if let Err(err) = self.system.stop_actor(child).await {
                debug!(child = %child, error = %err, "child already stopping");
            }
            self.handle.remove_child(child);
        }
    }

    /// The stop sequence: children first, then `post_stop`, then the drain.
    /// Registry removal happens before any `Terminated` fires.
    async fn finish(mut self, reason: StopReason) {
        self.handle.begin_stopping();
        debug!(actor = %self.handle.address(), ?reason, "stopping");

        self.stop_children().await;

        let mut ctx = ActorContext::new(self.system.clone(), self.handle.address().clone());

        if reason == StopReason::Passivated {
            self.save_snapshot(&mut ctx).await;
        }

        if let Err(err) = self.actor.post_stop(&mut ctx).await {
            warn!(actor = %self.handle.address(), error = %err, "post_stop failed");
        }

        // Everything still queued becomes a dead letter.
        self.receiver.close();
        while let Some(env) = self.receiver.try_dequeue() {
            if !env.payload().is_system() {
                self.system.dead_letter(env, DeadLetterReason::Drained);
            }
        }

        self.system.cell_stopped(&self.handle, reason).await;
        self.handle.mark_stopped();
    }

    async fn save_snapshot(&mut self, ctx: &mut ActorContext) {
        let Some(store) = self.system.snapshot_store() else {
            return;
        };
        match self.actor.snapshot(ctx).await {
            Ok(Some(snapshot)) => {
                if let Err(err) = store.save(self.handle.address(), snapshot).await {
                    warn!(actor = %self.handle.address(), error = %err, "snapshot save failed");
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(actor = %self.handle.address(), error = %err, "snapshot hook failed");
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}
