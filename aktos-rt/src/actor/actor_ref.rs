//! Location-transparent actor references.

// Layer 1: Standard library imports
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use chrono::Utc;

// Layer 3: Internal module imports
use super::cell::CellHandle;
use crate::address::Address;
use crate::deadletter::DeadLetterReason;
use crate::message::{Envelope, Message, Payload};
use crate::system::actor_system::ActorSystem;
use crate::system::errors::SystemError;

#[derive(Clone)]
enum RefTarget {
    Local(Arc<CellHandle>),
    Remote(Address),
}

/// A handle to an actor, local or remote.
///
/// Local references enqueue directly on the cell's mailbox; remote
/// references marshal envelopes through the remoting client. Either way,
/// `tell` never waits on the receiving behavior.
#[derive(Clone)]
pub struct ActorRef {
    system: ActorSystem,
    target: RefTarget,
}

impl ActorRef {
    pub(crate) fn local(system: ActorSystem, handle: Arc<CellHandle>) -> Self {
        Self {
            system,
            target: RefTarget::Local(handle),
        }
    }

    pub(crate) fn remote(system: ActorSystem, address: Address) -> Self {
        Self {
            system,
            target: RefTarget::Remote(address),
        }
    }

    pub fn address(&self) -> &Address {
        match &self.target {
            RefTarget::Local(handle) => handle.address(),
            RefTarget::Remote(address) => address,
        }
    }

    pub fn name(&self) -> &str {
        self.address().name()
    }

    pub fn is_local(&self) -> bool {
        matches!(self.target, RefTarget::Local(_))
    }

    pub(crate) fn handle(&self) -> Option<&Arc<CellHandle>> {
        match &self.target {
            RefTarget::Local(handle) => Some(handle),
            RefTarget::Remote(_) => None,
        }
    }

    /// Fire-and-forget send. Fails fast with a dead-letter error when the
    /// target has stopped, or `MailboxFull` for saturated bounded
    /// mailboxes; the envelope is also published to the dead-letter sink.
    pub async fn tell<M: Message>(&self, message: &M) -> Result<(), SystemError> {
        self.tell_payload(Payload::encode(message)?).await
    }

    /// `tell` with a pre-encoded payload.
    pub async fn tell_payload(&self, payload: Payload) -> Result<(), SystemError> {
        let env = Envelope::new(self.address().clone(), payload);
        self.deliver(env).await
    }

    pub(crate) async fn deliver(&self, env: Envelope) -> Result<(), SystemError> {
        match &self.target {
            RefTarget::Local(handle) => {
                let for_sink = env.clone();
                match handle.enqueue_user(env) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        if matches!(err, SystemError::DeadLetter(_)) {
                            self.dead_letter_on(for_sink, DeadLetterReason::RecipientStopped);
                        }
                        Err(err)
                    }
                }
            }
            RefTarget::Remote(address) => {
                let client = self.system.remoting_client()?;
                let from = env.sender().cloned();
                client
                    .tell(address, env.into_payload(), from)
                    .await
                    .map_err(SystemError::from)
            }
        }
    }

    /// Request/response with a deadline. Resolves with the first matching
    /// reply, or an ask-timeout error once `timeout` elapses; the pending
    /// slot is freed either way.
    pub async fn ask<M: Message>(
        &self,
        message: &M,
        timeout: Duration,
    ) -> Result<Payload, SystemError> {
        self.ask_payload(Payload::encode(message)?, timeout).await
    }

    pub async fn ask_payload(
        &self,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Payload, SystemError> {
        match &self.target {
            RefTarget::Local(handle) => {
                let coordinator = self.system.coordinator();
                let deadline = Utc::now()
                    + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
                let env = Envelope::new(self.address().clone(), payload).with_deadline(deadline);
                let correlation = env.id();
                let env = env.with_sender(Address::ask_reply(
                    self.address().system().to_owned(),
                    correlation,
                ));

                let rx = coordinator.register(correlation, Instant::now() + timeout);
                if let Err(err) = handle.enqueue_user(env) {
                    coordinator.cancel(correlation);
                    return Err(err);
                }

                match tokio::time::timeout(timeout, rx).await {
                    Ok(Ok(reply)) => Ok(reply),
                    Ok(Err(_)) => Err(SystemError::AskTimeout(timeout)),
                    Err(_) => {
                        coordinator.cancel(correlation);
                        Err(SystemError::AskTimeout(timeout))
                    }
                }
            }
            RefTarget::Remote(address) => {
                let client = self.system.remoting_client()?;
                client
                    .ask(address, payload, None, timeout)
                    .await
                    .map_err(SystemError::from)
            }
        }
    }

    /// Stop the actor: the state flips to `Stopping`, a terminal sentinel is
    /// enqueued, and the call waits for the drain (bounded by the system's
    /// shutdown timeout). Only valid for local references.
    pub async fn shutdown(&self) -> Result<(), SystemError> {
        match &self.target {
            RefTarget::Local(handle) => self.system.stop_actor(handle.address()).await,
            RefTarget::Remote(address) => Err(SystemError::NotLocal(address.clone())),
        }
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef({})", self.address())
    }
}

// Dead-letter publication for failed local deliveries lives here so every
// caller of `deliver` gets it uniformly.
impl ActorRef {
    pub(crate) fn dead_letter_on(&self, env: Envelope, reason: DeadLetterReason) {
        self.system.dead_letter(env, reason);
    }
}
