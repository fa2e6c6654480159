//! Capabilities handed to actor hooks.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};

// Layer 3: Internal module imports
use super::actor_ref::ActorRef;
use super::traits::Actor;
use crate::address::Address;
use crate::deadletter::DeadLetterReason;
use crate::message::{CodecError, Envelope, Message, Payload};
use crate::system::actor_system::ActorSystem;
use crate::system::errors::SystemError;
use crate::system::spawn::SpawnOptions;

/// Context for lifecycle hooks (`pre_start`, `post_stop`, snapshots).
pub struct ActorContext {
    system: ActorSystem,
    address: Address,
}

impl ActorContext {
    pub(crate) fn new(system: ActorSystem, address: Address) -> Self {
        Self { system, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// Spawn a child of this actor.
    pub async fn spawn_child<A: Actor>(
        &self,
        name: &str,
        actor: A,
    ) -> Result<ActorRef, SystemError> {
        self.system
            .spawn_child(&self.address, name, actor, SpawnOptions::default())
            .await
    }

    /// Spawn a child with explicit mailbox/supervisor/passivation options.
    pub async fn spawn_child_with<A: Actor>(
        &self,
        name: &str,
        actor: A,
        options: SpawnOptions,
    ) -> Result<ActorRef, SystemError> {
        self.system
            .spawn_child(&self.address, name, actor, options)
            .await
    }

    /// Watch another cell; a `Terminated` message arrives when it stops.
    pub fn watch(&self, target: &Address) {
        self.system
            .registry()
            .watch(self.address.clone(), target.clone());
    }

    pub fn unwatch(&self, target: &Address) {
        self.system.registry().unwatch(&self.address, target);
    }
}

/// Context for exactly one `receive` invocation.
///
/// Carries the envelope being processed plus every capability the behavior
/// contract exposes: reply, forward, tell, child spawning, watching, and the
/// remote primitives.
pub struct ReceiveContext {
    system: ActorSystem,
    myself: ActorRef,
    envelope: Envelope,
    unhandled: bool,
}

impl ReceiveContext {
    pub(crate) fn new(system: ActorSystem, myself: ActorRef, envelope: Envelope) -> Self {
        Self {
            system,
            myself,
            envelope,
            unhandled: false,
        }
    }

    /// The opaque payload of the current envelope.
    pub fn payload(&self) -> &Payload {
        self.envelope.payload()
    }

    /// Decode the current payload into a typed message.
    pub fn message<M: Message>(&self) -> Result<M, CodecError> {
        self.envelope.payload().decode::<M>()
    }

    /// The whole envelope, for header and correlation access.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Who sent the current envelope, if anyone.
    pub fn sender(&self) -> Option<&Address> {
        self.envelope.sender()
    }

    /// A reference to the actor itself.
    pub fn myself(&self) -> &ActorRef {
        &self.myself
    }

    pub fn address(&self) -> &Address {
        self.myself.address()
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// Delivery deadline of the current envelope; cooperative user code
    /// checks this during long handlers.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.envelope.deadline()
    }

    /// Mark the current message as not handled by this behavior. It is
    /// routed to the dead-letter sink after `receive` returns.
    pub fn unhandled(&mut self) {
        self.unhandled = true;
    }

    pub(crate) fn take_unhandled(&mut self) -> bool {
        std::mem::take(&mut self.unhandled)
    }

    pub(crate) fn into_envelope(self) -> Envelope {
        self.envelope
    }

    /// Answer the current message. For asks the reply resolves the pending
    /// promise (local or bridged remote); for plain tells it is delivered to
    /// the sender's mailbox.
    pub async fn reply<M: Message>(&self, message: &M) -> Result<(), SystemError> {
        self.reply_payload(Payload::encode(message)?).await
    }

    pub async fn reply_payload(&self, payload: Payload) -> Result<(), SystemError> {
        let Some(sender) = self.envelope.sender().cloned() else {
            return Err(SystemError::NoRoute(
                "reply to an envelope without a sender".into(),
            ));
        };

        if sender.is_ask() {
            let Some(correlation) = sender.ask_correlation() else {
                return Err(SystemError::NoRoute(format!(
                    "malformed ask address {sender}"
                )));
            };
            if !self.system.coordinator().complete(correlation, payload.clone()) {
                // The ask already timed out; keep the late reply observable.
                let env = Envelope::new(sender, payload).with_in_reply_to(self.envelope.id());
                self.system
                    .dead_letter(env, DeadLetterReason::RecipientStopped);
            }
            return Ok(());
        }

        let target = self.system.resolve_address(&sender).await?;
        let env = Envelope::new(sender, payload)
            .with_sender(self.address().clone())
            .with_in_reply_to(self.envelope.id());
        target.deliver(env).await
    }

    /// Re-route the current payload to another actor, preserving the
    /// original sender.
    pub async fn forward(&self, to: &Address) -> Result<(), SystemError> {
        let target = self.system.resolve_address(to).await?;
        let mut env = Envelope::new(to.clone(), self.envelope.payload().clone());
        if let Some(sender) = self.envelope.sender() {
            env = env.with_sender(sender.clone());
        }
        target.deliver(env).await
    }

    /// Send a message to another actor, attributed to this one.
    pub async fn tell<M: Message>(&self, target: &ActorRef, message: &M) -> Result<(), SystemError> {
        let env = Envelope::new(target.address().clone(), Payload::encode(message)?)
            .with_sender(self.address().clone());
        target.deliver(env).await
    }

    /// Spawn a child of this actor.
    pub async fn spawn_child<A: Actor>(
        &self,
        name: &str,
        actor: A,
    ) -> Result<ActorRef, SystemError> {
        self.system
            .spawn_child(self.address(), name, actor, SpawnOptions::default())
            .await
    }

    pub async fn spawn_child_with<A: Actor>(
        &self,
        name: &str,
        actor: A,
        options: SpawnOptions,
    ) -> Result<ActorRef, SystemError> {
        self.system
            .spawn_child(self.address(), name, actor, options)
            .await
    }

    /// Watch another cell for termination.
    pub fn watch(&self, target: &Address) {
        self.system
            .registry()
            .watch(self.address().clone(), target.clone());
    }

    pub fn unwatch(&self, target: &Address) {
        self.system.registry().unwatch(self.address(), target);
    }

    /// Fire-and-forget to an actor on another node.
    pub async fn remote_tell<M: Message>(
        &self,
        to: &Address,
        message: &M,
    ) -> Result<(), SystemError> {
        let payload = Payload::encode(message)?;
        self.system
            .remoting_client()?
            .tell(to, payload, Some(self.address().clone()))
            .await
            .map_err(SystemError::from)
    }

    /// Request/response across nodes.
    pub async fn remote_ask<M: Message>(
        &self,
        to: &Address,
        message: &M,
        timeout: Duration,
    ) -> Result<Payload, SystemError> {
        let payload = Payload::encode(message)?;
        self.system
            .remoting_client()?
            .ask(to, payload, Some(self.address().clone()), timeout)
            .await
            .map_err(SystemError::from)
    }

    /// Order-preserving batch send to a single remote actor. The whole batch
    /// fails on the first error, reporting how many envelopes were
    /// delivered.
    pub async fn remote_batch_tell(
        &self,
        to: &Address,
        payloads: Vec<Payload>,
    ) -> Result<(), SystemError> {
        self.system
            .remoting_client()?
            .batch_tell(to, payloads, Some(self.address().clone()))
            .await
            .map_err(SystemError::from)
    }

    /// Resolve a name on a specific remote node.
    pub async fn remote_lookup(
        &self,
        host: &str,
        port: u16,
        name: &str,
    ) -> Result<Option<Address>, SystemError> {
        self.system.remote_lookup(host, port, name).await
    }
}
