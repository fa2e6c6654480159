//! System-level error types.

// Layer 1: Standard library
use std::time::Duration;

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
use crate::address::Address;
use crate::cluster::ClusterError;
use crate::mailbox::MailboxError;
use crate::message::CodecError;
use crate::remote::RemoteError;
use crate::supervisor::BoxError;

/// Errors surfaced by the public operations of an actor system.
///
/// Every operation reports its precise failure kind; the only intentional
/// drops are dead letters, which are observable through the sink rather
/// than returned.
#[derive(Debug, Error)]
pub enum SystemError {
    /// No actor registered under the given name, locally or in the cluster.
    #[error("no actor registered under name '{0}'")]
    UnknownAddress(String),

    /// The receiver stopped; the envelope went to the dead-letter sink.
    #[error("message for {0} became a dead letter")]
    DeadLetter(Address),

    /// A message could not be routed at all.
    #[error("no route: {0}")]
    NoRoute(String),

    /// An actor with that name already exists.
    #[error("actor name '{0}' already taken")]
    NameConflict(String),

    /// `pre_start` kept failing; the spawn was aborted.
    #[error("actor '{name}' failed to initialize: {source}")]
    InitFailed { name: String, source: BoxError },

    /// The cell already stopped.
    #[error("actor {0} already stopped")]
    AlreadyStopped(Address),

    /// Graceful drain did not finish inside the window; the dispatcher was
    /// force released.
    #[error("shutdown deadline of {0:?} exceeded")]
    ShutdownDeadline(Duration),

    /// No reply arrived before the ask deadline.
    #[error("ask timed out after {0:?}")]
    AskTimeout(Duration),

    /// The target is on another node and the operation is local-only.
    #[error("actor {0} is not local to this node")]
    NotLocal(Address),

    /// The system is not accepting new work.
    #[error("actor system is shutting down")]
    ShuttingDown,

    /// The system has not been started yet.
    #[error("actor system is not started")]
    NotStarted,

    /// Remoting was required but not configured.
    #[error("remoting is not enabled on this system")]
    RemotingDisabled,

    /// Invalid system configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Mailbox capacity or lifecycle failure.
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    /// Payload codec failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Transport failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Cluster membership or directory failure.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl SystemError {
    /// Capacity errors are transient: the same send may succeed once the
    /// consumer catches up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SystemError::Mailbox(MailboxError::Full { .. }) | SystemError::AskTimeout(_)
        )
    }
}
