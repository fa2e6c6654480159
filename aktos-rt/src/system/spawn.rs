//! Per-spawn options.

// Layer 1: Standard library
// (none)

// Layer 2: Third-party
// (none)

// Layer 3: Internal
use crate::mailbox::MailboxSpec;
use crate::passivation::PassivationStrategy;
use crate::supervisor::SupervisorStrategy;

/// Options recognized at spawn time: mailbox discipline, supervision
/// policy, and passivation strategy.
///
/// # Example
/// ```rust
/// use aktos_rt::mailbox::MailboxSpec;
/// use aktos_rt::passivation::PassivationStrategy;
/// use aktos_rt::supervisor::{Directive, SupervisorStrategy};
/// use aktos_rt::system::SpawnOptions;
/// use std::time::Duration;
///
/// let options = SpawnOptions::new()
///     .with_mailbox(MailboxSpec::bounded(128))
///     .with_supervisor(SupervisorStrategy::on_any(Directive::Restart))
///     .with_passivation(PassivationStrategy::time_based(Duration::from_secs(300)));
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub(crate) mailbox: MailboxSpec,
    pub(crate) supervisor: Option<SupervisorStrategy>,
    pub(crate) passivation: PassivationStrategy,
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mailbox(mut self, mailbox: MailboxSpec) -> Self {
        self.mailbox = mailbox;
        self
    }

    /// Override the system-default supervisor for this actor.
    pub fn with_supervisor(mut self, supervisor: SupervisorStrategy) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn with_passivation(mut self, passivation: PassivationStrategy) -> Self {
        self.passivation = passivation;
        self
    }
}
