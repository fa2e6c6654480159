//! Convenience re-exports for the common case.

pub use crate::actor::{Actor, ActorContext, ActorRef, ReceiveContext};
pub use crate::address::Address;
pub use crate::mailbox::MailboxSpec;
pub use crate::message::{Message, Payload, PoisonPill, PostStart, Terminated};
pub use crate::passivation::PassivationStrategy;
pub use crate::supervisor::{BoxError, Directive, ErrorMatcher, SupervisorStrategy};
pub use crate::system::{ActorSystem, SpawnOptions, SystemConfig, SystemError};
