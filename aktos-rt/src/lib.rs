//! # aktos-rt - Clustered Actor Runtime
//!
//! Location-transparent, message-passing concurrency: lightweight actors
//! addressed by logical name, supervised in a tree, passivated when idle,
//! and reachable across nodes through a framed RPC transport with a
//! partitioned, replicated name directory.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use aktos_rt::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! // 1. Define your message type
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Greet {
//!     who: String,
//! }
//!
//! impl Message for Greet {
//!     const TYPE_URL: &'static str = "demo/Greet";
//! }
//!
//! // 2. Define your actor
//! struct Greeter {
//!     count: u64,
//! }
//!
//! // 3. Implement the Actor trait
//! #[async_trait::async_trait]
//! impl Actor for Greeter {
//!     async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
//!         if let Ok(greet) = ctx.message::<Greet>() {
//!             self.count += 1;
//!             ctx.reply(&greet).await?;
//!         } else if !ctx.payload().is::<PostStart>() {
//!             ctx.unhandled();
//!         }
//!         Ok(())
//!     }
//! }
//!
//! // 4. Spawn and use your actor
//! #[tokio::main]
//! async fn main() -> Result<(), SystemError> {
//!     let system = ActorSystem::new(SystemConfig::new("demo"))?;
//!     system.start().await?;
//!
//!     let greeter = system.spawn("greeter", Greeter { count: 0 }).await?;
//!     greeter.tell(&Greet { who: "world".into() }).await?;
//!
//!     system.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Guarantees
//!
//! - **FIFO per cell** for the non-priority mailbox disciplines; priority
//!   mailboxes follow their comparator with FIFO tie-breaks.
//! - **At most one `receive` in flight per cell**, always in dequeue order.
//! - **At-most-once delivery** locally; at-most-once per attempt remotely.
//! - **Failures become supervision input** (resume / restart / stop /
//!   escalate), never runtime crashes.
//!
//! # Module Organization
//!
//! - [`actor`] - behavior trait, contexts, cells, references
//! - [`message`] - opaque payloads, envelopes, control messages
//! - [`mailbox`] - FIFO / bounded / priority queues
//! - [`supervisor`] - failure directives and rule lists
//! - [`registry`] - name resolution and watching (crate-internal)
//! - [`passivation`] - idle-actor eviction
//! - [`ask`] - request/reply correlation (crate-internal)
//! - [`remote`] - framed transport, TLS, client/server
//! - [`cluster`] - membership, discovery, partitioned directory
//! - [`system`] - configuration and the [`system::ActorSystem`] facade
//! - [`snapshot`] - optional passivation snapshots

pub mod actor;
pub mod address;
pub mod ask;
pub mod cluster;
pub mod deadletter;
pub mod mailbox;
pub mod message;
pub mod passivation;
pub mod registry;
pub mod remote;
pub mod snapshot;
pub mod supervisor;
pub mod system;

pub mod prelude;

// Re-export commonly used types
pub use actor::{Actor, ActorContext, ActorRef, ActorState, ReceiveContext};
pub use address::Address;
pub use cluster::{
    ClusterConfig, ClusterError, DirectoryEntry, DiscoveryProvider, Endpoint, KubernetesConfig,
    MembershipState, StaticDiscovery,
};
pub use deadletter::{DeadLetter, DeadLetterReason};
pub use mailbox::{MailboxError, MailboxSpec};
pub use message::{Envelope, Message, Payload, PoisonPill, PostStart, StopReason, Terminated};
pub use passivation::PassivationStrategy;
pub use remote::{RemoteConfig, RemoteError};
pub use snapshot::{InMemorySnapshotStore, SnapshotStore};
pub use supervisor::{BoxError, Directive, ErrorMatcher, SupervisorStrategy};
pub use system::{ActorSystem, SpawnOptions, SystemConfig, SystemError};
