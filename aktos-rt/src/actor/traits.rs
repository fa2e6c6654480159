//! The behavior contract actors implement.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use super::context::{ActorContext, ReceiveContext};
use crate::message::Payload;
use crate::supervisor::BoxError;

/// An actor: an isolated unit of state processing one message at a time.
///
/// Messages reach the actor as opaque payloads; `receive` dispatches on the
/// structural tag. Any `Err` return or panic inside a hook is captured by
/// the dispatcher and turned into supervision input, never a crash.
///
/// # Example
/// ```rust
/// use aktos_rt::actor::{Actor, ReceiveContext};
/// use aktos_rt::message::{Message, PostStart};
/// use aktos_rt::supervisor::BoxError;
/// use async_trait::async_trait;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Hello {
///     name: String,
/// }
/// impl Message for Hello {
///     const TYPE_URL: &'static str = "example/Hello";
/// }
///
/// struct Greeter {
///     greeted: u64,
/// }
///
/// #[async_trait]
/// impl Actor for Greeter {
///     async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError> {
///         if ctx.payload().is::<PostStart>() {
///             return Ok(());
///         }
///         if let Ok(hello) = ctx.message::<Hello>() {
///             self.greeted += 1;
///             ctx.reply(&Hello { name: hello.name }).await?;
///             return Ok(());
///         }
///         ctx.unhandled();
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Actor: Send + 'static {
    /// Runs synchronously before any message is delivered. A failure here
    /// (after the configured init retries) aborts the spawn with an
    /// init-failed error.
    async fn pre_start(&mut self, _ctx: &mut ActorContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Handle the next envelope. Exactly one invocation is in flight per
    /// cell at any time; envelopes arrive strictly in dequeue order.
    async fn receive(&mut self, ctx: &mut ReceiveContext) -> Result<(), BoxError>;

    /// Runs after the last message has drained. Failures are logged and do
    /// not resurrect the cell.
    async fn post_stop(&mut self, _ctx: &mut ActorContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Optional state capture, taken when the cell is passivated and the
    /// system carries a snapshot store. `None` means nothing to save.
    async fn snapshot(&mut self, _ctx: &mut ActorContext) -> Result<Option<Payload>, BoxError> {
        Ok(None)
    }

    /// Counterpart of [`Actor::snapshot`]: applied at spawn when a snapshot
    /// exists under this actor's address.
    async fn restore(&mut self, _snapshot: Payload, _ctx: &mut ActorContext) -> Result<(), BoxError> {
        Ok(())
    }
}
