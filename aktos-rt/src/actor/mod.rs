//! Actors: behavior contract, cells, dispatchers, and references.
//!
//! # Components
//!
//! - [`Actor`] - the behavior trait users implement
//! - [`ActorContext`] / [`ReceiveContext`] - capabilities handed to hooks
//! - [`ActorRef`] - location-transparent handle for tell/ask/shutdown
//! - [`cell`] - the runtime cell and its dispatcher loop

pub mod actor_ref;
pub mod cell;
pub mod context;
pub mod traits;

pub use actor_ref::ActorRef;
pub use cell::ActorState;
pub use context::{ActorContext, ReceiveContext};
pub use traits::Actor;
