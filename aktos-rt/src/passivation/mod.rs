//! Passivation: proactive shutdown of idle cells.
//!
//! Each cell carries at most one [`PassivationStrategy`]. A shared
//! controller task ticks at the finest resolution any registered strategy
//! asks for, marks due cells, and enqueues a tagged `PoisonPill`. The pill
//! is re-evaluated when dequeued: traffic that arrived in the meantime turns
//! it into a no-op.

pub mod controller;
pub mod strategy;

pub use strategy::{PassivationStrategy, PassivationView};

pub(crate) use controller::PassivationController;
