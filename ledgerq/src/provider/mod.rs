//! Name-to-queue resolution for transactions and recovery.

mod queue_provider;
mod queue_registry;

pub use queue_provider::*;
pub use queue_registry::*;
