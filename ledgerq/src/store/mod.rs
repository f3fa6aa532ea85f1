//! Queue storage.
//!
//! A queue is split into two layers:
//!
//! - a [`QueueBackend`] that only stores ordered elements, provided by a pluggable
//!   [`QueueStorage`] (in-memory here, fjall in `ledgerq-fjall-adapter`)
//! - a [`QueueStore`] that adds capacity bounds, blocking with timeouts and disposal
//!
//! Recovery reaches queues through [`RecoverableQueueStore`], which adds direct,
//! unbounded mutations for replaying the journal.

pub mod memory;
mod queue_backend;
mod queue_config;
mod queue_storage;
mod queue_store;
mod storage_module;

pub use queue_backend::*;
pub use queue_config::*;
pub use queue_storage::*;
pub use queue_store::*;
pub use storage_module::*;
