//! Persistent queue storage for ledgerq on top of the [Fjall](https://docs.rs/fjall) LSM
//! engine.
//!
//! Load a [`FjallModule`] into a `QueueManager` and every persistent queue is kept in a
//! partition of one Fjall keyspace, surviving a process restart.

mod backend;
mod config;
mod module;
mod storage;
mod version;
mod wrapper;

pub use config::*;
pub use module::*;
pub use storage::FjallQueueStorage;
pub use wrapper::{FjallPayload, FjallPayloadError, FjallPayloadResult};
