//! # ledgerq - Embedded Transactional Queues
//!
//! ledgerq provides named FIFO queues whose operations can be grouped into transactions
//! that survive a crash. Every transactional operation is first written to an append-only
//! journal; after a restart the journal is replayed so that committed work is complete and
//! uncommitted work leaves no trace.
//!
//! ## Key Features
//!
//! - **Transactions**: offer and poll across several queues, then commit or roll back
//! - **Write-ahead journal**: checksummed, fsynced records with torn-write detection
//! - **Crash recovery**: committed additions are redone, uncommitted removals are undone
//! - **Bounded queues**: blocking `put`/`take` with timeouts
//! - **Pluggable storage**: in-memory queues, or persistent queues through a
//!   [`StorageModule`](store::StorageModule) such as the fjall adapter
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ledgerq::QueueManager;
//! use ledgerq::common::Payload;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = QueueManager::builder()
//!     .journal_dir("/tmp/ledgerq-journal")
//!     .open()?;
//! manager.start()?;
//!
//! let tx = manager.begin_transaction()?;
//! tx.offer("orders", Payload::text("order-1"), Duration::from_secs(1))?;
//! tx.commit()?;
//!
//! let tx = manager.begin_transaction()?;
//! if let Some(order) = tx.poll("orders", Duration::from_secs(1))? {
//!     tx.offer("shipping", order, Duration::from_secs(1))?;
//! }
//! tx.commit()?;
//!
//! manager.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Transaction Semantics
//!
//! - A poll removes the element from the live queue at once. Rolling back returns it to
//!   the **tail** of its queue.
//! - An offer stays invisible until the commit marker is durable in the journal.
//! - A commit whose journal write fails behaves like a rollback.
//!
//! ## Module Organization
//!
//! - [`common`] - Payloads, constants and utilities
//! - [`errors`] - Error types and result definitions
//! - [`journal`] - The transaction journal
//! - [`provider`] - Queue lookup for transactions and recovery
//! - [`recovery`] - Journal replay after a restart
//! - [`store`] - Queue stores and storage backends
//! - [`transaction`] - Transaction contexts

pub mod common;
pub mod errors;
pub mod journal;
pub mod provider;
pub mod queue_manager;
pub mod queue_manager_builder;
pub mod queue_manager_config;
pub mod recovery;
pub mod store;
pub mod transaction;

pub use queue_manager::QueueManager;
pub use queue_manager_builder::QueueManagerBuilder;
pub use queue_manager_config::QueueManagerConfig;
