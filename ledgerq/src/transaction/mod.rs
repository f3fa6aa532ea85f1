//! Local transactions over one or more queues.
//!
//! A [`TransactionContext`] removes elements eagerly and undoably, and defers additions
//! until its COMMIT marker is durable in the journal.

mod core;
mod transaction_context;

pub use self::core::TransactionState;
pub(crate) use self::core::{ActiveGuard, ActiveTransactions, PendingOperations, Removal};
pub use transaction_context::*;
