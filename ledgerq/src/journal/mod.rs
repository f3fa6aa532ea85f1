//! The transaction journal.
//!
//! An append-only file of [`JournalEntry`] records grouped by [`TransactionId`]. A
//! transaction counts as committed if and only if its COMMIT entry is in the journal;
//! recovery trusts nothing else.

mod codec;
mod entry;
mod fault;
mod iters;
mod journal_config;
mod transaction_journal;

pub use entry::*;
pub use fault::*;
pub use iters::*;
pub use journal_config::*;
pub use transaction_journal::*;
