//! Crash recovery of transactional queues from the journal.

mod recoverer;

pub use recoverer::*;
