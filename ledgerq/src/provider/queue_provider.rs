use crate::errors::LedgerResult;
use crate::store::{QueueStore, RecoverableQueueStore};

/// Resolves queue names to queues.
///
/// Transactions use [`get_queue`](QueueProvider::get_queue); the recoverer uses
/// [`get_recovery_queue`](QueueProvider::get_recovery_queue), which must return the same
/// underlying queue through its privileged interface.
pub trait QueueProvider: Send + Sync {
    fn get_queue(&self, name: &str) -> LedgerResult<QueueStore>;

    fn get_recovery_queue(&self, name: &str) -> LedgerResult<RecoverableQueueStore>;
}
