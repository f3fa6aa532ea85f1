use crate::errors::LedgerResult;
use crate::store::QueueBackend;
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

/// Low-level interface for a storage engine that hosts queue backends.
///
/// # Purpose
/// A storage owns the physical resources (memory, files, a keyspace) and hands out one
/// [`QueueBackend`] per queue name. Opening the same name twice must return backends
/// that share the same elements.
///
/// # Implementations
/// - `InMemoryQueueStorage`: process-local, used for transient queues and tests
/// - `FjallQueueStorage`: persistent storage in the `ledgerq-fjall-adapter` crate
pub trait QueueStorageProvider: Send + Sync {
    /// Opens or creates the underlying storage.
    ///
    /// Must be called before any queue is opened. Calling it again on an open storage
    /// is a no-op.
    fn open_or_create(&self) -> LedgerResult<()>;

    /// Checks if the storage has been closed.
    fn is_closed(&self) -> LedgerResult<bool>;

    /// Checks if a queue with the given name has been created.
    fn has_queue(&self, name: &str) -> LedgerResult<bool>;

    /// Returns the names of every queue known to the storage.
    fn queue_names(&self) -> LedgerResult<HashSet<String>>;

    /// Opens or creates the backend for a queue.
    ///
    /// # Returns
    /// * `Ok(QueueBackend)` sharing state with every other backend of that name
    /// * `Err(LedgerError)` if the storage is closed or the queue cannot be created
    fn open_queue(&self, name: &str) -> LedgerResult<QueueBackend>;

    /// Deletes a queue and all of its elements.
    fn remove_queue(&self, name: &str) -> LedgerResult<()>;

    /// Flushes pending writes to stable storage.
    fn commit(&self) -> LedgerResult<()>;

    /// Closes the storage. Backends handed out earlier must not be used afterwards.
    fn close(&self) -> LedgerResult<()>;

    /// Returns a human readable engine version.
    fn store_version(&self) -> LedgerResult<String>;

    /// Returns `true` if queues in this storage survive a process restart.
    fn is_persistent(&self) -> bool;
}

/// High-level wrapper around a [`QueueStorageProvider`].
#[derive(Clone)]
pub struct QueueStorage {
    inner: Arc<dyn QueueStorageProvider>,
}

impl QueueStorage {
    pub fn new<T: QueueStorageProvider + 'static>(inner: T) -> Self {
        QueueStorage {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for QueueStorage {
    type Target = Arc<dyn QueueStorageProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
