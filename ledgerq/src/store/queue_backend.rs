use crate::common::Payload;
use crate::errors::LedgerResult;
use std::ops::Deref;
use std::sync::Arc;

/// Low-level interface for the element storage of one named queue.
///
/// # Purpose
/// A backend holds the ordered elements of a single queue and knows nothing about
/// capacity, blocking or transactions. [`QueueStore`](crate::store::QueueStore) layers
/// those on top of it.
///
/// # Implementations
/// - `InMemoryQueueBackend`: a `VecDeque` behind a mutex, lost on restart
/// - `FjallQueueBackend`: one fjall partition per queue, survives a restart
///
/// # Thread Safety
/// Implementers must be `Send + Sync`. Callers serialize compound operations themselves;
/// each individual call must still be safe under concurrent use.
pub trait QueueBackendProvider: Send + Sync {
    /// Returns the queue name this backend stores.
    fn name(&self) -> String;

    /// Appends an element at the tail.
    ///
    /// # Returns
    /// * `Ok(())` once the element is stored (and persisted, for persistent backends)
    /// * `Err(LedgerError)` if the storage could not be written
    fn push_back(&self, payload: Payload) -> LedgerResult<()>;

    /// Inserts an element at the head, ahead of every stored element.
    fn push_front(&self, payload: Payload) -> LedgerResult<()>;

    /// Removes and returns the head element.
    ///
    /// # Returns
    /// * `Ok(Some(payload))` with the former head
    /// * `Ok(None)` if the queue is empty
    /// * `Err(LedgerError)` if the storage could not be read or written
    fn pop_front(&self) -> LedgerResult<Option<Payload>>;

    /// Returns a copy of the head element without removing it.
    fn peek_front(&self) -> LedgerResult<Option<Payload>>;

    /// Returns the number of stored elements.
    fn len(&self) -> LedgerResult<usize>;

    /// Returns `true` if no element is stored.
    fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Removes every element.
    fn clear(&self) -> LedgerResult<()>;

    /// Returns `true` if the elements outlive the process.
    fn is_persistent(&self) -> bool;
}

/// High-level wrapper around a [`QueueBackendProvider`].
///
/// Cloning is cheap and every clone refers to the same storage.
#[derive(Clone)]
pub struct QueueBackend {
    inner: Arc<dyn QueueBackendProvider>,
}

impl QueueBackend {
    pub fn new<T: QueueBackendProvider + 'static>(inner: T) -> Self {
        QueueBackend {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for QueueBackend {
    type Target = Arc<dyn QueueBackendProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
