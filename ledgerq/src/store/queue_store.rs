use crate::common::{deadline_after, Payload};
use crate::errors::{ErrorKind, LedgerError, LedgerResult};
use crate::store::{QueueBackend, QueueConfig};
use parking_lot::{Condvar, Mutex};
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A named FIFO queue of payloads with optional bounded capacity.
///
/// # Purpose
/// `QueueStore` is the live, non-transactional view of a queue. Ordinary callers use it
/// directly for the fast path, transactions use it for eager removal and for applying
/// committed additions, and recovery reaches it through [`RecoverableQueueStore`].
///
/// # Characteristics
/// - **Blocking**: `offer` waits for room and `poll` waits for an element, both parked on
///   a condition variable until the timeout elapses
/// - **Never partial**: an offer that times out stores nothing
/// - **FIFO**: the priority argument of `offer` does not affect ordering
/// - **Fatal only on storage failure**: timeouts are reported through the return value,
///   errors always carry [`ErrorKind::StorageFatal`] or [`ErrorKind::QueueDisposed`]
///
/// Cloning is cheap; clones refer to the same queue.
#[derive(Clone)]
pub struct QueueStore {
    inner: Arc<QueueStoreInner>,
}

impl QueueStore {
    pub(crate) fn new(name: &str, backend: QueueBackend, config: &QueueConfig) -> Self {
        QueueStore {
            inner: Arc::new(QueueStoreInner {
                name: name.to_string(),
                backend,
                capacity: config.capacity(),
                lock: Mutex::new(()),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                room_freed: Condvar::new(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }

    pub fn is_persistent(&self) -> bool {
        self.inner.backend.is_persistent()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Appends `payload` at the tail, waiting up to `timeout` for room.
    ///
    /// # Returns
    /// * `Ok(true)` if the payload was stored
    /// * `Ok(false)` if the queue stayed full for the whole timeout
    /// * `Err(LedgerError)` if the queue is disposed or its storage failed
    pub fn offer(&self, payload: Payload, _priority: i32, timeout: Duration) -> LedgerResult<bool> {
        self.inner.offer(payload, timeout)
    }

    /// Removes and returns the head, waiting up to `timeout` for an element.
    pub fn poll(&self, timeout: Duration) -> LedgerResult<Option<Payload>> {
        self.inner.poll(timeout)
    }

    /// Like [`offer`](Self::offer) but reports a full queue as [`ErrorKind::Timeout`].
    pub fn put(&self, payload: Payload, timeout: Duration) -> LedgerResult<()> {
        if self.inner.offer(payload, timeout)? {
            Ok(())
        } else {
            Err(LedgerError::new(
                &format!("Timed out waiting for room in queue '{}'", self.inner.name),
                ErrorKind::Timeout,
            ))
        }
    }

    /// Like [`poll`](Self::poll) but reports an empty queue as [`ErrorKind::Timeout`].
    pub fn take(&self, timeout: Duration) -> LedgerResult<Payload> {
        match self.inner.poll(timeout)? {
            Some(payload) => Ok(payload),
            None => Err(LedgerError::new(
                &format!("Timed out waiting for an element in queue '{}'", self.inner.name),
                ErrorKind::Timeout,
            )),
        }
    }

    /// Returns a copy of the head without removing it.
    pub fn peek(&self) -> LedgerResult<Option<Payload>> {
        self.inner.check_disposed()?;
        let _guard = self.inner.lock.lock();
        self.inner.backend.peek_front().map_err(|e| self.inner.fatal(e))
    }

    /// Puts a previously taken payload back at the head.
    ///
    /// Capacity is not checked, the element already held a slot.
    pub fn untake(&self, payload: Payload) -> LedgerResult<()> {
        self.inner.check_disposed()?;
        let _guard = self.inner.lock.lock();
        self.inner
            .backend
            .push_front(payload)
            .map_err(|e| self.inner.fatal(e))?;
        self.inner.not_empty.notify_one();
        Ok(())
    }

    pub fn size(&self) -> LedgerResult<usize> {
        self.inner.check_disposed()?;
        self.inner.backend.len().map_err(|e| self.inner.fatal(e))
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.size()? == 0)
    }

    /// Removes every element.
    pub fn clear(&self) -> LedgerResult<()> {
        self.inner.check_disposed()?;
        let _guard = self.inner.lock.lock();
        self.inner.backend.clear().map_err(|e| self.inner.fatal(e))?;
        self.inner.not_full.notify_all();
        self.inner.room_freed.notify_all();
        Ok(())
    }

    /// Waits until the queue could accept `extra` more elements.
    ///
    /// Used by transactions so that an offer into a bounded queue honours the bound
    /// before its addition is deferred to commit. Nothing is reserved.
    pub(crate) fn wait_for_capacity(&self, extra: usize, timeout: Duration) -> LedgerResult<bool> {
        self.inner.check_disposed()?;
        let capacity = match self.inner.capacity {
            Some(capacity) => capacity,
            None => return Ok(true),
        };

        let deadline = deadline_after(timeout);
        let mut guard = self.inner.lock.lock();
        loop {
            if self.inner.len()? + extra <= capacity {
                return Ok(true);
            }
            if self.inner.room_freed.wait_until(&mut guard, deadline).timed_out() {
                return Ok(self.inner.len()? + extra <= capacity);
            }
            self.inner.check_disposed()?;
        }
    }

    /// Appends at the tail ignoring the capacity bound.
    pub(crate) fn force_push_back(&self, payload: Payload) -> LedgerResult<()> {
        self.inner.check_disposed()?;
        let _guard = self.inner.lock.lock();
        self.inner
            .backend
            .push_back(payload)
            .map_err(|e| self.inner.fatal(e))?;
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Marks the queue as disposed and wakes every waiter.
    pub(crate) fn mark_disposed(&self) {
        self.inner.disposed.store(true, Ordering::Release);
        let _guard = self.inner.lock.lock();
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();
        self.inner.room_freed.notify_all();
    }

    pub(crate) fn is_same(&self, other: &QueueStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for QueueStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("persistent", &self.inner.backend.is_persistent())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct QueueStoreInner {
    name: String,
    backend: QueueBackend,
    capacity: Option<usize>,
    lock: Mutex<()>,
    not_empty: Condvar,
    not_full: Condvar,
    /// Capacity waiters that take no slot; every one of them sees each freed slot.
    room_freed: Condvar,
    disposed: AtomicBool,
}

impl QueueStoreInner {
    fn offer(&self, payload: Payload, timeout: Duration) -> LedgerResult<bool> {
        self.check_disposed()?;
        let deadline = deadline_after(timeout);
        let mut guard = self.lock.lock();
        while !self.has_room()? {
            if self.not_full.wait_until(&mut guard, deadline).timed_out() && !self.has_room()? {
                log::debug!("Offer to queue '{}' timed out", self.name);
                return Ok(false);
            }
            self.check_disposed()?;
        }

        self.backend.push_back(payload).map_err(|e| self.fatal(e))?;
        self.not_empty.notify_one();
        Ok(true)
    }

    fn poll(&self, timeout: Duration) -> LedgerResult<Option<Payload>> {
        self.check_disposed()?;
        let deadline = deadline_after(timeout);
        let mut guard = self.lock.lock();
        loop {
            if let Some(payload) = self.backend.pop_front().map_err(|e| self.fatal(e))? {
                self.notify_room();
                return Ok(Some(payload));
            }
            if self.not_empty.wait_until(&mut guard, deadline).timed_out() {
                let last_try = self.backend.pop_front().map_err(|e| self.fatal(e))?;
                if last_try.is_some() {
                    self.notify_room();
                }
                return Ok(last_try);
            }
            self.check_disposed()?;
        }
    }

    fn notify_room(&self) {
        self.not_full.notify_one();
        self.room_freed.notify_all();
    }

    fn len(&self) -> LedgerResult<usize> {
        self.backend.len().map_err(|e| self.fatal(e))
    }

    fn has_room(&self) -> LedgerResult<bool> {
        match self.capacity {
            Some(capacity) => Ok(self.len()? < capacity),
            None => Ok(true),
        }
    }

    fn check_disposed(&self) -> LedgerResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            log::error!("Queue '{}' has been disposed", self.name);
            return Err(LedgerError::new(
                &format!("Queue '{}' has been disposed", self.name),
                ErrorKind::QueueDisposed,
            ));
        }
        Ok(())
    }

    fn fatal(&self, err: LedgerError) -> LedgerError {
        if err.kind() == &ErrorKind::StorageFatal {
            return err;
        }
        log::error!("Storage failure in queue '{}': {}", self.name, err);
        LedgerError::new_with_cause(
            &format!("Storage of queue '{}' is unusable", self.name),
            ErrorKind::StorageFatal,
            err,
        )
    }
}

/// The privileged view of a queue used by recovery.
///
/// It exposes direct, non-transactional mutations that bypass the capacity bound so a
/// replay can never block or time out.
#[derive(Clone, Debug)]
pub struct RecoverableQueueStore {
    store: QueueStore,
}

impl RecoverableQueueStore {
    pub(crate) fn new(store: QueueStore) -> Self {
        RecoverableQueueStore { store }
    }

    /// Returns a removed element to the tail of the queue.
    pub fn restore_to_tail(&self, payload: Payload) -> LedgerResult<()> {
        self.store.force_push_back(payload)
    }

    /// Applies an addition of a committed transaction.
    pub fn apply_add(&self, payload: Payload) -> LedgerResult<()> {
        self.store.force_push_back(payload)
    }

    pub fn queue(&self) -> &QueueStore {
        &self.store
    }
}

impl Deref for RecoverableQueueStore {
    type Target = QueueStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
