use crate::errors::{ErrorKind, LedgerError, LedgerResult};
use crate::store::memory::InMemoryQueueBackend;
use crate::store::{QueueBackend, QueueStorageProvider};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-memory queue storage.
///
/// # Purpose
/// Hosts transient queues, and stands in for persistent ones when no storage module is
/// configured. Nothing survives the process.
///
/// # Usage
/// ```text
/// let storage = QueueStorage::new(InMemoryQueueStorage::new());
/// storage.open_or_create()?;
/// let backend = storage.open_queue("orders")?;
/// backend.push_back(Payload::text("A"))?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryQueueStorage {
    inner: Arc<InMemoryQueueStorageInner>,
}

impl InMemoryQueueStorage {
    pub fn new() -> InMemoryQueueStorage {
        InMemoryQueueStorage {
            inner: Arc::new(InMemoryQueueStorageInner::default()),
        }
    }
}

impl QueueStorageProvider for InMemoryQueueStorage {
    fn open_or_create(&self) -> LedgerResult<()> {
        self.inner.closed.store(false, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> LedgerResult<bool> {
        Ok(self.inner.closed.load(Ordering::Acquire))
    }

    fn has_queue(&self, name: &str) -> LedgerResult<bool> {
        Ok(self.inner.queues.contains_key(name))
    }

    fn queue_names(&self) -> LedgerResult<HashSet<String>> {
        Ok(self
            .inner
            .queues
            .iter()
            .map(|entry| entry.key().clone())
            .collect())
    }

    fn open_queue(&self, name: &str) -> LedgerResult<QueueBackend> {
        self.inner.check_opened()?;
        let backend = self
            .inner
            .queues
            .entry(name.to_string())
            .or_insert_with(|| QueueBackend::new(InMemoryQueueBackend::new(name)))
            .clone();
        Ok(backend)
    }

    fn remove_queue(&self, name: &str) -> LedgerResult<()> {
        if let Some((_, backend)) = self.inner.queues.remove(name) {
            backend.clear()?;
        }
        Ok(())
    }

    fn commit(&self) -> LedgerResult<()> {
        Ok(())
    }

    fn close(&self) -> LedgerResult<()> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.queues.clear();
        Ok(())
    }

    fn store_version(&self) -> LedgerResult<String> {
        Ok(format!("InMemory/{}", crate::common::LEDGERQ_VERSION))
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct InMemoryQueueStorageInner {
    queues: DashMap<String, QueueBackend>,
    closed: AtomicBool,
}

impl InMemoryQueueStorageInner {
    fn check_opened(&self) -> LedgerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            log::error!("In-memory queue storage is closed");
            return Err(LedgerError::new(
                "In-memory queue storage is closed",
                ErrorKind::StoreAlreadyClosed,
            ));
        }
        Ok(())
    }
}
