use crate::errors::LedgerResult;
use crate::store::memory::InMemoryQueueStorage;
use crate::store::{QueueStorage, StorageModule};

/// Storage module handing out a single shared [`InMemoryQueueStorage`].
///
/// Useful in tests that want "persistent" queues to behave like the real thing within
/// one process, including across a warm restart.
#[derive(Clone, Default)]
pub struct InMemoryStorageModule {
    storage: InMemoryQueueStorage,
}

impl InMemoryStorageModule {
    pub fn new() -> InMemoryStorageModule {
        InMemoryStorageModule {
            storage: InMemoryQueueStorage::new(),
        }
    }
}

impl StorageModule for InMemoryStorageModule {
    fn get_storage(&self) -> LedgerResult<QueueStorage> {
        Ok(QueueStorage::new(self.storage.clone()))
    }
}
