use crate::errors::LedgerResult;
use crate::store::QueueStorage;

/// A pluggable provider of persistent queue storage.
///
/// The queue manager asks the configured module for its storage once, when it is opened,
/// and routes every queue configured as persistent to it.
pub trait StorageModule: Send + Sync {
    fn get_storage(&self) -> LedgerResult<QueueStorage>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, LedgerError};
    use crate::store::memory::InMemoryQueueStorage;

    struct MockStorageModule {
        storage: Option<QueueStorage>,
    }

    impl StorageModule for MockStorageModule {
        fn get_storage(&self) -> LedgerResult<QueueStorage> {
            match &self.storage {
                Some(storage) => Ok(storage.clone()),
                None => Err(LedgerError::new("Storage is closed", ErrorKind::IOError)),
            }
        }
    }

    #[test]
    fn test_get_storage_positive() {
        let module = MockStorageModule {
            storage: Some(QueueStorage::new(InMemoryQueueStorage::new())),
        };
        assert!(module.get_storage().is_ok());
    }

    #[test]
    fn test_get_storage_negative() {
        let module = MockStorageModule { storage: None };
        assert!(module.get_storage().is_err());
    }
}
