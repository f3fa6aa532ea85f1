use crate::errors::{ErrorKind, LedgerError, LedgerResult};
use crate::provider::QueueProvider;
use crate::queue_manager_config::QueueManagerConfig;
use crate::store::memory::InMemoryQueueStorage;
use crate::store::{QueueStorage, QueueStore, RecoverableQueueStore};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

/// The [`QueueProvider`] of a queue manager.
///
/// Creates each queue on first use from its [`QueueConfig`](crate::store::QueueConfig):
/// persistent queues go to the configured storage module, the rest to in-memory storage.
/// Queues stay registered until disposed, so a warm restart of the manager sees the same
/// live queues.
#[derive(Clone)]
pub struct QueueRegistry {
    inner: Arc<QueueRegistryInner>,
}

impl QueueRegistry {
    /// Creates a registry, opening the configured storage module if there is one.
    pub fn new(config: QueueManagerConfig) -> LedgerResult<Self> {
        let transient = QueueStorage::new(InMemoryQueueStorage::new());
        transient.open_or_create()?;

        let persistent = match config.storage_module() {
            Some(module) => {
                let storage = module.get_storage()?;
                storage.open_or_create()?;
                log::debug!("Persistent queue storage {} opened", storage.store_version()?);
                Some(storage)
            }
            None => None,
        };

        Ok(QueueRegistry {
            inner: Arc::new(QueueRegistryInner {
                config,
                queues: DashMap::new(),
                transient,
                persistent,
            }),
        })
    }

    /// Names of the queues created so far.
    pub fn queue_names(&self) -> HashSet<String> {
        self.inner
            .queues
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.inner.queues.contains_key(name)
    }

    /// Deletes a queue with its elements and forgets it. Handles to it fail afterwards.
    pub fn dispose_queue(&self, name: &str) -> LedgerResult<()> {
        let store = self.get_queue(name)?;
        self.inner.queues.remove(name);
        store.mark_disposed();
        self.inner.storage_for(&store).remove_queue(name)?;
        log::debug!("Queue '{}' disposed", name);
        Ok(())
    }

    /// Flushes the persistent storage.
    pub fn commit(&self) -> LedgerResult<()> {
        if let Some(storage) = &self.inner.persistent {
            storage.commit()?;
        }
        Ok(())
    }

    pub fn close(&self) -> LedgerResult<()> {
        for entry in self.inner.queues.iter() {
            entry.value().mark_disposed();
        }
        self.inner.queues.clear();
        self.inner.transient.close()?;
        if let Some(storage) = &self.inner.persistent {
            storage.commit()?;
            storage.close()?;
        }
        Ok(())
    }
}

impl QueueProvider for QueueRegistry {
    fn get_queue(&self, name: &str) -> LedgerResult<QueueStore> {
        if let Some(store) = self.inner.queues.get(name) {
            return Ok(store.value().clone());
        }

        let entry = self
            .inner
            .queues
            .entry(name.to_string())
            .or_try_insert_with(|| self.inner.create_queue(name))?;
        Ok(entry.value().clone())
    }

    fn get_recovery_queue(&self, name: &str) -> LedgerResult<RecoverableQueueStore> {
        Ok(RecoverableQueueStore::new(self.get_queue(name)?))
    }
}

struct QueueRegistryInner {
    config: QueueManagerConfig,
    queues: DashMap<String, QueueStore>,
    transient: QueueStorage,
    persistent: Option<QueueStorage>,
}

impl QueueRegistryInner {
    fn create_queue(&self, name: &str) -> LedgerResult<QueueStore> {
        if name.is_empty() {
            log::error!("Queue name cannot be empty");
            return Err(LedgerError::new(
                "Queue name cannot be empty",
                ErrorKind::InvalidOperation,
            ));
        }

        let config = self.config.queue_config(name);
        config.validate()?;

        let storage = match (&self.persistent, config.is_persistent()) {
            (Some(persistent), true) => persistent,
            (None, true) => {
                log::warn!(
                    "Queue '{}' is configured as persistent but no storage module is loaded, \
                     keeping it in memory",
                    name
                );
                &self.transient
            }
            (_, false) => &self.transient,
        };

        let backend = storage.open_queue(name)?;
        let store = QueueStore::new(name, backend, &config);
        log::debug!("Queue '{}' created: {:?}", name, store);
        Ok(store)
    }

    fn storage_for(&self, store: &QueueStore) -> &QueueStorage {
        match &self.persistent {
            Some(persistent) if self.config.queue_config(store.name()).is_persistent() => {
                persistent
            }
            _ => &self.transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Payload;
    use crate::store::memory::InMemoryStorageModule;
    use crate::store::{QueueConfig, StorageModule};
    use std::time::Duration;

    fn registry(config: QueueManagerConfig) -> QueueRegistry {
        QueueRegistry::new(config).unwrap()
    }

    #[test]
    fn test_get_queue_returns_same_store() {
        let registry = registry(QueueManagerConfig::new());
        let a = registry.get_queue("orders").unwrap();
        let b = registry.get_queue("orders").unwrap();
        assert!(a.is_same(&b));
        assert!(registry.has_queue("orders"));
        assert_eq!(registry.queue_names(), HashSet::from(["orders".to_string()]));
    }

    #[test]
    fn test_recovery_queue_shares_store() {
        let registry = registry(QueueManagerConfig::new());
        let queue = registry.get_queue("orders").unwrap();
        let recovery = registry.get_recovery_queue("orders").unwrap();
        recovery.apply_add(Payload::text("A")).unwrap();
        assert_eq!(queue.size().unwrap(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = registry(QueueManagerConfig::new());
        let err = registry.get_queue("").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_queue_config_applied() {
        let config = QueueManagerConfig::new();
        config
            .set_queue_config("bounded", QueueConfig::new(Some(1), false))
            .unwrap();
        let registry = registry(config);
        let queue = registry.get_queue("bounded").unwrap();
        assert_eq!(queue.capacity(), Some(1));
        assert_eq!(registry.get_queue("free").unwrap().capacity(), None);
    }

    #[test]
    fn test_persistent_queue_falls_back_to_memory() {
        let config = QueueManagerConfig::new();
        config.set_default_queue_config(QueueConfig::persistent()).unwrap();
        let registry = registry(config);
        let queue = registry.get_queue("orders").unwrap();
        assert!(!queue.is_persistent());
    }

    #[test]
    fn test_persistent_queue_uses_storage_module() {
        let module = InMemoryStorageModule::new();
        let config = QueueManagerConfig::new();
        config.set_queue_config("kept", QueueConfig::persistent()).unwrap();
        config.load_module(module.clone()).unwrap();

        let registry = registry(config);
        let kept = registry.get_queue("kept").unwrap();
        kept.put(Payload::text("A"), Duration::ZERO).unwrap();

        let storage = module.get_storage().unwrap();
        assert!(storage.has_queue("kept").unwrap());
        assert!(!storage.has_queue("other").unwrap());
        registry.get_queue("other").unwrap();
        assert!(!storage.has_queue("other").unwrap());
    }

    #[test]
    fn test_dispose_queue() {
        let registry = registry(QueueManagerConfig::new());
        let queue = registry.get_queue("orders").unwrap();
        queue.put(Payload::text("A"), Duration::ZERO).unwrap();

        registry.dispose_queue("orders").unwrap();
        assert!(queue.is_disposed());
        assert!(!registry.has_queue("orders"));

        let fresh = registry.get_queue("orders").unwrap();
        assert!(fresh.is_empty().unwrap());
    }

    #[test]
    fn test_close_disposes_handles() {
        let registry = registry(QueueManagerConfig::new());
        let queue = registry.get_queue("orders").unwrap();
        registry.close().unwrap();
        assert!(queue.is_disposed());
        assert!(registry.queue_names().is_empty());
    }
}
