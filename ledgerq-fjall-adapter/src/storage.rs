use crate::backend::FjallQueueBackend;
use crate::config::FjallConfig;
use crate::version::fjall_version;
use crate::wrapper::to_ledger_error;
use dashmap::DashMap;
use fjall::{Keyspace, PersistMode};
use ledgerq::errors::{ErrorKind, LedgerError, LedgerResult};
use ledgerq::store::{QueueBackend, QueueStorageProvider};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Persistent queue storage on top of the Fjall LSM engine.
///
/// # Characteristics
/// - One Fjall keyspace per storage, opened lazily by `open_or_create`
/// - One partition per queue; partition names are an escaped form of the queue name
/// - Backends are cached, so every caller opening a queue shares its head and tail
///
/// Clones share the same keyspace and queue registry.
#[derive(Clone)]
pub struct FjallQueueStorage {
    inner: Arc<FjallQueueStorageInner>,
}

impl FjallQueueStorage {
    pub fn new(config: FjallConfig) -> FjallQueueStorage {
        FjallQueueStorage {
            inner: Arc::new(FjallQueueStorageInner::new(config)),
        }
    }

    pub fn config(&self) -> FjallConfig {
        self.inner.config.clone()
    }

    /// Escapes a queue name into a valid partition name.
    ///
    /// ASCII alphanumerics and `-` are kept; every other byte becomes `_` followed by its
    /// two-digit lowercase hex value.
    pub(crate) fn encode_name(name: &str) -> String {
        let mut encoded = String::with_capacity(name.len());
        for byte in name.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                encoded.push(byte as char);
            } else {
                encoded.push_str(&format!("_{:02x}", byte));
            }
        }
        encoded
    }

    /// Reverses [`encode_name`](Self::encode_name). Returns `None` for names this storage
    /// did not produce.
    pub(crate) fn decode_name(encoded: &str) -> Option<String> {
        let bytes = encoded.as_bytes();
        let mut decoded = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'_' {
                let hex = encoded.get(i + 1..i + 3)?;
                decoded.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            } else {
                decoded.push(bytes[i]);
                i += 1;
            }
        }
        String::from_utf8(decoded).ok()
    }
}

impl QueueStorageProvider for FjallQueueStorage {
    fn open_or_create(&self) -> LedgerResult<()> {
        self.inner.open_or_create()
    }

    fn is_closed(&self) -> LedgerResult<bool> {
        Ok(self.inner.closed.load(Ordering::Acquire))
    }

    fn has_queue(&self, name: &str) -> LedgerResult<bool> {
        let keyspace = self.inner.keyspace()?;
        Ok(keyspace.partition_exists(&Self::encode_name(name)))
    }

    fn queue_names(&self) -> LedgerResult<HashSet<String>> {
        let keyspace = self.inner.keyspace()?;
        Ok(keyspace
            .list_partitions()
            .iter()
            .filter_map(|partition| Self::decode_name(partition))
            .collect())
    }

    fn open_queue(&self, name: &str) -> LedgerResult<QueueBackend> {
        self.inner.open_queue(name)
    }

    fn remove_queue(&self, name: &str) -> LedgerResult<()> {
        self.inner.remove_queue(name)
    }

    fn commit(&self) -> LedgerResult<()> {
        let keyspace = self.inner.keyspace()?;
        keyspace.persist(PersistMode::SyncAll).map_err(|err| {
            log::error!("Failed to commit keyspace: {}", err);
            to_ledger_error(err)
        })
    }

    fn close(&self) -> LedgerResult<()> {
        self.inner.close()
    }

    fn store_version(&self) -> LedgerResult<String> {
        let version = fjall_version().map_err(|err| {
            log::error!("Failed to read the fjall version: {}", err);
            LedgerError::new(&err, ErrorKind::BackendError)
        })?;
        Ok(format!("Fjall/{}", version))
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

struct FjallQueueStorageInner {
    config: FjallConfig,
    keyspace: RwLock<Option<Keyspace>>,
    closed: AtomicBool,
    queue_registry: DashMap<String, QueueBackend>,
}

impl FjallQueueStorageInner {
    fn new(config: FjallConfig) -> FjallQueueStorageInner {
        FjallQueueStorageInner {
            config,
            keyspace: RwLock::new(None),
            closed: AtomicBool::new(false),
            queue_registry: DashMap::new(),
        }
    }

    fn open_or_create(&self) -> LedgerResult<()> {
        let mut keyspace = self.keyspace.write();
        if keyspace.is_none() {
            if self.config.db_path().is_empty() {
                log::error!("Fjall database path is not set");
                return Err(LedgerError::new(
                    "Fjall database path is not set",
                    ErrorKind::InvalidConfiguration,
                ));
            }

            let opened = Keyspace::open(self.config.keyspace_config()).map_err(|err| {
                log::error!("Failed to open or create keyspace: {}", err);
                to_ledger_error(err)
            })?;
            log::debug!("Opened fjall keyspace at {}", self.config.db_path());
            *keyspace = Some(opened);
        }
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    fn keyspace(&self) -> LedgerResult<Keyspace> {
        match self.keyspace.read().as_ref() {
            Some(keyspace) => Ok(keyspace.clone()),
            None if self.closed.load(Ordering::Acquire) => {
                log::error!("Fjall queue storage is closed");
                Err(LedgerError::new(
                    "Fjall queue storage is closed",
                    ErrorKind::StoreAlreadyClosed,
                ))
            }
            None => {
                log::error!("Fjall queue storage is not opened");
                Err(LedgerError::new(
                    "Fjall queue storage is not opened",
                    ErrorKind::StoreNotInitialized,
                ))
            }
        }
    }

    fn open_queue(&self, name: &str) -> LedgerResult<QueueBackend> {
        if let Some(backend) = self.queue_registry.get(name) {
            return Ok(backend.clone());
        }

        let keyspace = self.keyspace()?;
        let partition_name = FjallQueueStorage::encode_name(name);
        let partition = keyspace
            .open_partition(&partition_name, self.config.partition_config())
            .map_err(|err| {
                log::error!("Failed to open partition for queue {}: {}", name, err);
                to_ledger_error(err)
            })?;

        let entry = self.queue_registry.entry(name.to_string());
        let backend = entry
            .or_try_insert_with(|| {
                let backend = FjallQueueBackend::new(
                    name,
                    keyspace,
                    partition,
                    self.config.sync_on_write(),
                )?;
                Ok::<_, LedgerError>(QueueBackend::new(backend))
            })?
            .clone();
        Ok(backend)
    }

    fn remove_queue(&self, name: &str) -> LedgerResult<()> {
        self.queue_registry.remove(name);

        let keyspace = self.keyspace()?;
        let partition_name = FjallQueueStorage::encode_name(name);
        if !keyspace.partition_exists(&partition_name) {
            return Ok(());
        }

        let partition = keyspace
            .open_partition(&partition_name, self.config.partition_config())
            .map_err(|err| {
                log::error!("Failed to open partition for removal: {}", err);
                to_ledger_error(err)
            })?;
        keyspace.delete_partition(partition).map_err(|err| {
            log::error!("Failed to remove partition of queue {}: {}", name, err);
            to_ledger_error(err)
        })
    }

    fn close(&self) -> LedgerResult<()> {
        let mut keyspace = self.keyspace.write();
        if let Some(ks) = keyspace.take() {
            if let Err(err) = ks.persist(PersistMode::SyncAll) {
                log::error!("Failed to persist keyspace on close: {}", err);
                self.queue_registry.clear();
                self.closed.store(true, Ordering::Release);
                return Err(to_ledger_error(err));
            }
        }
        self.queue_registry.clear();
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
