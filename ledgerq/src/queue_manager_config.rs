//! Configuration management for the queue manager.

use crate::common::{DEFAULT_COMMIT_APPLY_TIMEOUT_MS, DEFAULT_COMPACTION_THRESHOLD};
use crate::errors::{ErrorKind, LedgerError, LedgerResult};
use crate::journal::JournalConfig;
use crate::store::{QueueConfig, StorageModule};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Settings of a [`QueueManager`](crate::QueueManager).
///
/// Cloned configs share state. Everything except per-queue overrides is frozen once the
/// manager has been opened; later changes fail with [`ErrorKind::InvalidOperation`].
#[derive(Clone)]
pub struct QueueManagerConfig {
    inner: Arc<QueueManagerConfigInner>,
}

impl Default for QueueManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueManagerConfig {
    pub fn new() -> Self {
        QueueManagerConfig {
            inner: Arc::new(QueueManagerConfigInner::new()),
        }
    }

    pub fn set_journal_dir<P: AsRef<Path>>(&self, dir: P) -> LedgerResult<()> {
        self.inner.set_journal_dir(dir.as_ref())
    }

    pub fn journal_dir(&self) -> Option<PathBuf> {
        self.inner.journal_dir.get().cloned()
    }

    pub fn set_journal_sync(&self, sync: bool) -> LedgerResult<()> {
        self.inner.check_not_configured("journal sync policy")?;
        self.inner.journal_sync.store(sync, Ordering::Relaxed);
        Ok(())
    }

    pub fn journal_sync(&self) -> bool {
        self.inner.journal_sync.load(Ordering::Relaxed)
    }

    pub fn set_compaction_threshold(&self, threshold: usize) -> LedgerResult<()> {
        self.inner.check_not_configured("compaction threshold")?;
        self.inner
            .compaction_threshold
            .store(threshold, Ordering::Relaxed);
        Ok(())
    }

    pub fn compaction_threshold(&self) -> usize {
        self.inner.compaction_threshold.load(Ordering::Relaxed)
    }

    pub fn set_commit_apply_timeout(&self, timeout: Duration) -> LedgerResult<()> {
        self.inner.check_not_configured("commit apply timeout")?;
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.inner
            .commit_apply_timeout_ms
            .store(millis, Ordering::Relaxed);
        Ok(())
    }

    /// How long a commit waits for room in a bounded queue before forcing its additions in.
    pub fn commit_apply_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.commit_apply_timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_default_queue_config(&self, config: QueueConfig) -> LedgerResult<()> {
        self.inner.check_not_configured("default queue configuration")?;
        config.validate()?;
        *self.inner.default_queue_config.write() = config;
        Ok(())
    }

    pub fn default_queue_config(&self) -> QueueConfig {
        self.inner.default_queue_config.read().clone()
    }

    /// Overrides the settings of one queue. Applies to the queue the next time it is
    /// created, so set it before first use.
    pub fn set_queue_config(&self, name: &str, config: QueueConfig) -> LedgerResult<()> {
        if name.is_empty() {
            log::error!("Queue name cannot be empty");
            return Err(LedgerError::new(
                "Queue name cannot be empty",
                ErrorKind::InvalidConfiguration,
            ));
        }
        config.validate()?;
        self.inner.queue_configs.insert(name.to_string(), config);
        Ok(())
    }

    /// Returns the override for `name`, or the default.
    pub fn queue_config(&self, name: &str) -> QueueConfig {
        match self.inner.queue_configs.get(name) {
            Some(config) => config.value().clone(),
            None => self.default_queue_config(),
        }
    }

    pub fn load_module<T: StorageModule + 'static>(&self, module: T) -> LedgerResult<()> {
        self.inner.check_not_configured("storage module")?;
        if self.inner.storage_module.set(Arc::new(module)).is_err() {
            log::error!("A storage module is already loaded");
            return Err(LedgerError::new(
                "A storage module is already loaded",
                ErrorKind::InvalidConfiguration,
            ));
        }
        Ok(())
    }

    pub fn storage_module(&self) -> Option<Arc<dyn StorageModule>> {
        self.inner.storage_module.get().cloned()
    }

    /// Journal settings derived from this configuration.
    pub fn journal_config(&self) -> LedgerResult<JournalConfig> {
        match self.journal_dir() {
            Some(dir) => Ok(JournalConfig::new(dir)
                .with_sync_on_append(self.journal_sync())
                .with_compaction_threshold(self.compaction_threshold())),
            None => {
                log::error!("No journal directory is configured");
                Err(LedgerError::new(
                    "No journal directory is configured",
                    ErrorKind::InvalidConfiguration,
                ))
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.configured.load(Ordering::Relaxed)
    }

    pub(crate) fn initialize(&self) -> LedgerResult<()> {
        self.journal_config()?;
        self.inner.configured.store(true, Ordering::Relaxed);
        Ok(())
    }
}

struct QueueManagerConfigInner {
    configured: AtomicBool,
    journal_dir: OnceLock<PathBuf>,
    journal_sync: AtomicBool,
    compaction_threshold: AtomicUsize,
    commit_apply_timeout_ms: AtomicU64,
    default_queue_config: RwLock<QueueConfig>,
    queue_configs: DashMap<String, QueueConfig>,
    storage_module: OnceLock<Arc<dyn StorageModule>>,
}

impl QueueManagerConfigInner {
    fn new() -> Self {
        QueueManagerConfigInner {
            configured: AtomicBool::new(false),
            journal_dir: OnceLock::new(),
            journal_sync: AtomicBool::new(true),
            compaction_threshold: AtomicUsize::new(DEFAULT_COMPACTION_THRESHOLD),
            commit_apply_timeout_ms: AtomicU64::new(DEFAULT_COMMIT_APPLY_TIMEOUT_MS),
            default_queue_config: RwLock::new(QueueConfig::default()),
            queue_configs: DashMap::new(),
            storage_module: OnceLock::new(),
        }
    }

    fn set_journal_dir(&self, dir: &Path) -> LedgerResult<()> {
        self.check_not_configured("journal directory")?;
        if dir.as_os_str().is_empty() {
            log::error!("Journal directory cannot be empty");
            return Err(LedgerError::new(
                "Journal directory cannot be empty",
                ErrorKind::InvalidConfiguration,
            ));
        }
        if self.journal_dir.set(dir.to_path_buf()).is_err() {
            log::error!("Journal directory is already set");
            return Err(LedgerError::new(
                "Journal directory is already set",
                ErrorKind::InvalidConfiguration,
            ));
        }
        Ok(())
    }

    fn check_not_configured(&self, what: &str) -> LedgerResult<()> {
        if self.configured.load(Ordering::Relaxed) {
            log::error!("Cannot change the {} after the queue manager is opened", what);
            return Err(LedgerError::new(
                &format!("Cannot change the {} after the queue manager is opened", what),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }
}
