use crate::errors::{LedgerError, LedgerResult};
use crate::queue_manager::QueueManager;
use crate::queue_manager_config::QueueManagerConfig;
use crate::store::{QueueConfig, StorageModule};
use std::path::Path;
use std::time::Duration;

/// Builder for a [`QueueManager`].
///
/// Each setter records the first configuration error it runs into; [`open`](Self::open)
/// returns that error instead of opening the manager.
///
/// # Examples
///
/// ```rust,ignore
/// use ledgerq::QueueManager;
/// use ledgerq::store::QueueConfig;
///
/// let manager = QueueManager::builder()
///     .journal_dir("/var/lib/app/journal")
///     .default_queue_config(QueueConfig::persistent())
///     .queue_config("audit", QueueConfig::transient().with_capacity(1000))
///     .open()?;
/// ```
#[derive(Default)]
pub struct QueueManagerBuilder {
    error: Option<LedgerError>,
    config: QueueManagerConfig,
}

impl QueueManagerBuilder {
    pub fn new() -> Self {
        QueueManagerBuilder {
            error: None,
            config: QueueManagerConfig::new(),
        }
    }

    /// Directory holding the journal. Required.
    pub fn journal_dir<P: AsRef<Path>>(self, dir: P) -> Self {
        let config = self.config.clone();
        self.apply(|| config.set_journal_dir(dir))
    }

    /// Whether each journal write is synced to disk before it returns. Defaults to `true`.
    pub fn journal_sync(self, sync: bool) -> Self {
        let config = self.config.clone();
        self.apply(|| config.set_journal_sync(sync))
    }

    /// Number of resolved transactions that triggers a journal compaction. `0` turns
    /// runtime compaction off.
    pub fn compaction_threshold(self, threshold: usize) -> Self {
        let config = self.config.clone();
        self.apply(|| config.set_compaction_threshold(threshold))
    }

    pub fn commit_apply_timeout(self, timeout: Duration) -> Self {
        let config = self.config.clone();
        self.apply(|| config.set_commit_apply_timeout(timeout))
    }

    pub fn default_queue_config(self, queue_config: QueueConfig) -> Self {
        let config = self.config.clone();
        self.apply(|| config.set_default_queue_config(queue_config))
    }

    pub fn queue_config(self, name: &str, queue_config: QueueConfig) -> Self {
        let config = self.config.clone();
        self.apply(|| config.set_queue_config(name, queue_config))
    }

    /// Loads the storage module used by persistent queues.
    pub fn load_module<T: StorageModule + 'static>(self, module: T) -> Self {
        let config = self.config.clone();
        self.apply(|| config.load_module(module))
    }

    /// Validates the configuration and opens the manager. The manager still has to be
    /// [started](QueueManager::start) before transactions can begin.
    pub fn open(self) -> LedgerResult<QueueManager> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.config.initialize()?;
        QueueManager::new(self.config)
    }

    fn apply<F>(mut self, setter: F) -> Self
    where
        F: FnOnce() -> LedgerResult<()>,
    {
        if self.error.is_none() {
            if let Err(e) = setter() {
                self.error = Some(e);
            }
        }
        self
    }
}
