use crate::config::FjallConfig;
use crate::storage::FjallQueueStorage;
use fjall::CompressionType;
use ledgerq::errors::LedgerResult;
use ledgerq::store::{QueueStorage, StorageModule};

/// ledgerq storage module backed by the Fjall key-value store.
///
/// Load it into a queue manager to make persistent queues survive a process restart.
/// Every queue configured as persistent becomes one partition of a single Fjall keyspace.
///
/// # Examples
///
/// ```rust,ignore
/// use ledgerq::QueueManager;
/// use ledgerq::store::QueueConfig;
/// use ledgerq_fjall_adapter::FjallModule;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = QueueManager::builder()
///     .journal_dir("/var/lib/app/journal")
///     .default_queue_config(QueueConfig::persistent())
///     .load_module(FjallModule::with_config().db_path("/var/lib/app/queues").build())
///     .open()?;
/// manager.start()?;
/// # Ok(())
/// # }
/// ```
///
/// # Configuration Presets
///
/// - `production_preset()` - Larger caches and a background fsync interval
/// - `low_memory_preset()` - Small caches and a single worker of each kind
pub struct FjallModule {
    storage: FjallQueueStorage,
}

impl FjallModule {
    #[inline]
    pub fn with_config() -> FjallModuleBuilder {
        FjallModuleBuilder::new()
    }

    pub fn config(&self) -> FjallConfig {
        self.storage.config()
    }
}

impl StorageModule for FjallModule {
    fn get_storage(&self) -> LedgerResult<QueueStorage> {
        Ok(QueueStorage::new(self.storage.clone()))
    }
}

/// Builder for a [`FjallModule`].
pub struct FjallModuleBuilder {
    store_config: FjallConfig,
}

impl Default for FjallModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FjallModuleBuilder {
    #[inline]
    pub fn new() -> FjallModuleBuilder {
        FjallModuleBuilder {
            store_config: FjallConfig::new(),
        }
    }

    /// Applies settings suited to a production server:
    /// - 256 MB block cache
    /// - 128 MB write buffer and 32 MB memtables
    /// - All CPU cores for flushing, half of them for compaction
    /// - 100ms background fsync interval
    /// - LZ4 compression
    #[inline]
    pub fn production_preset(self) -> Self {
        let cpus = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(4);

        self.block_cache_capacity(256 * 1024 * 1024)
            .max_write_buffer_size(128 * 1024 * 1024)
            .max_memtable_size(32 * 1024 * 1024)
            .flush_workers(cpus)
            .compaction_workers((cpus / 2).max(1))
            .bloom_filter_bits(10)
            .fsync_frequency(100)
            .compression_type(CompressionType::Lz4)
    }

    /// Applies settings for memory constrained environments, trading speed for a small
    /// footprint.
    #[inline]
    pub fn low_memory_preset(self) -> Self {
        self.block_cache_capacity(16 * 1024 * 1024)
            .max_write_buffer_size(32 * 1024 * 1024)
            .max_memtable_size(8 * 1024 * 1024)
            .flush_workers(1)
            .compaction_workers(1)
            .bloom_filter_bits(10)
    }

    #[inline]
    pub fn db_path(self, db_path: &str) -> Self {
        self.store_config.set_db_path(db_path);
        self
    }

    /// Whether each queue mutation is synced to disk before it returns. Defaults to
    /// `true`; turning it off means a crash can lose applied queue changes that the
    /// journal no longer describes.
    #[inline]
    pub fn sync_on_write(self, sync_on_write: bool) -> Self {
        self.store_config.set_sync_on_write(sync_on_write);
        self
    }

    #[inline]
    pub fn manual_journal_persist(self, manual_journal_persist: bool) -> Self {
        self.store_config
            .set_manual_journal_persist(manual_journal_persist);
        self
    }

    #[inline]
    pub fn flush_workers(self, flush_workers_count: usize) -> Self {
        self.store_config.set_flush_workers(flush_workers_count);
        self
    }

    #[inline]
    pub fn compaction_workers(self, compaction_workers_count: usize) -> Self {
        self.store_config
            .set_compaction_workers(compaction_workers_count);
        self
    }

    #[inline]
    pub fn block_cache_capacity(self, block_cache_capacity: u64) -> Self {
        self.store_config
            .set_block_cache_capacity(block_cache_capacity);
        self
    }

    #[inline]
    pub fn max_journaling_size(self, max_journaling_size: u64) -> Self {
        self.store_config.set_max_journaling_size(max_journaling_size);
        self
    }

    #[inline]
    pub fn max_write_buffer_size(self, max_write_buffer_size: u64) -> Self {
        self.store_config
            .set_max_write_buffer_size(max_write_buffer_size);
        self
    }

    #[inline]
    pub fn fsync_frequency(self, fsync_frequency: u16) -> Self {
        self.store_config.set_fsync_frequency(fsync_frequency);
        self
    }

    #[inline]
    pub fn bloom_filter_bits(self, bloom_filter_bits: u8) -> Self {
        self.store_config
            .set_bloom_filter_bits(bloom_filter_bits as i8);
        self
    }

    #[inline]
    pub fn no_bloom_filter(self) -> Self {
        self.store_config.set_bloom_filter_bits(-1);
        self
    }

    #[inline]
    pub fn compression_type(self, compression_type: CompressionType) -> Self {
        self.store_config.set_compression_type(compression_type);
        self
    }

    #[inline]
    pub fn max_memtable_size(self, max_memtable_size: u32) -> Self {
        self.store_config.set_max_memtable_size(max_memtable_size);
        self
    }

    #[inline]
    pub fn block_size(self, block_size: u32) -> Self {
        self.store_config.set_block_size(block_size);
        self
    }

    #[inline]
    pub fn build(self) -> FjallModule {
        FjallModule {
            storage: FjallQueueStorage::new(self.store_config),
        }
    }
}
