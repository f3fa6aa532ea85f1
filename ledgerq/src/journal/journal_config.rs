use crate::common::{DEFAULT_COMPACTION_THRESHOLD, JOURNAL_COMPACTION_SUFFIX, JOURNAL_FILE_NAME};
use std::path::{Path, PathBuf};

/// Location and write policy of a transaction journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalConfig {
    dir: PathBuf,
    file_name: String,
    sync_on_append: bool,
    compaction_threshold: usize,
}

impl JournalConfig {
    /// A journal named [`JOURNAL_FILE_NAME`] in `dir`, syncing every record.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        JournalConfig {
            dir: dir.as_ref().to_path_buf(),
            file_name: JOURNAL_FILE_NAME.to_string(),
            sync_on_append: true,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
        }
    }

    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.file_name = file_name.to_string();
        self
    }

    /// Turning this off trades durability for speed; only meant for tests and benchmarks.
    pub fn with_sync_on_append(mut self, sync: bool) -> Self {
        self.sync_on_append = sync;
        self
    }

    /// Number of resolved transactions that triggers a runtime compaction. Zero disables it.
    pub fn with_compaction_threshold(mut self, threshold: usize) -> Self {
        self.compaction_threshold = threshold;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn sync_on_append(&self) -> bool {
        self.sync_on_append
    }

    pub fn compaction_threshold(&self) -> usize {
        self.compaction_threshold
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub(crate) fn compaction_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}", self.file_name, JOURNAL_COMPACTION_SUFFIX))
    }
}
