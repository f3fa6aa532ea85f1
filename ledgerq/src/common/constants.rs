// journal constants
pub const JOURNAL_FILE_NAME: &str = "ledgerq.journal";
pub const JOURNAL_COMPACTION_SUFFIX: &str = ".compacting";
pub const JOURNAL_MAGIC: u32 = 0x4C51_4A31;
pub const JOURNAL_FORMAT_VERSION: u16 = 2;
pub const FRAME_HEADER_SIZE: usize = 12;
pub const MAX_FRAME_SIZE: u32 = 256 * 1024 * 1024;

// compaction constants
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 256;

// payload constants
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

// queue constants
pub const DEFAULT_COMMIT_APPLY_TIMEOUT_MS: u64 = 1000;

pub const LEDGERQ_VERSION: &str = env!("CARGO_PKG_VERSION");
