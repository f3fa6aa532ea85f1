use crate::errors::{ErrorKind, LedgerError, LedgerResult};

/// Per-queue settings.
///
/// A queue may be bounded, in which case blocking offers wait for room, and may be
/// persistent, in which case its elements live in the configured storage module rather
/// than in memory.
///
/// # Examples
///
/// ```rust
/// use ledgerq::store::QueueConfig;
///
/// let config = QueueConfig::new(Some(100), true);
/// assert_eq!(config.capacity(), Some(100));
/// assert!(config.is_persistent());
///
/// let unbounded = QueueConfig::default();
/// assert_eq!(unbounded.capacity(), None);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueConfig {
    capacity: Option<usize>,
    persistent: bool,
}

impl QueueConfig {
    pub fn new(capacity: Option<usize>, persistent: bool) -> Self {
        QueueConfig {
            capacity,
            persistent,
        }
    }

    /// An unbounded queue kept in memory.
    pub fn transient() -> Self {
        QueueConfig::new(None, false)
    }

    /// An unbounded queue kept in the storage module.
    pub fn persistent() -> Self {
        QueueConfig::new(None, true)
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub(crate) fn validate(&self) -> LedgerResult<()> {
        if self.capacity == Some(0) {
            log::error!("Queue capacity must be greater than zero");
            return Err(LedgerError::new(
                "Queue capacity must be greater than zero",
                ErrorKind::InvalidConfiguration,
            ));
        }
        Ok(())
    }
}
