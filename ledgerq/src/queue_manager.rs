use crate::errors::{ErrorKind, LedgerError, LedgerResult};
use crate::journal::TransactionJournal;
use crate::provider::{QueueProvider, QueueRegistry};
use crate::queue_manager_builder::QueueManagerBuilder;
use crate::queue_manager_config::QueueManagerConfig;
use crate::recovery::{Recoverer, RecoveryReport, RecoveryState};
use crate::store::QueueStore;
use crate::transaction::{ActiveTransactions, TransactionContext};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Embedded transactional queue manager.
///
/// `QueueManager` owns the queues, the journal and the recovery run. Cloning it is cheap,
/// every clone shares the same state through `Arc<QueueManagerInner>`.
///
/// # Lifecycle
///
/// ```text
/// open (builder) -> start() -> stop() -> start() -> ... -> close()
/// ```
///
/// [`start`](Self::start) opens the journal and runs recovery; transactions can begin
/// once it returns. [`stop`](Self::stop) closes the journal but keeps the live queues, so a
/// later `start` is a warm restart.
///
/// # Examples
///
/// ```rust,ignore
/// use ledgerq::QueueManager;
/// use ledgerq::common::Payload;
/// use std::time::Duration;
///
/// let manager = QueueManager::builder()
///     .journal_dir("/var/lib/app/journal")
///     .open()?;
/// manager.start()?;
///
/// let tx = manager.begin_transaction()?;
/// tx.offer("jobs", Payload::text("resize"), Duration::from_secs(1))?;
/// tx.commit()?;
///
/// manager.close()?;
/// ```
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<QueueManagerInner>,
}

impl QueueManager {
    pub fn builder() -> QueueManagerBuilder {
        QueueManagerBuilder::new()
    }

    pub(crate) fn new(config: QueueManagerConfig) -> LedgerResult<Self> {
        let registry = QueueRegistry::new(config.clone())?;
        Ok(QueueManager {
            inner: Arc::new(QueueManagerInner {
                config,
                provider: Arc::new(registry.clone()),
                registry,
                running: RwLock::new(None),
                active: ActiveTransactions::default(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Opens the journal and recovers the queues from it.
    ///
    /// # Returns
    /// * `Ok(RecoveryReport)` once recovery is done and transactions may begin
    /// * `Err(LedgerError)` of kind `RecoveryError` if the journal cannot be opened or
    ///   replayed; the manager stays stopped
    pub fn start(&self) -> LedgerResult<RecoveryReport> {
        self.inner.check_opened()?;
        self.inner.start()
    }

    /// Closes the journal. Refused while transactions are still open.
    pub fn stop(&self) -> LedgerResult<()> {
        self.inner.check_opened()?;
        self.inner.stop()
    }

    pub fn close(&self) -> LedgerResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.stop()?;
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.registry.close()?;
        log::debug!("Queue manager closed");
        Ok(())
    }

    /// Begins a transaction.
    ///
    /// # Errors
    /// * `RecoveryInProgress` while recovery runs
    /// * `InvalidOperation` if the manager is not started
    pub fn begin_transaction(&self) -> LedgerResult<TransactionContext> {
        self.inner.check_opened()?;
        self.inner.begin_transaction()
    }

    /// Returns the non-transactional handle of a queue, creating the queue on first use.
    pub fn queue(&self, name: &str) -> LedgerResult<QueueStore> {
        self.inner.check_opened()?;
        self.inner.registry.get_queue(name)
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.inner.registry.has_queue(name)
    }

    pub fn queue_names(&self) -> HashSet<String> {
        self.inner.registry.queue_names()
    }

    /// Deletes a queue and its elements.
    pub fn dispose_queue(&self, name: &str) -> LedgerResult<()> {
        self.inner.check_opened()?;
        self.inner.registry.dispose_queue(name)
    }

    pub fn recovery_state(&self) -> RecoveryState {
        match &*self.inner.running.read() {
            Some(running) => running.recoverer.state(),
            None => RecoveryState::NotStarted,
        }
    }

    /// The journal of the current run, if started.
    pub fn journal(&self) -> Option<TransactionJournal> {
        self.inner
            .running
            .read()
            .as_ref()
            .map(|running| running.journal.clone())
    }

    pub fn is_started(&self) -> bool {
        self.inner.running.read().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of transactions begun and not yet committed or rolled back.
    pub fn active_transactions(&self) -> usize {
        self.inner.active.count()
    }

    pub fn config(&self) -> QueueManagerConfig {
        self.inner.config.clone()
    }
}

impl Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("started", &self.is_started())
            .field("closed", &self.is_closed())
            .field("active_transactions", &self.active_transactions())
            .field("recovery_state", &self.recovery_state())
            .finish()
    }
}

struct QueueManagerInner {
    config: QueueManagerConfig,
    registry: QueueRegistry,
    provider: Arc<dyn QueueProvider>,
    running: RwLock<Option<Running>>,
    active: ActiveTransactions,
    closed: AtomicBool,
}

struct Running {
    journal: TransactionJournal,
    recoverer: Arc<Recoverer>,
}

impl QueueManagerInner {
    fn start(&self) -> LedgerResult<RecoveryReport> {
        let recoverer = {
            let mut running = self.running.write();
            if running.is_some() {
                log::error!("Queue manager is already started");
                return Err(LedgerError::new(
                    "Queue manager is already started",
                    ErrorKind::InvalidOperation,
                ));
            }

            let journal_config = self.config.journal_config()?;
            let journal = TransactionJournal::open(journal_config).map_err(|e| {
                log::error!("Failed to open the journal: {}", e);
                LedgerError::new_with_cause(
                    "Failed to open the journal",
                    ErrorKind::RecoveryError,
                    e,
                )
            })?;

            let recoverer = Arc::new(Recoverer::new(journal.clone(), self.provider.clone()));
            *running = Some(Running {
                journal,
                recoverer: recoverer.clone(),
            });
            recoverer
        };

        // transactions see RUNNING while this lock is released
        match recoverer.run() {
            Ok(report) => {
                log::debug!("Queue manager started");
                Ok(report)
            }
            Err(e) => {
                if let Some(running) = self.running.write().take() {
                    if let Err(ce) = running.journal.close() {
                        log::warn!("Failed to close the journal after a failed recovery: {}", ce);
                    }
                }
                Err(e)
            }
        }
    }

    fn stop(&self) -> LedgerResult<()> {
        let mut running = self.running.write();
        let active = self.active.count();
        if active > 0 {
            log::error!("Cannot stop the queue manager, {} transactions are still open", active);
            return Err(LedgerError::new(
                &format!(
                    "Cannot stop the queue manager, {} transactions are still open",
                    active
                ),
                ErrorKind::InvalidOperation,
            ));
        }

        if let Some(current) = running.take() {
            current.journal.close()?;
            self.registry.commit()?;
            log::debug!("Queue manager stopped");
        }
        Ok(())
    }

    fn begin_transaction(&self) -> LedgerResult<TransactionContext> {
        let running = self.running.read();
        let current = match &*running {
            Some(current) => current,
            None => {
                log::error!("Queue manager is not started");
                return Err(LedgerError::new(
                    "Queue manager is not started",
                    ErrorKind::InvalidOperation,
                ));
            }
        };

        match current.recoverer.state() {
            RecoveryState::Done => {}
            state => {
                log::error!("Cannot begin a transaction while recovery is {}", state);
                return Err(LedgerError::new(
                    &format!("Cannot begin a transaction while recovery is {}", state),
                    ErrorKind::RecoveryInProgress,
                ));
            }
        }

        let context = TransactionContext::new(
            current.journal.clone(),
            self.provider.clone(),
            self.config.commit_apply_timeout(),
        );
        Ok(context.with_guard(self.active.register()))
    }

    fn check_opened(&self) -> LedgerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            log::error!("Queue manager is closed");
            return Err(LedgerError::new(
                "Queue manager is closed",
                ErrorKind::StoreAlreadyClosed,
            ));
        }
        Ok(())
    }
}
