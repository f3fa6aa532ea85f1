use crate::errors::{ErrorKind, LedgerError, LedgerResult};
use crate::journal::{Operation, TransactionId, TransactionJournal};
use crate::provider::QueueProvider;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryState {
    NotStarted,
    Running,
    Done,
}

impl Display for RecoveryState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryState::NotStarted => write!(f, "NOT_STARTED"),
            RecoveryState::Running => write!(f, "RUNNING"),
            RecoveryState::Done => write!(f, "DONE"),
        }
    }
}

/// Outcome of a recovery run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Transactions found with a COMMIT marker.
    pub committed: usize,
    /// Transactions found without one.
    pub incomplete: usize,
    /// ADD entries applied to their queue by this run.
    pub redone: usize,
    /// REMOVE entries returned to their queue by this run.
    pub undone: usize,
    /// Entries dropped by the closing compaction.
    pub compacted: usize,
}

impl Display for RecoveryReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} committed, {} incomplete, {} redone, {} undone, {} compacted",
            self.committed, self.incomplete, self.redone, self.undone, self.compacted
        )
    }
}

/// Brings the queues back in line with the journal after a restart.
///
/// A run makes two passes over the journal. The first learns, per transaction, whether it
/// committed and which of its effects already happened. The second redoes the additions
/// of committed transactions whose additions were never applied, and returns the removals
/// of transactions that never committed to the tail of their queue. Each redo or undo is
/// followed by a RECOVERED record naming the entry, so an interrupted run can simply be
/// started again. A successful run ends by compacting every transaction it saw.
///
/// A recoverer runs once; a later restart creates a new one.
pub struct Recoverer {
    journal: TransactionJournal,
    provider: Arc<dyn QueueProvider>,
    state: Mutex<RecoveryState>,
}

impl Recoverer {
    pub fn new(journal: TransactionJournal, provider: Arc<dyn QueueProvider>) -> Self {
        Recoverer {
            journal,
            provider,
            state: Mutex::new(RecoveryState::NotStarted),
        }
    }

    pub fn state(&self) -> RecoveryState {
        *self.state.lock()
    }

    /// Runs recovery to completion on the calling thread.
    ///
    /// # Returns
    /// * `Ok(RecoveryReport)` once every queue reflects the journal
    /// * `Err(LedgerError)` of kind `RecoveryError` if the journal could not be read or an
    ///   effect could not be applied; the state goes back to `NotStarted`
    pub fn run(&self) -> LedgerResult<RecoveryReport> {
        {
            let mut state = self.state.lock();
            if *state != RecoveryState::NotStarted {
                log::error!("Recovery cannot start, it is already {}", *state);
                return Err(LedgerError::new(
                    &format!("Recovery cannot start, it is already {}", *state),
                    ErrorKind::InvalidOperation,
                ));
            }
            *state = RecoveryState::Running;
        }

        log::info!(
            "Recovering queues from journal {:?}",
            self.journal.config().file_path()
        );

        match self.recover() {
            Ok(report) => {
                *self.state.lock() = RecoveryState::Done;
                log::info!("Recovery finished: {}", report);
                Ok(report)
            }
            Err(e) => {
                *self.state.lock() = RecoveryState::NotStarted;
                log::error!("Recovery failed: {}", e);
                Err(LedgerError::new_with_cause(
                    "Recovery failed",
                    ErrorKind::RecoveryError,
                    e,
                ))
            }
        }
    }

    fn recover(&self) -> LedgerResult<RecoveryReport> {
        // records written by this run are never revisited by it
        let boundary = self.journal.stats().next_sequence;
        let scan = self.scan(boundary)?;

        let committed = scan
            .transactions
            .values()
            .filter(|outcome| outcome.committed)
            .count();
        let mut report = RecoveryReport {
            committed,
            incomplete: scan.transactions.len() - committed,
            ..RecoveryReport::default()
        };

        for entry in self.journal.read_all().iter() {
            let entry = entry?;
            let sequence = entry.sequence();
            if sequence >= boundary {
                break;
            }
            if scan.recovered.contains(&sequence) {
                continue;
            }

            let transaction_id = entry.transaction_id();
            let outcome = scan.outcome(transaction_id);
            match entry.into_operation() {
                Operation::Add { queue, payload } if outcome.needs_redo() => {
                    self.provider.get_recovery_queue(&queue)?.apply_add(payload)?;
                    self.journal.mark_recovered(transaction_id, sequence)?;
                    log::debug!("Redid ADD #{} of {} on '{}'", sequence, transaction_id, queue);
                    report.redone += 1;
                }
                Operation::Remove { queue, payload } if outcome.needs_undo() => {
                    self.provider
                        .get_recovery_queue(&queue)?
                        .restore_to_tail(payload)?;
                    self.journal.mark_recovered(transaction_id, sequence)?;
                    log::debug!("Undid REMOVE #{} of {} on '{}'", sequence, transaction_id, queue);
                    report.undone += 1;
                }
                _ => {}
            }
        }

        let resolved: HashSet<TransactionId> = scan.transactions.into_keys().collect();
        if !resolved.is_empty() {
            match self.journal.compact(&resolved) {
                Ok(stats) => report.compacted = stats.discarded,
                Err(e) => log::warn!(
                    "Journal compaction after recovery failed, the next run repeats it: {}",
                    e
                ),
            }
        }
        Ok(report)
    }

    fn scan(&self, boundary: u64) -> LedgerResult<JournalScan> {
        let mut scan = JournalScan::default();
        for entry in self.journal.read_all().iter() {
            let entry = entry?;
            if entry.sequence() >= boundary {
                break;
            }

            let outcome = scan.transactions.entry(entry.transaction_id()).or_default();
            match entry.operation() {
                Operation::Commit => outcome.committed = true,
                Operation::Applied => outcome.applied = true,
                Operation::RolledBack => outcome.rolled_back = true,
                Operation::Recovered { entry } => {
                    scan.recovered.insert(*entry);
                }
                Operation::Add { .. } | Operation::Remove { .. } => {}
            }
        }
        Ok(scan)
    }
}

#[derive(Default)]
struct JournalScan {
    transactions: HashMap<TransactionId, TransactionOutcome>,
    recovered: HashSet<u64>,
}

impl JournalScan {
    fn outcome(&self, transaction_id: TransactionId) -> TransactionOutcome {
        self.transactions
            .get(&transaction_id)
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Clone, Copy, Default)]
struct TransactionOutcome {
    committed: bool,
    applied: bool,
    rolled_back: bool,
}

impl TransactionOutcome {
    fn needs_redo(&self) -> bool {
        self.committed && !self.applied
    }

    fn needs_undo(&self) -> bool {
        !self.committed && !self.rolled_back
    }
}
