use crate::common::Payload;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lifecycle of a [`TransactionContext`](crate::transaction::TransactionContext).
///
/// `Open -> Committing -> Closed` or `Open -> RollingBack -> Closed`. A commit whose
/// COMMIT marker could not be persisted leaves the context `Failed`, from which only
/// rollback leads to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Open,
    Committing,
    RollingBack,
    Failed,
    Closed,
}

impl Display for TransactionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Open => write!(f, "OPEN"),
            TransactionState::Committing => write!(f, "COMMITTING"),
            TransactionState::RollingBack => write!(f, "ROLLING_BACK"),
            TransactionState::Failed => write!(f, "FAILED"),
            TransactionState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// An element a transaction removed from a queue.
///
/// `sequence` is the journal entry of the REMOVE, absent when the removal never reached
/// the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Removal {
    pub(crate) queue: String,
    pub(crate) payload: Payload,
    pub(crate) sequence: Option<u64>,
}

/// Work a transaction has done but not yet resolved.
///
/// Additions wait here, invisible to every queue, until commit. Removals have already
/// happened and wait here until commit forgets them or rollback returns them.
#[derive(Debug, Default)]
pub(crate) struct PendingOperations {
    adds: Vec<(String, Payload)>,
    undo: Vec<Removal>,
    journaled: bool,
    removals_journaled: bool,
}

impl PendingOperations {
    pub(crate) fn add(&mut self, queue: &str, payload: Payload) {
        self.adds.push((queue.to_string(), payload));
        self.journaled = true;
    }

    pub(crate) fn record_removal(&mut self, queue: &str, payload: Payload, sequence: u64) {
        self.undo.push(Removal {
            queue: queue.to_string(),
            payload,
            sequence: Some(sequence),
        });
        self.journaled = true;
        self.removals_journaled = true;
    }

    /// Keeps an element for rollback that never made it into the journal.
    pub(crate) fn restore_later(&mut self, queue: &str, payload: Payload) {
        self.undo.push(Removal {
            queue: queue.to_string(),
            payload,
            sequence: None,
        });
    }

    pub(crate) fn adds_for(&self, queue: &str) -> usize {
        self.adds.iter().filter(|(name, _)| name == queue).count()
    }

    pub(crate) fn add_count(&self) -> usize {
        self.adds.len()
    }

    pub(crate) fn removal_count(&self) -> usize {
        self.undo.len()
    }

    /// True if at least one record of the transaction reached the journal.
    pub(crate) fn is_journaled(&self) -> bool {
        self.journaled
    }

    pub(crate) fn has_journaled_removals(&self) -> bool {
        self.removals_journaled
    }

    pub(crate) fn take_adds(&mut self) -> Vec<(String, Payload)> {
        std::mem::take(&mut self.adds)
    }

    pub(crate) fn take_undo(&mut self) -> Vec<Removal> {
        std::mem::take(&mut self.undo)
    }
}

/// Counts transactions that have been started and not yet closed.
#[derive(Clone, Debug, Default)]
pub(crate) struct ActiveTransactions {
    count: Arc<AtomicUsize>,
}

impl ActiveTransactions {
    pub(crate) fn register(&self) -> ActiveGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        ActiveGuard {
            count: self.count.clone(),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) struct ActiveGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_operations() {
        let mut pending = PendingOperations::default();
        assert!(!pending.is_journaled());

        pending.add("a", Payload::text("1"));
        pending.add("b", Payload::text("2"));
        pending.add("a", Payload::text("3"));
        assert_eq!(pending.adds_for("a"), 2);
        assert_eq!(pending.add_count(), 3);
        assert!(pending.is_journaled());
        assert!(!pending.has_journaled_removals());

        pending.record_removal("a", Payload::text("x"), 7);
        pending.restore_later("b", Payload::text("y"));
        assert!(pending.has_journaled_removals());
        assert_eq!(pending.removal_count(), 2);

        assert_eq!(pending.take_adds().len(), 3);
        assert_eq!(pending.add_count(), 0);
        let undo = pending.take_undo();
        assert_eq!(undo[0].sequence, Some(7));
        assert_eq!(undo[1].queue, "b");
        assert_eq!(undo[1].sequence, None);
    }

    #[test]
    fn test_active_transactions_guard() {
        let active = ActiveTransactions::default();
        let first = active.register();
        let second = active.register();
        assert_eq!(active.count(), 2);
        drop(first);
        assert_eq!(active.count(), 1);
        drop(second);
        assert_eq!(active.count(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TransactionState::RollingBack.to_string(), "ROLLING_BACK");
    }
}
