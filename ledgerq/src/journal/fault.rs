use crate::journal::OperationKind;

/// A write failure to simulate on a [`TransactionJournal`](crate::journal::TransactionJournal).
///
/// One-shot faults fire on the first matching write and then clear themselves.
/// [`JournalFault::FailAllWrites`] stays active until
/// [`clear_fault`](crate::journal::TransactionJournal::clear_fault) is called.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JournalFault {
    /// The next ADD or REMOVE record fails without touching the file.
    FailNextAppend,
    /// The next ADD or REMOVE record is half written before failing.
    TearNextAppend,
    /// The next COMMIT marker fails.
    FailNextCommit,
    /// The next APPLIED, ROLLED_BACK or RECOVERED marker fails.
    FailNextMarker,
    /// Every write fails.
    FailAllWrites,
}

impl JournalFault {
    pub(crate) fn matches(&self, kind: OperationKind) -> bool {
        match self {
            JournalFault::FailNextAppend | JournalFault::TearNextAppend => {
                matches!(kind, OperationKind::Add | OperationKind::Remove)
            }
            JournalFault::FailNextCommit => kind == OperationKind::Commit,
            JournalFault::FailNextMarker => matches!(
                kind,
                OperationKind::Applied | OperationKind::RolledBack | OperationKind::Recovered
            ),
            JournalFault::FailAllWrites => true,
        }
    }

    pub(crate) fn is_sticky(&self) -> bool {
        matches!(self, JournalFault::FailAllWrites)
    }
}
