use crate::common::Payload;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identifier of a transaction.
///
/// Ids are assigned by the journal in increasing order and never reused, not even
/// after the entries of a transaction have been compacted away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(id: u64) -> Self {
        TransactionId(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// An operation recorded in the journal.
///
/// `Add`, `Remove` and `Commit` decide what a transaction did. The remaining variants are
/// bookkeeping that keeps a physical effect from being applied twice; they never change
/// whether a transaction counts as committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// An element offered to a queue, applied only once the transaction commits.
    Add { queue: String, payload: Payload },
    /// An element polled from a queue, returned to it unless the transaction commits.
    Remove { queue: String, payload: Payload },
    /// The transaction committed.
    Commit,
    /// The pending additions of a committed transaction reached their queues.
    Applied,
    /// An explicit rollback returned the removed elements to their queues.
    RolledBack,
    /// The entry with the given sequence number was redone or undone, by a rollback or a
    /// recovery run.
    Recovered { entry: u64 },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Add { .. } => OperationKind::Add,
            Operation::Remove { .. } => OperationKind::Remove,
            Operation::Commit => OperationKind::Commit,
            Operation::Applied => OperationKind::Applied,
            Operation::RolledBack => OperationKind::RolledBack,
            Operation::Recovered { .. } => OperationKind::Recovered,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Add,
    Remove,
    Commit,
    Applied,
    RolledBack,
    Recovered,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Add => write!(f, "ADD"),
            OperationKind::Remove => write!(f, "REMOVE"),
            OperationKind::Commit => write!(f, "COMMIT"),
            OperationKind::Applied => write!(f, "APPLIED"),
            OperationKind::RolledBack => write!(f, "ROLLED_BACK"),
            OperationKind::Recovered => write!(f, "RECOVERED"),
        }
    }
}

/// One record of the journal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    sequence: u64,
    transaction_id: TransactionId,
    operation: Operation,
}

impl JournalEntry {
    pub(crate) fn new(sequence: u64, transaction_id: TransactionId, operation: Operation) -> Self {
        JournalEntry {
            sequence,
            transaction_id,
            operation,
        }
    }

    /// Position of the entry in the global order of all entries.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn into_operation(self) -> Operation {
        self.operation
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    /// The queue an ADD or REMOVE refers to.
    pub fn queue_name(&self) -> Option<&str> {
        match &self.operation {
            Operation::Add { queue, .. } | Operation::Remove { queue, .. } => Some(queue),
            _ => None,
        }
    }

    /// The payload an ADD or REMOVE carries.
    pub fn payload(&self) -> Option<&Payload> {
        match &self.operation {
            Operation::Add { payload, .. } | Operation::Remove { payload, .. } => Some(payload),
            _ => None,
        }
    }
}
