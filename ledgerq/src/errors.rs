use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Error kinds for ledgerq operations.
///
/// The first four kinds form the failure taxonomy of the transactional engine:
///
/// - [`ErrorKind::Timeout`] is local and never corrupts state.
/// - [`ErrorKind::DurabilityError`] means a journal write did not reach stable storage; the
///   owning transaction must be treated as incomplete.
/// - [`ErrorKind::StorageFatal`] means queue storage is unreadable or unwritable; the process
///   should stop accepting transactions.
/// - [`ErrorKind::RecoveryError`] means the journal could not be trusted at startup; the queue
///   manager refuses to come online.
///
/// # Examples
///
/// ```rust,ignore
/// use ledgerq::errors::{LedgerError, ErrorKind, LedgerResult};
///
/// fn example() -> LedgerResult<()> {
///     Err(LedgerError::new("journal append failed", ErrorKind::DurabilityError))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Engine taxonomy
    /// A blocking queue operation exceeded its wait budget
    Timeout,
    /// A journal record could not be durably persisted
    DurabilityError,
    /// Queue storage is unreadable or unwritable
    StorageFatal,
    /// The journal is unreadable or inconsistent at startup
    RecoveryError,

    // Lifecycle Errors
    /// The operation is not valid in the current context
    InvalidOperation,
    /// The transaction has already been committed or rolled back
    TransactionClosed,
    /// Recovery has not finished yet
    RecoveryInProgress,

    // Queue Errors
    /// The queue does not exist
    QueueNotFound,
    /// The queue has been disposed
    QueueDisposed,

    // Configuration Errors
    /// A configuration value is invalid or was set too late
    InvalidConfiguration,

    // IO and Journal Errors
    /// Generic IO error
    IOError,
    /// Error encoding or decoding a record
    EncodingError,
    /// A journal frame or header failed validation
    JournalCorrupted,

    // Backend and Store Errors
    /// Error from a storage backend
    BackendError,
    /// Storage has not been opened
    StoreNotInitialized,
    /// Storage has already been closed
    StoreAlreadyClosed,

    /// Error from an extension crate (e.g. a storage adapter)
    Extension(String),

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "Timeout"),
            ErrorKind::DurabilityError => write!(f, "Durability error"),
            ErrorKind::StorageFatal => write!(f, "Fatal storage error"),
            ErrorKind::RecoveryError => write!(f, "Recovery error"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::TransactionClosed => write!(f, "Transaction closed"),
            ErrorKind::RecoveryInProgress => write!(f, "Recovery in progress"),
            ErrorKind::QueueNotFound => write!(f, "Queue not found"),
            ErrorKind::QueueDisposed => write!(f, "Queue disposed"),
            ErrorKind::InvalidConfiguration => write!(f, "Invalid configuration"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::JournalCorrupted => write!(f, "Journal corrupted"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::StoreNotInitialized => write!(f, "Store not initialized"),
            ErrorKind::StoreAlreadyClosed => write!(f, "Store already closed"),
            ErrorKind::Extension(name) => write!(f, "{} error", name),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom ledgerq error type.
///
/// `LedgerError` carries a message, a kind, an optional cause and the backtrace captured at
/// construction time.
///
/// # Examples
///
/// ```rust,ignore
/// use ledgerq::errors::{LedgerError, ErrorKind};
///
/// let cause = LedgerError::new("fsync failed", ErrorKind::IOError);
/// let err = LedgerError::new_with_cause("commit not persisted", ErrorKind::DurabilityError, cause);
/// ```
#[derive(Clone)]
pub struct LedgerError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<LedgerError>>,
    backtrace: Atomic<Backtrace>,
}

impl LedgerError {
    /// Creates a new `LedgerError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        LedgerError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `LedgerError` with a cause error.
    ///
    /// The cause is kept for `Debug` output and [`Error::source`].
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: LedgerError) -> Self {
        LedgerError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&LedgerError> {
        self.cause.as_deref()
    }

    /// Returns `true` for [`ErrorKind::Timeout`].
    pub fn is_timeout(&self) -> bool {
        self.error_kind == ErrorKind::Timeout
    }

    /// Returns `true` when the error leaves the process unable to continue safely.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::StorageFatal | ErrorKind::RecoveryError | ErrorKind::JournalCorrupted
        )
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace.read()),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for ledgerq operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::new(&format!("IO error: {}", err), ErrorKind::IOError)
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::new(&format!("Encoding error: {}", err), ErrorKind::EncodingError)
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::new(&format!("Decoding error: {}", err), ErrorKind::EncodingError)
    }
}

impl From<String> for LedgerError {
    fn from(msg: String) -> Self {
        LedgerError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for LedgerError {
    fn from(msg: &str) -> Self {
        LedgerError::new(msg, ErrorKind::InternalError)
    }
}
