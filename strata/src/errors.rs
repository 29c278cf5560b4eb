use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Categories of errors raised by the substrate and the crates built on it.
///
/// Extension crates map their own error enums onto these kinds so a single
/// `StrataError` can travel through transaction retry loops.
///
/// # Examples
///
/// ```rust,ignore
/// use strata::errors::{StrataError, ErrorKind, StrataResult};
///
/// fn load() -> StrataResult<()> {
///     Err(StrataError::new("store is closed", ErrorKind::StoreAlreadyClosed))
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Transaction Errors
    /// Another transaction committed a conflicting write; the whole
    /// transaction can be retried from scratch
    TransactionConflict,
    /// The transaction was already committed or rolled back
    TransactionClosed,

    // Storage Errors
    /// Error reported by the underlying storage engine
    BackendError,
    /// The store is not opened yet
    StoreNotInitialized,
    /// The store has already been closed
    StoreAlreadyClosed,
    /// Generic I/O error
    IOError,

    // Data Errors
    /// Malformed encoded keys, values or tokens
    EncodingError,
    /// Invalid input supplied by the caller
    ValidationError,
    /// Operation not allowed in the current state
    InvalidOperation,

    // Index Errors
    /// The persisted index structure is inconsistent
    IndexCorrupted,
    /// A dimension type cannot be ordered or mapped onto a space-filling curve
    InvalidDimensionType,
    /// Scan parameters cannot be rebased or translated
    UnsupportedTranslation,

    // Extension Errors - the String names the extension (e.g. "rtree")
    /// Error from an extension crate
    Extension(String),

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::TransactionConflict => write!(f, "Transaction conflict"),
            ErrorKind::TransactionClosed => write!(f, "Transaction closed"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::StoreNotInitialized => write!(f, "Store not initialized"),
            ErrorKind::StoreAlreadyClosed => write!(f, "Store already closed"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::ValidationError => write!(f, "Validation error"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::IndexCorrupted => write!(f, "Index corrupted"),
            ErrorKind::InvalidDimensionType => write!(f, "Invalid dimension type"),
            ErrorKind::UnsupportedTranslation => write!(f, "Unsupported translation"),
            ErrorKind::Extension(name) => write!(f, "{} error", name),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Error type shared by all strata crates.
///
/// `StrataError` carries a message, an [`ErrorKind`], an optional cause and
/// the backtrace captured at construction.
///
/// # Examples
///
/// ```rust,ignore
/// use strata::errors::{StrataError, ErrorKind};
///
/// let cause = StrataError::new("disk full", ErrorKind::IOError);
/// let err = StrataError::new_with_cause("commit failed", ErrorKind::BackendError, cause);
/// assert!(err.cause().is_some());
/// ```
#[derive(Clone)]
pub struct StrataError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<StrataError>>,
    backtrace: Atomic<Backtrace>,
}

impl StrataError {
    /// Creates a new `StrataError` with the specified message and error kind.
    ///
    /// # Arguments
    ///
    /// * `message` - A description of the error
    /// * `error_kind` - The category of error
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        StrataError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `StrataError` that wraps the error that caused it.
    ///
    /// # Arguments
    ///
    /// * `message` - A description of the error
    /// * `error_kind` - The category of error
    /// * `cause` - The underlying error
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: StrataError) -> Self {
        StrataError {
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

    pub fn cause(&self) -> Option<&StrataError> {
        self.cause.as_deref()
    }

    /// Returns `true` if re-running the enclosing transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        self.error_kind == ErrorKind::TransactionConflict
    }
}

impl Display for StrataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for StrataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace.read()),
        }
    }
}

impl Error for StrataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

impl From<std::io::Error> for StrataError {
    fn from(err: std::io::Error) -> Self {
        StrataError::new(&format!("IO error: {}", err), ErrorKind::IOError)
    }
}

impl From<std::string::FromUtf8Error> for StrataError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        StrataError::new(
            &format!("UTF-8 encoding error: {}", err),
            ErrorKind::EncodingError,
        )
    }
}

impl From<String> for StrataError {
    fn from(msg: String) -> Self {
        StrataError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for StrataError {
    fn from(msg: &str) -> Self {
        StrataError::new(msg, ErrorKind::InternalError)
    }
}
