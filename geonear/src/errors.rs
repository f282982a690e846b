use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::{atomic, Atomic};

/// Error kinds for GeoNear operations
///
/// This enum represents all possible error types that can occur during engine
/// operations. Each error kind describes a specific category of failure,
/// enabling precise error handling.
///
/// # Examples
///
/// ```rust,ignore
/// use geonear::errors::{GeoNearError, ErrorKind, GeoNearResult};
///
/// fn example() -> GeoNearResult<()> {
///     Err(GeoNearError::new("Query not found", ErrorKind::NotFound))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Boundary validation errors - rejected synchronously, never stored
    /// Latitude or longitude outside the valid geographic range
    InvalidCoordinate,
    /// Negative or non-finite query radius
    InvalidRadius,
    /// Geohash precision outside the supported range
    InvalidPrecision,
    /// Malformed geohash string (bad character, empty, or too long)
    InvalidHash,

    // Identity errors
    /// The referenced query does not exist or has been released
    NotFound,

    // Lifecycle errors
    /// Operation not valid in the component's current state
    InvalidState,
    /// The operation is not valid in the current context
    InvalidOperation,

    // Store collaborator errors
    /// The proximity store failed to complete a scan or subscription;
    /// the caller may retry without data loss
    StoreUnavailable,

    // Event errors
    /// Error in event bus processing
    EventError,

    // Index errors
    /// Error in spatial index bookkeeping
    IndexError,

    // Generic/internal errors - used as fallback
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidCoordinate => write!(f, "Invalid coordinate"),
            ErrorKind::InvalidRadius => write!(f, "Invalid radius"),
            ErrorKind::InvalidPrecision => write!(f, "Invalid precision"),
            ErrorKind::InvalidHash => write!(f, "Invalid geohash"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::InvalidState => write!(f, "Invalid state"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::StoreUnavailable => write!(f, "Store unavailable"),
            ErrorKind::EventError => write!(f, "Event error"),
            ErrorKind::IndexError => write!(f, "Index error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom GeoNear error type.
///
/// `GeoNearError` encapsulates error information including the error message,
/// kind, and optional cause. It supports error chaining and backtraces for
/// debugging.
///
/// # Examples
///
/// ```rust,ignore
/// use geonear::errors::{GeoNearError, ErrorKind};
///
/// // Create a simple error
/// let err = GeoNearError::new("Query not found", ErrorKind::NotFound);
///
/// // Create an error with a cause
/// let cause = GeoNearError::new("Connection reset", ErrorKind::StoreUnavailable);
/// let err = GeoNearError::new_with_cause("Scan failed", ErrorKind::StoreUnavailable, cause);
/// ```
#[derive(Clone)]
pub struct GeoNearError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<GeoNearError>>,
    backtrace: Atomic<Backtrace>,
}

impl GeoNearError {
    /// Creates a new `GeoNearError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        GeoNearError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `GeoNearError` with a cause error.
    ///
    /// This creates an error chain where the cause error is preserved for
    /// debugging.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: GeoNearError) -> Self {
        GeoNearError {
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

    pub fn cause(&self) -> Option<&Box<GeoNearError>> {
        self.cause.as_ref()
    }
}

impl Display for GeoNearError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for GeoNearError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace.read()),
        }
    }
}

impl Error for GeoNearError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for GeoNear operations.
///
/// `GeoNearResult<T>` is shorthand for `Result<T, GeoNearError>`.
/// All fallible engine operations return this type.
pub type GeoNearResult<T> = Result<T, GeoNearError>;

// From trait implementations for automatic error conversion
impl From<String> for GeoNearError {
    fn from(msg: String) -> Self {
        GeoNearError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for GeoNearError {
    fn from(msg: &str) -> Self {
        GeoNearError::new(msg, ErrorKind::InternalError)
    }
}
