//! Error types for dbsem-core
//!
//! Contention is not an error: a held lock comes back as a [`LockInfo`]
//! with status `OwnedBySomeoneElse`. Everything here is an actual failure,
//! plus [`Error::Cancelled`], which carries the cancellation signal out of
//! an operation without dressing it up as a store failure.
//!
//! [`LockInfo`]: crate::LockInfo

use thiserror::Error;

use crate::store::StoreRole;

/// Core error type for dbsem operations
#[derive(Debug, Error)]
pub enum Error {
    /// A store round trip failed for a reason other than expected contention
    #[error("Store error during {operation} on lock '{name}': {source}")]
    Store {
        operation: &'static str,
        name: String,
        #[source]
        source: sqlx::Error,
    },

    /// The lock table could not be created
    #[error("Failed to create lock table '{table}': {source}")]
    Bootstrap {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// The store-handle supplier could not produce a handle
    #[error("No {role} handle for database '{database}': {message}")]
    Handle {
        database: String,
        role: StoreRole,
        message: String,
    },

    /// A stored row could not be decoded
    #[error("Corrupt lock record '{name}': {message}")]
    CorruptRecord { name: String, message: String },

    /// Unusable argument (empty name, zero timeout, bad identifier)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration values failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// The caller's cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Stable machine-readable code for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Store { .. } => "STORE_ERROR",
            Self::Bootstrap { .. } => "BOOTSTRAP_FAILED",
            Self::Handle { .. } => "HANDLE_UNAVAILABLE",
            Self::CorruptRecord { .. } => "CORRUPT_RECORD",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Parse(_) => "PARSE_ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Process exit code for this error.
    ///
    /// - 1: user error (bad argument or configuration)
    /// - 2: system error (store, handle, IO)
    /// - 4: invalid state (corrupt record)
    /// - 130: cancelled
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::InvalidConfig(_) | Self::Parse(_) => 1,
            Self::Store { .. } | Self::Bootstrap { .. } | Self::Handle { .. } | Self::Io(_) => 2,
            Self::CorruptRecord { .. } => 4,
            Self::Cancelled => 130,
        }
    }

    /// Whether this error is the cancellation signal.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Returns a mapper that logs a store failure once and wraps it.
///
/// Used at every `sqlx` call site so that the error is recorded where it
/// was caught, not again by each layer it passes through.
pub(crate) fn store_error(
    operation: &'static str,
    name: &str,
) -> impl FnOnce(sqlx::Error) -> Error {
    let name = name.to_string();
    move |source| {
        tracing::error!(operation, lock = %name, error = %source, "store operation failed");
        Error::Store {
            operation,
            name,
            source,
        }
    }
}

/// Result type alias for dbsem-core operations
pub type Result<T> = std::result::Result<T, Error>;
