use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result type alias for sqlbox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for sqlbox operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required request field was missing or empty
    #[error("{field} is required")]
    InvalidArgument { field: String },

    /// The canonicalizer could not tokenize the query text
    #[error("malformed query: {message}")]
    MalformedQuery { message: String },

    /// The sandbox exceeded its wall-clock budget
    #[error("{operation} timeout (takes more than {duration:?})")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// The initialization script failed inside the sandbox
    #[error("exec init: {message}")]
    InitError { message: String },

    /// The query itself failed inside the sandbox
    #[error("query: {message}")]
    QueryError { message: String },

    /// The caller cancelled the operation before it completed
    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    /// A cache entry has expired or was never written
    #[error("{what} expired – re-query again!")]
    NotFound { what: String },

    /// The key-value store behind the cache failed
    #[error("{backend} store error during {operation}: {message}")]
    Store {
        backend: String,
        operation: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// The sandbox itself (not the user's SQL) failed
    #[error("sandbox error: {message}")]
    Sandbox { message: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

/// Status code an error is reported as at the service boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    Aborted,
    Cancelled,
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Aborted => "aborted",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

impl Error {
    /// Create an invalid argument error for a missing field
    #[must_use]
    pub fn invalid_argument(field: impl Into<String>) -> Self {
        Error::InvalidArgument {
            field: field.into(),
        }
    }

    /// Create a malformed query error
    #[must_use]
    pub fn malformed_query(message: impl Into<String>) -> Self {
        Error::MalformedQuery {
            message: message.into(),
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an init script error
    #[must_use]
    pub fn init_error(message: impl Into<String>) -> Self {
        Error::InitError {
            message: message.into(),
        }
    }

    /// Create a query error
    #[must_use]
    pub fn query_error(message: impl Into<String>) -> Self {
        Error::QueryError {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Error::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a not-found error for an expired handle or entry
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    /// Create a store error without an underlying source
    #[must_use]
    pub fn store(
        backend: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Store {
            backend: backend.into(),
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a store error wrapping the backend's error
    #[must_use]
    pub fn store_with_source(
        backend: impl Into<String>,
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Store {
            backend: backend.into(),
            operation: operation.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a sandbox fault
    #[must_use]
    pub fn sandbox(message: impl Into<String>) -> Self {
        Error::Sandbox {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Status code reported to callers
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidArgument { .. } | Error::MalformedQuery { .. } => {
                ErrorCode::InvalidArgument
            }
            Error::InitError { .. } | Error::QueryError { .. } => ErrorCode::InvalidArgument,
            Error::NotFound { .. } => ErrorCode::NotFound,
            Error::Timeout { .. } => ErrorCode::Aborted,
            Error::Cancelled { .. } => ErrorCode::Cancelled,
            Error::Store { .. }
            | Error::Json { .. }
            | Error::Sandbox { .. }
            | Error::Configuration { .. } => ErrorCode::Internal,
        }
    }

    /// Whether the failure was caused by the caller's SQL and belongs in-band
    ///
    /// These are routine outcomes of untrusted input and are never logged as
    /// service faults.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::InitError { .. } | Error::QueryError { .. }
        )
    }

    /// Whether the failure is an internal fault of the service
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.code() == ErrorCode::Internal
    }
}

// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a lazy message
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Configuration {
                message: format!("{}: {}", message.into(), base_error),
            }
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Configuration {
                message: format!("{}: {}", f(), base_error),
            }
        })
    }
}
