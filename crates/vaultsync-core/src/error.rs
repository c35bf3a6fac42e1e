//! Error types for vaultsync.

use thiserror::Error;

/// Result type alias using vaultsync's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vaultsync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Vector store operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Graph store operation failed
    #[error("Graph error: {0}")]
    Graph(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration error (missing credentials, invalid mode combination)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ingestion queue is at capacity
    #[error("Queue full: capacity {0} exceeded")]
    QueueFull(usize),

    /// Hybrid dual-write partially failed; one store committed, the other did not
    #[error("Dual-write failed for {file_path} (rolled_back={rolled_back}): {source_message}")]
    DualWriteFailed {
        file_path: String,
        rolled_back: bool,
        source_message: String,
    },

    /// A bounded wait expired (per-item write mutex, delete verification)
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A required backend is unreachable; the operation was deferred
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Machine-readable error code for telemetry sinks.
    ///
    /// Lets a consumer distinguish "needs operator attention" from
    /// "will retry automatically" without parsing display strings.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Database(_) => "vector-store-error",
            Error::Graph(_) => "graph-store-error",
            Error::Embedding(_) => "embedding-error",
            Error::Config(_) => "config-error",
            Error::QueueFull(_) => "queue-full",
            Error::DualWriteFailed { .. } => "dual-write-failed",
            Error::Timeout(_) => "timeout",
            Error::Unavailable(_) => "service-unavailable",
            Error::Serialization(_) => "serialization-error",
            Error::Request(_) => "request-error",
            Error::InvalidInput(_) => "invalid-input",
            Error::Internal(_) => "internal-error",
            Error::Io(_) => "io-error",
        }
    }

    /// Whether the error is worth retrying with backoff.
    ///
    /// Configuration and validation errors never become retryable; a task
    /// hitting one fails immediately regardless of its retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::Graph(_)
                | Error::Embedding(_)
                | Error::Request(_)
                | Error::Timeout(_)
                | Error::Unavailable(_)
                | Error::DualWriteFailed { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

impl From<neo4rs::Error> for Error {
    fn from(e: neo4rs::Error) -> Self {
        Error::Graph(e.to_string())
    }
}
