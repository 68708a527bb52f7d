//! Error types for raig-client.

use thiserror::Error;

/// Main error type for all raig-client operations.
///
/// Most of these never reach the host: the session folds transport failures
/// into [`ConnectionState::Failed`](crate::ConnectionState::Failed) and logs
/// protocol errors. Only [`Client::init_connection`](crate::Client::init_connection)
/// and the codec surface them directly.
#[derive(Debug, Error)]
pub enum RaigError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (telemetry only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (malformed or unrecognized frame).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A numeric field does not fit the configured digit width.
    #[error("Field value {value} does not fit in {width} digits")]
    FieldOverflow {
        /// The value that was being encoded.
        value: u32,
        /// The configured field width.
        width: usize,
    },

    /// The peer closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// An operation needed a live connection and there was none.
    #[error("Not connected")]
    NotConnected,

    /// Host/service could not be resolved to any address.
    #[error("No address found for {0}")]
    NoEndpoint(String),
}

/// Result type alias using RaigError.
pub type Result<T> = std::result::Result<T, RaigError>;
