//! Error types for KeyBridge
//!
//! Provides a unified error type for all operations. Errors crossing the
//! native boundary are translated by their error-type code, never by string
//! matching.

use thiserror::Error;

/// Result type alias using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Unified error type for KeyBridge operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    // -------------------------------------------------------------------------
    // Local Errors (raised before any native call)
    // -------------------------------------------------------------------------
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // -------------------------------------------------------------------------
    // Boundary Errors
    // -------------------------------------------------------------------------
    /// Unrecognized response tag. Binary mismatch between wrapper and engine;
    /// fatal and never retried.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Link-level failure. The handle may recover if the engine's background
    /// reconnection succeeds, otherwise it is unusable until recreated.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The handle is closed (or failed to open) and cannot serve requests.
    #[error("Closing error: {0}")]
    Closing(String),

    /// Server-reported failure, recoverable, carries an error-type code.
    #[error("Request error ({kind:?}): {message}")]
    Request {
        message: String,
        kind: RequestErrorKind,
    },

    /// No response within the configured bound. Does not imply the operation
    /// had no server-side effect.
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Error-type code attached to server-reported failures at the boundary.
///
/// Values must match the engine-side definition; the code travels through
/// `CommandError::command_error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum RequestErrorKind {
    /// Catch-all server error
    Unspecified = 0,

    /// Transaction aborted before execution
    ExecAbort = 1,

    /// Server-side timeout
    Timeout = 2,

    /// Mid-request link loss
    Disconnect = 3,
}

impl RequestErrorKind {
    /// Maps a raw boundary code to a kind. Unknown codes collapse to
    /// `Unspecified` rather than failing the whole response.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => RequestErrorKind::ExecAbort,
            2 => RequestErrorKind::Timeout,
            3 => RequestErrorKind::Disconnect,
            _ => RequestErrorKind::Unspecified,
        }
    }
}

impl BridgeError {
    /// Builds the error matching a boundary error code and message.
    ///
    /// `Timeout` and `Disconnect` codes map onto their dedicated variants so
    /// callers can match on the taxonomy instead of the code.
    pub fn from_boundary(message: String, code: u32) -> Self {
        match RequestErrorKind::from_code(code) {
            RequestErrorKind::Timeout => BridgeError::Timeout(message),
            RequestErrorKind::Disconnect => BridgeError::Connection(message),
            kind => BridgeError::Request { message, kind },
        }
    }
}
