//! Error types for the bridge protocol engine.
//!
//! Validation problems are never raised as errors; they are reported as data in
//! a [`ValidationResult`](crate::validation::ValidationResult). The types here
//! cover everything else: protocol failures on the request path and transform
//! failures inside the serializer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error codes carried by [`ProtocolError`] and by the payload
/// of error responses sent to the remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Generic failure on the message handling path
    HandlerError,
    /// No handler is registered for a request or system operation
    NoHandler,
    /// A route handler did not finish within its timeout
    HandlerTimeout,
    /// No response arrived for an outgoing request in time
    RequestTimeout,
    /// Waited too long for a free request slot
    ConcurrencyLimit,
    /// Both the in-flight slots and the waiting queue are exhausted
    QueueFull,
    /// The handler is shutting down
    ShuttingDown,
    /// The permission hook refused the route
    PermissionDenied,
    /// The rate-limit hook refused the route
    RateLimited,
    /// A middleware ended the chain without calling `next`
    MiddlewareRejected,
    /// The message kind is not one of request/response/event/system
    UnknownMessageType,
    /// The message failed validation
    ValidationFailed,
    /// The message could not be serialized for sending
    SerializationFailed,
    /// The connection refused the outgoing frame
    SendFailed,
    /// The remote peer answered with `success: false`
    RemoteError,
}

impl ErrorCode {
    /// Returns the wire representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::HandlerError => "HANDLER_ERROR",
            ErrorCode::NoHandler => "NO_HANDLER",
            ErrorCode::HandlerTimeout => "HANDLER_TIMEOUT",
            ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorCode::ConcurrencyLimit => "CONCURRENCY_LIMIT",
            ErrorCode::QueueFull => "QUEUE_FULL",
            ErrorCode::ShuttingDown => "SHUTTING_DOWN",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::MiddlewareRejected => "MIDDLEWARE_REJECTED",
            ErrorCode::UnknownMessageType => "UNKNOWN_MESSAGE_TYPE",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::SerializationFailed => "SERIALIZATION_FAILED",
            ErrorCode::SendFailed => "SEND_FAILED",
            ErrorCode::RemoteError => "REMOTE_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single tagged protocol error.
///
/// Used for unknown message kinds, missing handlers, handler and request
/// timeouts, admission-control rejections and shutdown. The optional code is
/// what the remote peer sees in an error response; the optional message id
/// points at the message that caused the failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}{message}{}", code_prefix(.code), id_suffix(.message_id))]
pub struct ProtocolError {
    pub message: String,
    pub code: Option<ErrorCode>,
    pub message_id: Option<String>,
}

fn code_prefix(code: &Option<ErrorCode>) -> String {
    code.as_ref().map(|code| format!("[{code}] ")).unwrap_or_default()
}

fn id_suffix(message_id: &Option<String>) -> String {
    message_id.as_ref().map(|id| format!(" (message {id})")).unwrap_or_default()
}

impl ProtocolError {
    /// Creates an error without a code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            message_id: None,
        }
    }

    /// Creates an error tagged with a machine-readable code.
    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
            message_id: None,
        }
    }

    /// Attaches the id of the message that caused this error.
    pub fn for_message(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// The code to report to a peer, defaulting to `HANDLER_ERROR`.
    pub fn code_or_default(&self) -> ErrorCode {
        self.code.unwrap_or(ErrorCode::HandlerError)
    }
}

/// Failures raised while turning messages into wire frames and back.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Input exceeds the configured maximum before any parsing is attempted
    #[error("Payload too large: {size} bytes exceeds limit of {max} bytes")]
    TooLarge { size: usize, max: usize },

    /// The canonical document could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The decoded document is not a recognizable message
    #[error("Not a bridge protocol message: {0}")]
    NotAMessage(String),

    /// Validation produced errors and strict mode is enabled
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Encryption was requested or detected but no key is configured
    #[error("Encryption unavailable: no key configured")]
    EncryptionUnavailable,
}

impl From<CodecError> for ProtocolError {
    fn from(error: CodecError) -> Self {
        let code = match error {
            CodecError::Validation(_) => ErrorCode::ValidationFailed,
            _ => ErrorCode::SerializationFailed,
        };
        ProtocolError::with_code(code, error.to_string())
    }
}
