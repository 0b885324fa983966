//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. The typed
//! variant survives up to the dispatch boundary, where it is logged by
//! [`ErrorKind`] and flattened into the client-visible failure envelope.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the tool server.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed value supplied to an internal operation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Tool arguments do not match the declared parameter schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// No tool registered under the requested name.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// A tool with the same name is already registered.
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Workflow name is not in the static catalog.
    #[error("Unknown workflow: {name}")]
    UnknownWorkflow { name: String, available: Vec<String> },

    /// Workflow is missing one or more required parameters.
    #[error("Missing required parameters: [{}]", quoted(.missing))]
    MissingParameters {
        missing: Vec<String>,
        required: Vec<String>,
    },

    /// 4D-STEM processing type the analysis backend does not offer.
    #[error("Unknown processing type: {0}")]
    UnknownProcessingType(String),

    /// Stream id was never issued or has been reclaimed.
    #[error("Stream not found: {0}")]
    SessionNotFound(String),

    /// Stream exists but is no longer producing frames.
    #[error("Stream {0} is stopped")]
    SessionStopped(String),

    /// The instrument driver could not be reached.
    #[error("instrument unavailable: {0}")]
    InstrumentUnavailable(String),

    /// Resource limit reached.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Caller cancelled the operation (client disconnect or cancel notification).
    #[error("cancelled")]
    Cancelled,

    /// Operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Catch-all for bugs and unexpected states.
    #[error("internal error: {0}")]
    Internal(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn quoted(items: &[String]) -> String {
    items
        .iter()
        .map(|s| format!("'{}'", s))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Stable error classification, kept for logs and health metrics after the
/// error itself has been flattened into an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    InvalidArguments,
    UnknownTool,
    DuplicateTool,
    UnknownWorkflow,
    MissingParameters,
    SessionNotFound,
    SessionStopped,
    InstrumentUnavailable,
    QuotaExceeded,
    Cancelled,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::InvalidArguments => "INVALID_ARGUMENTS",
            ErrorKind::UnknownTool => "UNKNOWN_TOOL",
            ErrorKind::DuplicateTool => "DUPLICATE_TOOL",
            ErrorKind::UnknownWorkflow => "UNKNOWN_WORKFLOW",
            ErrorKind::MissingParameters => "MISSING_PARAMETERS",
            ErrorKind::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorKind::SessionStopped => "SESSION_STOPPED",
            ErrorKind::InstrumentUnavailable => "INSTRUMENT_UNAVAILABLE",
            ErrorKind::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::UnknownProcessingType(_) => ErrorKind::Validation,
            Error::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Error::UnknownTool(_) => ErrorKind::UnknownTool,
            Error::DuplicateTool(_) => ErrorKind::DuplicateTool,
            Error::UnknownWorkflow { .. } => ErrorKind::UnknownWorkflow,
            Error::MissingParameters { .. } => ErrorKind::MissingParameters,
            Error::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Error::SessionStopped(_) => ErrorKind::SessionStopped,
            Error::InstrumentUnavailable(_) => ErrorKind::InstrumentUnavailable,
            Error::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Internal(_)
            | Error::Config(_)
            | Error::Serialization(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InstrumentUnavailable | ErrorKind::Timeout | ErrorKind::QuotaExceeded
        )
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound(id.into())
    }

    pub fn session_stopped(id: impl Into<String>) -> Self {
        Self::SessionStopped(id.into())
    }

    pub fn instrument_unavailable(msg: impl Into<String>) -> Self {
        Self::InstrumentUnavailable(msg.into())
    }

    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_message() {
        let err = Error::UnknownTool("focus_beam".to_string());
        assert_eq!(err.to_string(), "Unknown tool: focus_beam");
        assert_eq!(err.kind(), ErrorKind::UnknownTool);
    }

    #[test]
    fn test_missing_parameters_message_lists_names_in_order() {
        let err = Error::MissingParameters {
            missing: vec!["scan_size_y".to_string(), "exposure_time".to_string()],
            required: vec![],
        };
        assert_eq!(
            err.to_string(),
            "Missing required parameters: ['scan_size_y', 'exposure_time']"
        );
    }

    #[test]
    fn test_cancelled_message_is_bare() {
        assert_eq!(Error::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::instrument_unavailable("offline").retryable());
        assert!(Error::timeout("slow").retryable());
        assert!(!Error::invalid_arguments("bad").retryable());
        assert!(!Error::session_stopped("abc").retryable());
    }

    #[test]
    fn test_io_maps_to_internal_kind() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.kind().to_string(), "INTERNAL");
    }
}
