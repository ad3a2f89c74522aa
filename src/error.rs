//! Server error taxonomy.
//!
//! Every failure that can be attached to a command response maps onto one
//! `ErrorKind`. The kind is rendered into the human-readable response message
//! so clients can tell a missing container from a stalled executor without
//! parsing free text.

use std::fmt;
use std::time::Duration;

use crate::model::{ContainerStatus, ReleaseId};
use crate::release::ResolveError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Coarse classification of a [`ServerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    ContainerNotStarted,
    SessionNotFound,
    UnsupportedFormat,
    MalformedPayload,
    ExecutorError,
    Timeout,
    DisposeInProgress,
    ResolutionFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::ContainerNotStarted => "ContainerNotStarted",
            ErrorKind::SessionNotFound => "SessionNotFound",
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::MalformedPayload => "MalformedPayload",
            ErrorKind::ExecutorError => "ExecutorError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::DisposeInProgress => "DisposeInProgress",
            ErrorKind::ResolutionFailed => "ResolutionFailed",
        };
        f.write_str(name)
    }
}

/// Errors raised while executing server commands.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Container '{0}' not found")]
    ContainerNotFound(String),

    #[error("Release {0} not found")]
    ReleaseNotFound(ReleaseId),

    #[error("Container '{0}' already exists")]
    AlreadyExists(String),

    #[error("Container '{id}' is not started (status: {status})")]
    ContainerNotStarted { id: String, status: ContainerStatus },

    #[error("Container '{0}' is already being disposed")]
    DisposeInProgress(String),

    #[error("Session '{session}' not found in container '{container}'")]
    SessionNotFound { container: String, session: String },

    #[error("Container '{0}' declares no default session")]
    NoDefaultSession(String),

    #[error("Unsupported marshalling format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Executor failed in session '{session}': {message}")]
    Executor { session: String, message: String },

    #[error("{operation} timed out after {}ms", timeout.as_millis())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("Failed to resolve release {release}: {message}")]
    Resolution { release: ReleaseId, message: String },
}

impl ServerError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload(message.into())
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::ContainerNotFound(_) | ServerError::ReleaseNotFound(_) => {
                ErrorKind::NotFound
            }
            ServerError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            ServerError::ContainerNotStarted { .. } => ErrorKind::ContainerNotStarted,
            ServerError::DisposeInProgress(_) => ErrorKind::DisposeInProgress,
            ServerError::SessionNotFound { .. } | ServerError::NoDefaultSession(_) => {
                ErrorKind::SessionNotFound
            }
            ServerError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ServerError::MalformedPayload(_) => ErrorKind::MalformedPayload,
            ServerError::Executor { .. } => ErrorKind::ExecutorError,
            ServerError::Timeout { .. } => ErrorKind::Timeout,
            ServerError::Resolution { .. } => ErrorKind::ResolutionFailed,
        }
    }
}

impl From<ResolveError> for ServerError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NotFound(release) => ServerError::ReleaseNotFound(release),
            ResolveError::Invalid { release, message } => {
                ServerError::Resolution { release, message }
            }
            ResolveError::Io { release, source } => ServerError::Resolution {
                release,
                message: source.to_string(),
            },
        }
    }
}
