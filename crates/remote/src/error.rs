//! Error types for calls to the remote card authority.
//!
//! Every failure a caller can observe falls into one of three classes:
//!
//! | Class        | Variant                              | Cached as negative? |
//! |--------------|--------------------------------------|---------------------|
//! | Not found    | [`RemoteError::NotFound`]            | yes                 |
//! | Service code | [`RemoteError::Service`]             | yes                 |
//! | Transport    | [`RemoteError::Transport`], [`RemoteError::Timeout`] | no (timeouts opt-in) |
//!
//! A [`RemoteError::Service`] carrying HTTP status 404 is treated as not found
//! by the gateway regardless of its service code.
//!
//! Transport-class errors are also the only ones [`with_retry`](crate::with_retry)
//! retries.

use std::time::Duration;

use cardgate_storage::{BoxError, ErrorCode};
use thiserror::Error;

/// Result type alias for remote authority calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors reported by an [`AuthorityClient`](crate::AuthorityClient).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// The authority has no such resource (HTTP 404).
    #[error("authority has no {resource}")]
    NotFound {
        /// The resource that was looked up.
        resource: String,
    },

    /// The authority answered with a numeric service error.
    #[error("authority error {code} (status {status}): {message}")]
    Service {
        /// HTTP status of the response.
        status: u16,
        /// Service error code from the response body.
        code: ErrorCode,
        /// Message from the response body.
        message: String,
    },

    /// The request never produced a classifiable answer.
    #[error("authority transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// Underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// The call did not finish within its time budget.
    #[error("authority call timed out after {elapsed:?}")]
    Timeout {
        /// Budget that ran out.
        elapsed: Duration,
    },
}

impl RemoteError {
    /// Creates a [`RemoteError::NotFound`] for `resource`.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Creates a [`RemoteError::Service`].
    pub fn service(status: u16, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Service { status, code, message: message.into() }
    }

    /// Creates a [`RemoteError::Transport`] without a source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), source: None }
    }

    /// Creates a [`RemoteError::Transport`] wrapping `source`.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport { message: message.into(), source: Some(std::sync::Arc::new(source)) }
    }

    /// Creates a [`RemoteError::Timeout`].
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    /// Returns `true` for failures that may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    /// Returns the service error code, if the authority supplied one.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::NotFound { .. } => Some(ErrorCode::ENTITY_NOT_FOUND),
            Self::Service { code, .. } => Some(*code),
            Self::Transport { .. } | Self::Timeout { .. } => None,
        }
    }
}
