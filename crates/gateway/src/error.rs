//! Gateway error type.
//!
//! [`GatewayError`] is what the outward-facing operations return. Every
//! variant that corresponds to a stable wire code reports it through
//! [`GatewayError::code`] so the HTTP layer can render it without matching on
//! variants.

use std::time::Duration;

use cardgate_remote::RemoteError;
use cardgate_storage::{BoxError, ConfigError, ErrorCode, StorageError};
use cardgate_validation::{SigningError, ValidationError};
use thiserror::Error;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors returned by [`CardService`](crate::CardService) implementations.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The request failed a validation rule.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No live card exists for the request.
    #[error("{resource} not found")]
    NotFound {
        /// What was looked up.
        resource: String,
    },

    /// The operation is not permitted in this deployment.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Why the operation was refused.
        message: String,
    },

    /// The authority rejected the request with a service code, either just
    /// now or memoized from an earlier call.
    #[error("authority error {code}: {message}")]
    Authority {
        /// HTTP status of the original response; `None` when memoized.
        status: Option<u16>,
        /// Service error code.
        code: ErrorCode,
        /// Description of the failure.
        message: String,
    },

    /// The authority could not be reached.
    #[error("authority unreachable: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// Underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// The authority did not answer in time.
    #[error("authority timed out")]
    Timeout {
        /// Budget that ran out; `None` when memoized.
        elapsed: Option<Duration>,
    },

    /// The persisted store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The gateway could not sign the request.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The gateway was composed from an invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GatewayError {
    /// Creates a [`GatewayError::NotFound`] for `resource`.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Creates a [`GatewayError::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    /// Rebuilds the error a negative cache entry memoized as `code`.
    #[must_use]
    pub fn memoized(code: ErrorCode, resource: impl Into<String>) -> Self {
        match code {
            ErrorCode::ENTITY_NOT_FOUND => Self::not_found(resource),
            ErrorCode::AUTHORITY_TIMEOUT => Self::Timeout { elapsed: None },
            code => Self::Authority {
                status: None,
                code,
                message: format!("memoized failure for {}", resource.into()),
            },
        }
    }

    /// Returns the stable wire code for this error, if it has one.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Validation(err) => Some(err.code),
            Self::NotFound { .. } => Some(ErrorCode::ENTITY_NOT_FOUND),
            Self::Forbidden { .. } => Some(ErrorCode::FORBIDDEN),
            Self::Authority { code, .. } => Some(*code),
            Self::Timeout { .. } => Some(ErrorCode::AUTHORITY_TIMEOUT),
            Self::Transport { .. } | Self::Storage(_) | Self::Signing(_) | Self::Config(_) => None,
        }
    }
}

/// Any 404 from the authority becomes [`GatewayError::NotFound`], whatever
/// service code accompanied it.
impl From<RemoteError> for GatewayError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound { resource } => Self::NotFound { resource },
            RemoteError::Service { status: 404, message, .. } => Self::NotFound { resource: message },
            RemoteError::Service { status, code, message } => {
                Self::Authority { status: Some(status), code, message }
            },
            RemoteError::Transport { message, source } => Self::Transport { message, source },
            RemoteError::Timeout { elapsed } => Self::Timeout { elapsed: Some(elapsed) },
            other => Self::Transport { message: other.to_string(), source: None },
        }
    }
}
