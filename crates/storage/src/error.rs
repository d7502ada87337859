//! Storage error types and result alias.
//!
//! Every [`PersistedCardStore`](crate::PersistedCardStore) implementation maps
//! its driver errors onto [`StorageError`]. The ephemeral front cache reports
//! through the narrower [`CacheError`], because callers treat every front cache
//! failure the same way: as a miss on read and as a logged no-op on write.
//!
//! # Error Types
//!
//! - [`StorageError::Connection`] - The backing database could not be reached or opened
//! - [`StorageError::Serialization`] - A record or card could not be encoded or decoded
//! - [`StorageError::Internal`] - Driver-specific failures that fit nowhere else
//!
//! # Example
//!
//! ```
//! use cardgate_storage::{StorageError, StorageResult};
//!
//! fn decode(row: &[u8]) -> StorageResult<serde_json::Value> {
//!     Ok(serde_json::from_slice(row)?)
//! }
//!
//! let err = decode(b"{").unwrap_err();
//! assert!(matches!(err, StorageError::Serialization { .. }));
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for persisted store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for ephemeral cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur during persisted store operations.
///
/// Errors preserve their source chain via the `#[source]` attribute.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The backing database could not be reached or opened.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// A record, card or snapshot could not be encoded or decoded.
    ///
    /// Usually indicates a corrupt row or an incompatible schema.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal storage error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },
}

impl StorageError {
    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_with_source("JSON encoding failed", err)
    }
}

/// Errors reported by an [`EphemeralCache`](crate::EphemeralCache).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The cache backend is unavailable.
    #[error("Cache unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// A cached value could not be encoded or decoded.
    #[error("Cache value encoding failed: {message}")]
    Encoding {
        /// Description of the encoding failure.
        message: String,
        /// The underlying serde error.
        #[source]
        source: Option<BoxError>,
    },
}

impl CacheError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding { message: err.to_string(), source: Some(Arc::new(err)) }
    }
}

/// Errors raised while validating configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric or duration field is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value, rendered for display.
        value: String,
        /// The minimum accepted value, rendered for display.
        min: String,
    },

    /// A lower bound exceeds its matching upper bound.
    #[error("{min_field} ({min}) must not exceed {max_field} ({max})")]
    InvertedRange {
        /// Name of the lower-bound field.
        min_field: &'static str,
        /// Lower-bound value.
        min: String,
        /// Name of the upper-bound field.
        max_field: &'static str,
        /// Upper-bound value.
        max: String,
    },

    /// A collaborator required by the selected deployment mode was not supplied.
    #[error("{mode} mode requires a {dependency}")]
    MissingDependency {
        /// The deployment mode being composed.
        mode: &'static str,
        /// The missing collaborator.
        dependency: &'static str,
    },
}
