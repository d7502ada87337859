//! Validation and signing error types.

use cardgate_storage::ErrorCode;
use thiserror::Error;

/// A request failed one of the validation rules.
///
/// Carries the [`ErrorCode`] callers use to tell rejections apart and a short
/// human-readable message naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed ({code}): {message}")]
pub struct ValidationError {
    /// Stable code identifying the failed rule.
    pub code: ErrorCode,
    /// Description of the failure.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Signing a request failed.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SigningError {
    /// The key material could not be loaded.
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    /// The signer refused or failed to produce a signature.
    #[error("Signing failed for {signer_id}: {message}")]
    Failed {
        /// Id of the signer that failed.
        signer_id: String,
        /// Description of the failure.
        message: String,
    },
}
