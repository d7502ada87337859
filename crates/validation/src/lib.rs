//! # Cardgate Validation
//!
//! Request validation and authority signing for the cardgate gateway.
//!
//! This crate provides:
//! - **Rule chains**: Ordered, short-circuiting predicates for create, revoke and search requests
//! - **Self-signature checks**: Ed25519 verification of a card against its declared key
//! - **Request signing**: The [`RequestSigner`] seam plus an in-memory [`Ed25519Signer`]
//!
//! ## Example
//!
//! ```
//! use cardgate_validation::{Ed25519Signer, Validator, authority_signature_rule};
//!
//! let authority = Ed25519Signer::generate("authority");
//! let validator = Validator::default().with_create_rule(
//!     "authority_signature",
//!     authority_signature_rule("authority", authority.public_key()),
//! );
//! # let _ = validator;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Validation and signing error types.
pub mod error;
/// Field size limits.
pub mod limits;
/// Rule chains and the default rules.
pub mod rules;
/// Fingerprints, signature verification and signers.
pub mod signer;
/// Signed request builders for tests.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
/// Request validator.
pub mod validator;

// Re-export key types for convenience
pub use error::{SigningError, ValidationError};
pub use limits::ValidationLimits;
pub use rules::{
    GLOBAL_IDENTITY_TYPE, Rule, RuleChain, authority_signature_rule, create_rules, create_snapshot_rule,
    revoke_rules, revoke_snapshot_rule, search_rules,
};
pub use signer::{Ed25519Signer, RequestSigner, card_id, fingerprint, verify_ed25519};
pub use validator::Validator;
