//! Shared test utilities for building signed requests.
//!
//! This module provides an Ed25519 key holder that produces correctly
//! self-signed create requests and signed revoke requests. It is feature-gated
//! behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! cardgate-validation = { path = "../validation", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use cardgate_storage::Scope;
//! use cardgate_validation::testutil::TestKeypair;
//!
//! let owner = TestKeypair::generate();
//! let request = owner.create_request("alice@example.com", "email", Scope::Global);
//! ```

use std::collections::BTreeMap;

use cardgate_storage::{CardInfo, CreateCardRequest, RevokeCardRequest, Scope};
use ed25519_dalek::{Signer as _, SigningKey};

use crate::signer::{card_id, fingerprint};

/// An Ed25519 key pair standing in for a card owner.
pub struct TestKeypair {
    key: SigningKey,
}

impl TestKeypair {
    /// Generates a fresh random key pair.
    #[must_use]
    pub fn generate() -> Self {
        Self { key: SigningKey::generate(&mut rand_core::OsRng) }
    }

    /// Returns the raw 32-byte public key.
    #[must_use]
    pub fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_bytes().to_vec()
    }

    /// Signs the fingerprint of `snapshot`.
    #[must_use]
    pub fn sign(&self, snapshot: &[u8]) -> Vec<u8> {
        self.key.sign(&fingerprint(snapshot)).to_bytes().to_vec()
    }

    /// Builds card fields bound to this key.
    #[must_use]
    pub fn card_info(&self, identity: &str, identity_type: &str, scope: Scope) -> CardInfo {
        CardInfo {
            identity: identity.to_owned(),
            identity_type: identity_type.to_owned(),
            public_key: self.public_key(),
            scope,
            data: BTreeMap::new(),
            info: None,
        }
    }

    /// Builds a create request for `info`, self-signed under its card id.
    #[must_use]
    pub fn sign_create(&self, info: CardInfo) -> CreateCardRequest {
        let mut request = CreateCardRequest::from_info(info).expect("card info encodes");
        let self_id = card_id(&request.request.snapshot);
        let signature = self.sign(&request.request.snapshot);
        request.request.append_signature(self_id, signature);
        request
    }

    /// Builds a self-signed create request for a card bound to this key.
    #[must_use]
    pub fn create_request(&self, identity: &str, identity_type: &str, scope: Scope) -> CreateCardRequest {
        self.sign_create(self.card_info(identity, identity_type, scope))
    }

    /// Builds a revoke request for `card_id`, signed by this key under the
    /// card id.
    #[must_use]
    pub fn revoke_request(&self, card_id: &str, reason: &str) -> RevokeCardRequest {
        let mut request = RevokeCardRequest::new(card_id, reason).expect("revocation encodes");
        let signature = self.sign(&request.request.snapshot);
        request.request.append_signature(card_id, signature);
        request
    }
}
