//! Fingerprinting, signature verification and request signing.
//!
//! Every signature in the system covers the SHA-256 fingerprint of a snapshot,
//! not the snapshot itself. A card's id is the lowercase hex encoding of that
//! fingerprint, and its self-signature is stored under that id.
//!
//! ```text
//! snapshot ──SHA-256──► fingerprint ──hex──► card id
//!                            │
//!                            └──Ed25519 sign──► signatures[signer_id]
//! ```

use std::fmt;

use cardgate_storage::SignableRequest;
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::SigningError;

/// Returns the SHA-256 fingerprint of `snapshot`.
#[must_use]
pub fn fingerprint(snapshot: &[u8]) -> [u8; 32] {
    Sha256::digest(snapshot).into()
}

/// Returns the card id derived from `snapshot`.
///
/// # Examples
///
/// ```
/// use cardgate_validation::card_id;
///
/// assert_eq!(
///     card_id(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
/// );
/// ```
#[must_use]
pub fn card_id(snapshot: &[u8]) -> String {
    hex::encode(fingerprint(snapshot))
}

/// Verifies an Ed25519 `signature` over `message` against a raw 32-byte
/// `public_key`.
///
/// Malformed keys or signatures verify as `false`.
#[must_use]
pub fn verify_ed25519(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify_strict(message, &signature).is_ok()
}

/// Appends a signature to outbound requests.
///
/// Implementations may wrap local key material or a remote signing service.
pub trait RequestSigner: Send + Sync + fmt::Debug {
    /// Id under which this signer's signatures are recorded.
    fn signer_id(&self) -> &str;

    /// Signs the fingerprint of `request.snapshot` and records the signature
    /// under [`signer_id`](Self::signer_id).
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] if no signature could be produced.
    fn sign(&self, request: &mut SignableRequest) -> Result<(), SigningError>;
}

/// [`RequestSigner`] holding an Ed25519 private key in memory.
pub struct Ed25519Signer {
    signer_id: String,
    key: SigningKey,
}

impl Ed25519Signer {
    /// Creates a signer from a 32-byte secret seed.
    #[must_use]
    pub fn from_secret(signer_id: impl Into<String>, secret: &Zeroizing<[u8; 32]>) -> Self {
        Self { signer_id: signer_id.into(), key: SigningKey::from_bytes(secret) }
    }

    /// Creates a signer from a secret seed given as a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKey`] if `secret` is not exactly 32 bytes.
    pub fn from_slice(signer_id: impl Into<String>, secret: &[u8]) -> Result<Self, SigningError> {
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(secret.try_into().map_err(|_| {
            SigningError::InvalidKey(format!("expected 32 secret bytes, got {}", secret.len()))
        })?);
        Ok(Self::from_secret(signer_id, &seed))
    }

    /// Creates a signer with a freshly generated key.
    #[must_use]
    pub fn generate(signer_id: impl Into<String>) -> Self {
        Self { signer_id: signer_id.into(), key: SigningKey::generate(&mut rand_core::OsRng) }
    }

    /// Returns the raw public key matching this signer.
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("signer_id", &self.signer_id)
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

impl RequestSigner for Ed25519Signer {
    fn signer_id(&self) -> &str {
        &self.signer_id
    }

    fn sign(&self, request: &mut SignableRequest) -> Result<(), SigningError> {
        let signature = self.key.sign(&fingerprint(&request.snapshot));
        request.append_signature(self.signer_id.clone(), signature.to_bytes().to_vec());
        debug!(signer_id = %self.signer_id, "request signed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn signer_output_verifies() {
        let signer = Ed25519Signer::generate("authority");
        let mut request = SignableRequest::new(b"snapshot".to_vec());
        signer.sign(&mut request).unwrap();

        let signature = &request.signatures["authority"];
        assert!(verify_ed25519(&signer.public_key(), &fingerprint(b"snapshot"), signature));
        assert!(!verify_ed25519(&signer.public_key(), &fingerprint(b"other"), signature));
    }

    #[test]
    fn signing_keeps_existing_signatures() {
        let signer = Ed25519Signer::generate("authority");
        let mut request = SignableRequest::new(b"snapshot".to_vec());
        request.append_signature("self", vec![1, 2, 3]);
        signer.sign(&mut request).unwrap();
        assert_eq!(request.signatures.len(), 2);
        assert_eq!(request.signatures["self"], vec![1, 2, 3]);
    }

    #[test]
    fn malformed_inputs_do_not_verify() {
        assert!(!verify_ed25519(&[0; 31], b"m", &[0; 64]));
        assert!(!verify_ed25519(&[0; 32], b"m", &[0; 10]));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(matches!(
            Ed25519Signer::from_slice("x", &[0; 16]),
            Err(SigningError::InvalidKey(_))
        ));
        let signer = Ed25519Signer::from_slice("x", &[7; 32]).unwrap();
        assert_eq!(signer.signer_id(), "x");
    }

    #[test]
    fn debug_output_hides_secret() {
        let signer = Ed25519Signer::from_slice("x", &[7; 32]).unwrap();
        let rendered = format!("{signer:?}");
        assert!(rendered.contains("public_key"));
        assert!(!rendered.contains(&hex::encode([7u8; 32])));
    }
}
