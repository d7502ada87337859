//! Card model and request shapes.
//!
//! A [`Card`] is an immutable, signed public-key record. Its `snapshot` is the
//! exact byte sequence every signature covers, so it is carried verbatim and
//! never re-encoded. The structured view of those bytes is [`CardInfo`], which
//! is JSON on the wire.
//!
//! Binary fields (snapshots, public keys, signatures) are base64 in JSON, which
//! is how they travel between the gateway and the authority.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Scope;

/// Card version written into metadata for cards issued by this gateway.
pub const CARD_VERSION: &str = "4.0";

/// Signature map keyed by signer id.
pub type Signatures = BTreeMap<String, Vec<u8>>;

/// A signed card as returned by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Authority-assigned identifier.
    pub id: String,
    /// Canonical signed bytes.
    #[serde(rename = "content_snapshot", with = "b64")]
    pub snapshot: Vec<u8>,
    /// Authority metadata.
    pub meta: CardMeta,
}

impl Card {
    /// Decodes the structured fields covered by the snapshot.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the snapshot is not a valid [`CardInfo`].
    pub fn info(&self) -> Result<CardInfo, serde_json::Error> {
        CardInfo::from_snapshot(&self.snapshot)
    }
}

/// Metadata attached to a card by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMeta {
    /// When the card was issued.
    pub created_at: DateTime<Utc>,
    /// Card format version.
    pub card_version: String,
    /// Signatures over the snapshot, keyed by signer id.
    #[serde(rename = "signs", with = "b64_map")]
    pub signatures: Signatures,
    /// Opaque relations to other cards.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", with = "b64_map")]
    pub relations: Signatures,
}

/// Optional device description embedded in a card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceInfo {
    /// Device class, for example `"iPhone"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Human-readable device name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

/// Structured card fields, encoded as JSON inside a card snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardInfo {
    /// The identity the card binds a key to.
    pub identity: String,
    /// Kind of identity, for example `"email"`.
    pub identity_type: String,
    /// Raw public key bytes.
    #[serde(with = "b64")]
    pub public_key: Vec<u8>,
    /// Card scope.
    #[serde(default)]
    pub scope: Scope,
    /// Custom key/value data.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    /// Optional device description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<DeviceInfo>,
}

impl CardInfo {
    /// Encodes these fields as snapshot bytes.
    ///
    /// # Errors
    ///
    /// Returns the serde error if encoding fails.
    pub fn to_snapshot(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes snapshot bytes.
    ///
    /// # Errors
    ///
    /// Returns the serde error when `snapshot` is not a valid encoding.
    pub fn from_snapshot(snapshot: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(snapshot)
    }
}

/// Revocation fields, encoded as JSON inside a revocation snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevocationInfo {
    /// The card being revoked.
    pub card_id: String,
    /// Why the card is being revoked, for example `"compromised"`.
    #[serde(default)]
    pub revocation_reason: String,
}

impl RevocationInfo {
    /// Encodes these fields as snapshot bytes.
    ///
    /// # Errors
    ///
    /// Returns the serde error if encoding fails.
    pub fn to_snapshot(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Snapshot bytes plus the signatures collected over them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignableRequest {
    /// Canonical signed bytes.
    #[serde(rename = "content_snapshot", with = "b64")]
    pub snapshot: Vec<u8>,
    /// Signatures keyed by signer id.
    #[serde(rename = "signs", default, with = "b64_map")]
    pub signatures: Signatures,
}

impl SignableRequest {
    /// Creates an unsigned request over `snapshot`.
    #[must_use]
    pub fn new(snapshot: Vec<u8>) -> Self {
        Self { snapshot, signatures: Signatures::new() }
    }

    /// Adds or replaces the signature of `signer_id`.
    pub fn append_signature(&mut self, signer_id: impl Into<String>, signature: Vec<u8>) {
        self.signatures.insert(signer_id.into(), signature);
    }
}

/// A request to publish a new card.
///
/// `info` is the caller's decoding of `request.snapshot`; validation checks the
/// two agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCardRequest {
    /// Structured fields of the snapshot.
    pub info: CardInfo,
    /// Signed payload forwarded to the authority.
    pub request: SignableRequest,
}

impl CreateCardRequest {
    /// Builds an unsigned request whose snapshot encodes `info`.
    ///
    /// # Errors
    ///
    /// Returns the serde error if `info` cannot be encoded.
    pub fn from_info(info: CardInfo) -> Result<Self, serde_json::Error> {
        let snapshot = info.to_snapshot()?;
        Ok(Self { info, request: SignableRequest::new(snapshot) })
    }
}

/// A request to revoke an existing card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeCardRequest {
    /// Card id taken from the request route.
    pub card_id: String,
    /// Structured fields of the snapshot.
    pub info: RevocationInfo,
    /// Signed payload forwarded to the authority.
    pub request: SignableRequest,
}

impl RevokeCardRequest {
    /// Builds an unsigned revocation of `card_id` for `reason`.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the revocation snapshot cannot be encoded.
    pub fn new(card_id: impl Into<String>, reason: impl Into<String>) -> Result<Self, serde_json::Error> {
        let card_id = card_id.into();
        let info = RevocationInfo { card_id: card_id.clone(), revocation_reason: reason.into() };
        let snapshot = info.to_snapshot()?;
        Ok(Self { card_id, info, request: SignableRequest::new(snapshot) })
    }
}

mod b64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

mod b64_map {
    use std::collections::BTreeMap;

    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::SerializeMap};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (key, value) in map {
            out.serialize_entry(key, &STANDARD.encode(value))?;
        }
        out.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(key, value)| {
                STANDARD.decode(value.as_bytes()).map(|bytes| (key, bytes)).map_err(D::Error::custom)
            })
            .collect()
    }
}
