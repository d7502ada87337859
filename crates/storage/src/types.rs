//! Shared value types: error codes, card scope and search criteria.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Numeric error code attached to authority errors and memoized failures.
///
/// Codes travel inside negative cache records, so they must stay stable across
/// releases. A code of `0` is reserved to mean "no error" in persisted rows and
/// is never produced by [`ErrorCode`] constants.
///
/// # Examples
///
/// ```
/// use cardgate_storage::ErrorCode;
///
/// assert_eq!(ErrorCode::ENTITY_NOT_FOUND.as_u32(), 10001);
/// assert_eq!(ErrorCode::from(30107), ErrorCode::SCOPE_INVALID);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    /// The requested card or identity is unknown to the authority.
    pub const ENTITY_NOT_FOUND: Self = Self(10001);
    /// The operation is not permitted in the current deployment mode.
    pub const FORBIDDEN: Self = Self(10002);
    /// The authority did not answer within the call deadline.
    pub const AUTHORITY_TIMEOUT: Self = Self(10003);

    /// Identity is empty or too long.
    pub const IDENTITY_INVALID: Self = Self(30100);
    /// Identity type is empty or inconsistent with the scope.
    pub const IDENTITY_TYPE_INVALID: Self = Self(30101);
    /// Public key is shorter or longer than allowed.
    pub const PUBLIC_KEY_LENGTH_INVALID: Self = Self(30102);
    /// Too many custom data entries.
    pub const DATA_ENTRIES_EXCEEDED: Self = Self(30103);
    /// A custom data key or value is empty or too long.
    pub const DATA_ENTRY_SIZE_INVALID: Self = Self(30104);
    /// A device info field is too long.
    pub const DEVICE_INFO_INVALID: Self = Self(30105);
    /// The request carries no signatures.
    pub const SIGNATURES_MISSING: Self = Self(30106);
    /// Scope is not one of the recognized values.
    pub const SCOPE_INVALID: Self = Self(30107);
    /// The self-signature does not verify against the declared public key.
    pub const SELF_SIGNATURE_INVALID: Self = Self(30108);
    /// A revocation reason is required.
    pub const REVOCATION_REASON_MISSING: Self = Self(30109);
    /// The card id in the route does not match the revocation snapshot.
    pub const CARD_ID_MISMATCH: Self = Self(30110);
    /// A search must name at least one identity.
    pub const IDENTITIES_MISSING: Self = Self(30111);
    /// The authority signature on a request is absent or invalid.
    pub const AUTHORITY_SIGNATURE_INVALID: Self = Self(30112);
    /// The snapshot bytes do not decode into the declared fields.
    pub const SNAPSHOT_INVALID: Self = Self(30113);

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for ErrorCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        code.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visibility scope of a card.
///
/// Global cards are published by the authority for everyone and may change
/// upstream, so cached copies expire. Application cards are owned by the
/// calling application and cached permanently once seen.
///
/// Unknown scope strings are preserved as [`Scope::Unrecognized`] so request
/// validation can reject them with a precise error instead of failing during
/// deserialization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Scope {
    /// Publicly visible card managed by the authority.
    Global,
    /// Card private to the owning application.
    #[default]
    Application,
    /// Any other value supplied by a caller.
    Unrecognized(String),
}

impl Scope {
    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Global => "global",
            Self::Application => "application",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Returns `true` for the two scopes the authority understands.
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for Scope {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "global" => Self::Global,
            "application" => Self::Application,
            _ => Self::Unrecognized(raw),
        }
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Unrecognized(raw) => raw,
            other => other.as_str().to_owned(),
        }
    }
}

impl FromStr for Scope {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search criteria for cards.
///
/// An omitted scope means [`Scope::Application`]. Identity order carries no
/// meaning; [`Criteria::normalized`] sorts and deduplicates them so equal
/// searches produce equal cache keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Criteria {
    /// Identities to look up. At least one is required.
    pub identities: Vec<String>,
    /// Optional identity type filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_type: Option<String>,
    /// Scope to search; defaults to application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

impl Criteria {
    /// Creates criteria for the given identities with no type filter and the
    /// default scope.
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identities: identities.into_iter().map(Into::into).collect(),
            identity_type: None,
            scope: None,
        }
    }

    /// Sets the identity type filter.
    #[must_use]
    pub fn with_identity_type(mut self, identity_type: impl Into<String>) -> Self {
        self.identity_type = Some(identity_type.into());
        self
    }

    /// Sets the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Returns the scope this search applies to.
    #[must_use]
    pub fn effective_scope(&self) -> Scope {
        self.scope.clone().unwrap_or_default()
    }

    /// Returns a copy with sorted, deduplicated identities and an explicit scope.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut identities = self.identities.clone();
        identities.sort_unstable();
        identities.dedup();
        Self {
            identities,
            identity_type: self.identity_type.clone(),
            scope: Some(self.effective_scope()),
        }
    }

    /// Returns `true` when `identity`, `identity_type` and `scope` satisfy
    /// these criteria.
    #[must_use]
    pub fn matches(&self, identity: &str, identity_type: Option<&str>, scope: &Scope) -> bool {
        if *scope != self.effective_scope() {
            return false;
        }
        if let Some(wanted) = self.identity_type.as_deref()
            && identity_type != Some(wanted)
        {
            return false;
        }
        self.identities.iter().any(|candidate| candidate == identity)
    }
}
