//! Ordered validation rule chains.
//!
//! A [`Rule`] is a pure predicate over a request. A [`RuleChain`] runs its
//! rules in order and stops at the first failure, so the caller always sees
//! the earliest violated rule. The default chains for create, revoke and
//! search requests are built by [`create_rules`], [`revoke_rules`] and
//! [`search_rules`].

use std::{fmt, sync::Arc};

use cardgate_storage::{
    CardInfo, CreateCardRequest, Criteria, ErrorCode, RevocationInfo, RevokeCardRequest, Scope,
};
use tracing::debug;

use crate::{
    error::ValidationError,
    limits::ValidationLimits,
    signer::{card_id, fingerprint, verify_ed25519},
};

/// Identity type global cards must carry.
pub const GLOBAL_IDENTITY_TYPE: &str = "email";

/// A pure validation predicate over `R`.
pub type Rule<R> = Arc<dyn Fn(&R) -> Result<(), ValidationError> + Send + Sync>;

/// A named, ordered list of rules.
pub struct RuleChain<R> {
    rules: Vec<(&'static str, Rule<R>)>,
}

impl<R> RuleChain<R> {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends `rule` to the end of the chain.
    #[must_use]
    pub fn with<F>(mut self, name: &'static str, rule: F) -> Self
    where
        F: Fn(&R) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.push(name, rule);
        self
    }

    /// Appends `rule` to the end of the chain.
    pub fn push<F>(&mut self, name: &'static str, rule: F)
    where
        F: Fn(&R) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.rules.push((name, Arc::new(rule)));
    }

    /// Returns the rule names in evaluation order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|(name, _)| *name)
    }

    /// Runs every rule in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing rule.
    pub fn check(&self, request: &R) -> Result<(), ValidationError> {
        for (name, rule) in &self.rules {
            if let Err(err) = rule(request) {
                debug!(rule = name, code = %err.code, "validation rule failed");
                return Err(err);
            }
        }
        Ok(())
    }
}

impl<R> Default for RuleChain<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for RuleChain<R> {
    fn clone(&self) -> Self {
        Self { rules: self.rules.clone() }
    }
}

impl<R> fmt::Debug for RuleChain<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn fail(code: ErrorCode, message: impl Into<String>) -> Result<(), ValidationError> {
    Err(ValidationError::new(code, message))
}

fn check_identity(identity: &str, limits: &ValidationLimits) -> Result<(), ValidationError> {
    if identity.is_empty() {
        return fail(ErrorCode::IDENTITY_INVALID, "identity must not be empty");
    }
    if identity.len() > limits.max_identity_len {
        return fail(
            ErrorCode::IDENTITY_INVALID,
            format!("identity exceeds {} bytes", limits.max_identity_len),
        );
    }
    Ok(())
}

fn check_scope(scope: &Scope) -> Result<(), ValidationError> {
    if scope.is_recognized() {
        Ok(())
    } else {
        fail(ErrorCode::SCOPE_INVALID, format!("unknown scope {scope:?}"))
    }
}

fn check_data(info: &CardInfo, limits: &ValidationLimits) -> Result<(), ValidationError> {
    if info.data.len() > limits.max_data_entries {
        return fail(
            ErrorCode::DATA_ENTRIES_EXCEEDED,
            format!("{} data entries exceed the limit of {}", info.data.len(), limits.max_data_entries),
        );
    }
    for (key, value) in &info.data {
        if key.is_empty() || value.is_empty() {
            return fail(ErrorCode::DATA_ENTRY_SIZE_INVALID, "data keys and values must not be empty");
        }
        if key.len() > limits.max_data_entry_len || value.len() > limits.max_data_entry_len {
            return fail(
                ErrorCode::DATA_ENTRY_SIZE_INVALID,
                format!("data entry {key:?} exceeds {} bytes", limits.max_data_entry_len),
            );
        }
    }
    Ok(())
}

fn check_device_info(info: &CardInfo, limits: &ValidationLimits) -> Result<(), ValidationError> {
    let Some(device) = &info.info else {
        return Ok(());
    };
    for (field, value) in [("device", &device.device), ("device_name", &device.device_name)] {
        if value.as_ref().is_some_and(|v| v.len() > limits.max_device_info_len) {
            return fail(
                ErrorCode::DEVICE_INFO_INVALID,
                format!("{field} exceeds {} bytes", limits.max_device_info_len),
            );
        }
    }
    Ok(())
}

fn check_self_signature(request: &CreateCardRequest) -> Result<(), ValidationError> {
    let snapshot = &request.request.snapshot;
    let self_id = card_id(snapshot);
    let Some(signature) = request.request.signatures.get(&self_id) else {
        return fail(ErrorCode::SELF_SIGNATURE_INVALID, "self-signature is missing");
    };
    if verify_ed25519(&request.info.public_key, &fingerprint(snapshot), signature) {
        Ok(())
    } else {
        fail(ErrorCode::SELF_SIGNATURE_INVALID, "self-signature does not verify")
    }
}

/// Default rules for create requests, in evaluation order.
#[must_use]
pub fn create_rules(limits: &ValidationLimits) -> RuleChain<CreateCardRequest> {
    let identity_limits = limits.clone();
    let key_limits = limits.clone();
    let data_limits = limits.clone();
    let device_limits = limits.clone();

    RuleChain::new()
        .with("identity", move |req: &CreateCardRequest| {
            check_identity(&req.info.identity, &identity_limits)
        })
        .with("identity_type", |req: &CreateCardRequest| {
            if req.info.identity_type.is_empty() {
                fail(ErrorCode::IDENTITY_TYPE_INVALID, "identity type must not be empty")
            } else {
                Ok(())
            }
        })
        .with("scope", |req: &CreateCardRequest| check_scope(&req.info.scope))
        .with("scope_identity_type", |req: &CreateCardRequest| {
            if req.info.scope == Scope::Global && req.info.identity_type != GLOBAL_IDENTITY_TYPE {
                fail(
                    ErrorCode::IDENTITY_TYPE_INVALID,
                    format!("global cards require identity type {GLOBAL_IDENTITY_TYPE:?}"),
                )
            } else {
                Ok(())
            }
        })
        .with("public_key_length", move |req: &CreateCardRequest| {
            let len = req.info.public_key.len();
            if (key_limits.min_public_key_len..=key_limits.max_public_key_len).contains(&len) {
                Ok(())
            } else {
                fail(
                    ErrorCode::PUBLIC_KEY_LENGTH_INVALID,
                    format!(
                        "public key is {len} bytes, expected {}..={}",
                        key_limits.min_public_key_len, key_limits.max_public_key_len
                    ),
                )
            }
        })
        .with("data", move |req: &CreateCardRequest| check_data(&req.info, &data_limits))
        .with("device_info", move |req: &CreateCardRequest| {
            check_device_info(&req.info, &device_limits)
        })
        .with("signatures_present", |req: &CreateCardRequest| {
            if req.request.signatures.is_empty() {
                fail(ErrorCode::SIGNATURES_MISSING, "request carries no signatures")
            } else {
                Ok(())
            }
        })
        .with("self_signature", check_self_signature)
}

/// Default rules for revoke requests, in evaluation order.
#[must_use]
pub fn revoke_rules() -> RuleChain<RevokeCardRequest> {
    RuleChain::new()
        .with("revocation_reason", |req: &RevokeCardRequest| {
            if req.info.revocation_reason.trim().is_empty() {
                fail(ErrorCode::REVOCATION_REASON_MISSING, "revocation reason is required")
            } else {
                Ok(())
            }
        })
        .with("card_id_match", |req: &RevokeCardRequest| {
            if req.card_id == req.info.card_id {
                Ok(())
            } else {
                fail(
                    ErrorCode::CARD_ID_MISMATCH,
                    format!("route id {} does not match snapshot id {}", req.card_id, req.info.card_id),
                )
            }
        })
        .with("signatures_present", |req: &RevokeCardRequest| {
            if req.request.signatures.is_empty() {
                fail(ErrorCode::SIGNATURES_MISSING, "request carries no signatures")
            } else {
                Ok(())
            }
        })
}

/// Default rules for search criteria, in evaluation order.
#[must_use]
pub fn search_rules(limits: &ValidationLimits) -> RuleChain<Criteria> {
    let limits = limits.clone();
    RuleChain::new()
        .with("scope", |criteria: &Criteria| criteria.scope.as_ref().map_or(Ok(()), check_scope))
        .with("identities_present", |criteria: &Criteria| {
            if criteria.identities.is_empty() {
                fail(ErrorCode::IDENTITIES_MISSING, "at least one identity is required")
            } else {
                Ok(())
            }
        })
        .with("identities", move |criteria: &Criteria| {
            criteria.identities.iter().try_for_each(|identity| check_identity(identity, &limits))
        })
        .with("identity_type", |criteria: &Criteria| {
            if criteria.identity_type.as_deref().is_some_and(str::is_empty) {
                fail(ErrorCode::IDENTITY_TYPE_INVALID, "identity type must not be empty")
            } else {
                Ok(())
            }
        })
}

/// Builds a rule requiring the structured card fields to match what the
/// signed snapshot decodes to.
///
/// The default chain trusts the caller's derivation; append this rule when
/// requests come from clients that may send the two out of step.
#[must_use]
pub fn create_snapshot_rule()
-> impl Fn(&CreateCardRequest) -> Result<(), ValidationError> + Send + Sync + 'static {
    |req: &CreateCardRequest| match CardInfo::from_snapshot(&req.request.snapshot) {
        Ok(decoded) if decoded == req.info => Ok(()),
        Ok(_) => fail(ErrorCode::SNAPSHOT_INVALID, "snapshot does not match card fields"),
        Err(e) => fail(ErrorCode::SNAPSHOT_INVALID, format!("snapshot does not decode: {e}")),
    }
}

/// Revocation counterpart of [`create_snapshot_rule`].
#[must_use]
pub fn revoke_snapshot_rule()
-> impl Fn(&RevokeCardRequest) -> Result<(), ValidationError> + Send + Sync + 'static {
    |req: &RevokeCardRequest| match serde_json::from_slice::<RevocationInfo>(&req.request.snapshot) {
        Ok(decoded) if decoded == req.info => Ok(()),
        Ok(_) => fail(ErrorCode::SNAPSHOT_INVALID, "snapshot does not match revocation fields"),
        Err(e) => fail(ErrorCode::SNAPSHOT_INVALID, format!("snapshot does not decode: {e}")),
    }
}

/// Builds a rule requiring a valid signature from `authority_id` over the
/// snapshot fingerprint, verified against `authority_key`.
///
/// Append it to a create chain to accept only cards countersigned by a
/// trusted authority.
#[must_use]
pub fn authority_signature_rule(
    authority_id: impl Into<String>,
    authority_key: [u8; 32],
) -> impl Fn(&CreateCardRequest) -> Result<(), ValidationError> + Send + Sync + 'static {
    let authority_id = authority_id.into();
    move |req: &CreateCardRequest| {
        let Some(signature) = req.request.signatures.get(&authority_id) else {
            return fail(
                ErrorCode::AUTHORITY_SIGNATURE_INVALID,
                format!("signature of {authority_id} is missing"),
            );
        };
        if verify_ed25519(&authority_key, &fingerprint(&req.request.snapshot), signature) {
            Ok(())
        } else {
            fail(
                ErrorCode::AUTHORITY_SIGNATURE_INVALID,
                format!("signature of {authority_id} does not verify"),
            )
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn chain_stops_at_first_failure() {
        let later_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&later_calls);
        let chain = RuleChain::<u32>::new()
            .with("even", |n: &u32| {
                if n % 2 == 0 { Ok(()) } else { fail(ErrorCode::IDENTITY_INVALID, "odd") }
            })
            .with("count", move |_: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        assert_eq!(chain.check(&3).unwrap_err().code, ErrorCode::IDENTITY_INVALID);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);

        chain.check(&4).unwrap();
        assert_eq!(later_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn chain_debug_lists_rule_names() {
        let chain = revoke_rules();
        assert_eq!(
            format!("{chain:?}"),
            r#"["revocation_reason", "card_id_match", "signatures_present"]"#
        );
    }

    #[test]
    fn search_requires_identities() {
        let err = search_rules(&ValidationLimits::default()).check(&Criteria::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::IDENTITIES_MISSING);
    }

    #[test]
    fn search_rejects_unknown_scope() {
        let criteria = Criteria::new(["alice"]).with_scope(Scope::from("galactic".to_owned()));
        let err = search_rules(&ValidationLimits::default()).check(&criteria).unwrap_err();
        assert_eq!(err.code, ErrorCode::SCOPE_INVALID);
    }

    #[test]
    fn search_checks_scope_before_identities() {
        let criteria = Criteria::default().with_scope(Scope::from("galactic".to_owned()));
        let err = search_rules(&ValidationLimits::default()).check(&criteria).unwrap_err();
        assert_eq!(err.code, ErrorCode::SCOPE_INVALID);
    }

    #[test]
    fn create_chain_order() {
        let chain = create_rules(&ValidationLimits::default());
        assert_eq!(chain.names().next(), Some("identity"));
        assert_eq!(chain.names().last(), Some("self_signature"));
        assert!(chain.names().all(|name| name != "snapshot"));
    }

    #[test]
    fn search_accepts_minimal_criteria() {
        search_rules(&ValidationLimits::default()).check(&Criteria::new(["alice"])).unwrap();
    }
}
