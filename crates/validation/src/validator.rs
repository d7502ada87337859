//! Request validator combining the create, revoke and search rule chains.

use cardgate_storage::{CreateCardRequest, Criteria, RevokeCardRequest};

use crate::{
    error::ValidationError,
    limits::ValidationLimits,
    rules::{RuleChain, create_rules, revoke_rules, search_rules},
};

/// Validates incoming requests before they reach any backend.
///
/// Starts from the default chains; callers may append further rules, which
/// run after the defaults.
///
/// # Examples
///
/// ```
/// use cardgate_storage::{Criteria, ErrorCode};
/// use cardgate_validation::Validator;
///
/// let validator = Validator::default();
/// let err = validator.validate_search(&Criteria::default()).unwrap_err();
/// assert_eq!(err.code, ErrorCode::IDENTITIES_MISSING);
/// ```
#[derive(Debug, Clone)]
pub struct Validator {
    create: RuleChain<CreateCardRequest>,
    revoke: RuleChain<RevokeCardRequest>,
    search: RuleChain<Criteria>,
}

impl Validator {
    /// Creates a validator with the default rules for `limits`.
    #[must_use]
    pub fn new(limits: &ValidationLimits) -> Self {
        Self {
            create: create_rules(limits),
            revoke: revoke_rules(),
            search: search_rules(limits),
        }
    }

    /// Appends a rule to the create chain.
    #[must_use]
    pub fn with_create_rule<F>(mut self, name: &'static str, rule: F) -> Self
    where
        F: Fn(&CreateCardRequest) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.create.push(name, rule);
        self
    }

    /// Appends a rule to the revoke chain.
    #[must_use]
    pub fn with_revoke_rule<F>(mut self, name: &'static str, rule: F) -> Self
    where
        F: Fn(&RevokeCardRequest) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.revoke.push(name, rule);
        self
    }

    /// Appends a rule to the search chain.
    #[must_use]
    pub fn with_search_rule<F>(mut self, name: &'static str, rule: F) -> Self
    where
        F: Fn(&Criteria) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.search.push(name, rule);
        self
    }

    /// Validates a create request.
    ///
    /// # Errors
    ///
    /// Returns the first failing rule's [`ValidationError`].
    pub fn validate_create(&self, request: &CreateCardRequest) -> Result<(), ValidationError> {
        self.create.check(request)
    }

    /// Validates a revoke request.
    ///
    /// # Errors
    ///
    /// Returns the first failing rule's [`ValidationError`].
    pub fn validate_revoke(&self, request: &RevokeCardRequest) -> Result<(), ValidationError> {
        self.revoke.check(request)
    }

    /// Validates search criteria.
    ///
    /// # Errors
    ///
    /// Returns the first failing rule's [`ValidationError`].
    pub fn validate_search(&self, criteria: &Criteria) -> Result<(), ValidationError> {
        self.search.check(criteria)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&ValidationLimits::default())
    }
}
