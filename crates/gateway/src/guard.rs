//! Validation and signing layer.
//!
//! [`Guarded`] is the outermost layer of every deployment. It runs the
//! request through the [`Validator`] rule chains and, when the deployment
//! originates mutations, countersigns the request before anything below it
//! sees the payload. A rejected request never reaches the inner layer.

use std::sync::Arc;

use async_trait::async_trait;
use cardgate_storage::{Card, CreateCardRequest, Criteria, RevokeCardRequest};
use cardgate_validation::{RequestSigner, Validator};

use crate::{context::CallContext, error::GatewayResult, service::CardService};

/// Validating, optionally signing, [`CardService`] layer.
pub struct Guarded {
    inner: Arc<dyn CardService>,
    validator: Arc<Validator>,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl Guarded {
    /// Wraps `inner`, validating requests with `validator` and signing
    /// mutations with `signer` when one is given.
    pub fn new(
        inner: Arc<dyn CardService>,
        validator: Arc<Validator>,
        signer: Option<Arc<dyn RequestSigner>>,
    ) -> Self {
        Self { inner, validator, signer }
    }
}

impl std::fmt::Debug for Guarded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guarded")
            .field("validator", &self.validator)
            .field("signer", &self.signer.as_ref().map(|signer| signer.signer_id()))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CardService for Guarded {
    async fn get(&self, ctx: &CallContext, card_id: &str) -> GatewayResult<Card> {
        self.inner.get(ctx, card_id).await
    }

    #[tracing::instrument(name = "guard_search", skip(self, ctx))]
    async fn search(&self, ctx: &CallContext, criteria: &Criteria) -> GatewayResult<Vec<Card>> {
        self.validator.validate_search(criteria)?;
        self.inner.search(ctx, criteria).await
    }

    #[tracing::instrument(name = "guard_create", skip_all)]
    async fn create(&self, ctx: &CallContext, request: &CreateCardRequest) -> GatewayResult<Card> {
        self.validator.validate_create(request)?;
        match &self.signer {
            Some(signer) => {
                let mut signed = request.clone();
                signer.sign(&mut signed.request)?;
                tracing::debug!(signer_id = signer.signer_id(), "create request countersigned");
                self.inner.create(ctx, &signed).await
            },
            None => self.inner.create(ctx, request).await,
        }
    }

    #[tracing::instrument(name = "guard_revoke", skip_all, fields(card_id = %request.card_id))]
    async fn revoke(&self, ctx: &CallContext, request: &RevokeCardRequest) -> GatewayResult<()> {
        self.validator.validate_revoke(request)?;
        match &self.signer {
            Some(signer) => {
                let mut signed = request.clone();
                signer.sign(&mut signed.request)?;
                tracing::debug!(signer_id = signer.signer_id(), "revoke request countersigned");
                self.inner.revoke(ctx, &signed).await
            },
            None => self.inner.revoke(ctx, request).await,
        }
    }
}
