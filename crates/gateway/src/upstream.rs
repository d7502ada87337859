//! Terminal layer that forwards every operation to the remote authority.

use std::sync::Arc;

use async_trait::async_trait;
use cardgate_remote::{AuthorityClient, RemoteConfig, with_deadline};
use cardgate_storage::{Card, CreateCardRequest, Criteria, RevokeCardRequest};

use crate::{
    context::CallContext,
    error::{GatewayError, GatewayResult},
    service::CardService,
};

/// [`CardService`] backed by an [`AuthorityClient`].
///
/// Each call is retried on transient failures and bounded by the earlier of
/// the caller's deadline and [`RemoteConfig::timeout`]. Authority errors are
/// translated into [`GatewayError`] without being cached.
#[derive(Clone)]
pub struct RemoteAuthority {
    client: Arc<dyn AuthorityClient>,
    config: RemoteConfig,
}

impl RemoteAuthority {
    /// Creates a terminal layer over `client`.
    pub fn new(client: Arc<dyn AuthorityClient>, config: RemoteConfig) -> Self {
        Self { client, config }
    }
}

impl std::fmt::Debug for RemoteAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAuthority").field("config", &self.config).finish_non_exhaustive()
    }
}

#[async_trait]
impl CardService for RemoteAuthority {
    #[tracing::instrument(name = "remote_get", skip(self, ctx))]
    async fn get(&self, ctx: &CallContext, card_id: &str) -> GatewayResult<Card> {
        with_deadline(&self.config, ctx.deadline, "get_card", || self.client.get_card(card_id))
            .await
            .map_err(GatewayError::from)
    }

    #[tracing::instrument(name = "remote_search", skip(self, ctx))]
    async fn search(&self, ctx: &CallContext, criteria: &Criteria) -> GatewayResult<Vec<Card>> {
        let criteria = criteria.normalized();
        with_deadline(&self.config, ctx.deadline, "search_cards", || self.client.search_cards(&criteria))
            .await
            .map_err(GatewayError::from)
    }

    #[tracing::instrument(name = "remote_create", skip_all)]
    async fn create(&self, ctx: &CallContext, request: &CreateCardRequest) -> GatewayResult<Card> {
        with_deadline(&self.config, ctx.deadline, "create_card", || {
            self.client.create_card(&request.request)
        })
        .await
        .map_err(GatewayError::from)
    }

    #[tracing::instrument(name = "remote_revoke", skip_all, fields(card_id = %request.card_id))]
    async fn revoke(&self, ctx: &CallContext, request: &RevokeCardRequest) -> GatewayResult<()> {
        with_deadline(&self.config, ctx.deadline, "revoke_card", || {
            self.client.revoke_card(&request.card_id, &request.request)
        })
        .await
        .map_err(GatewayError::from)
    }
}
