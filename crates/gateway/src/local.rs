//! Terminal layer for the default mode, where the gateway is the authority.
//!
//! Cards are issued locally: the id is the snapshot fingerprint and the
//! record is written as permanent. Nothing here ever calls out.

use std::sync::Arc;

use async_trait::async_trait;
use cardgate_storage::{
    CARD_VERSION, CachedRecord, Card, CardMeta, Clock, CreateCardRequest, Criteria, PersistedCardStore,
    RevokeCardRequest, Signatures,
};
use cardgate_validation::card_id;

use crate::{
    context::CallContext,
    error::{GatewayError, GatewayResult},
    service::CardService,
};

/// [`CardService`] that issues and stores cards itself.
pub struct LocalAuthority {
    store: Arc<dyn PersistedCardStore>,
    clock: Arc<dyn Clock>,
}

impl LocalAuthority {
    /// Creates a local authority persisting into `store`.
    pub fn new(store: Arc<dyn PersistedCardStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl CardService for LocalAuthority {
    #[tracing::instrument(name = "local_get", skip(self, _ctx))]
    async fn get(&self, _ctx: &CallContext, card_id: &str) -> GatewayResult<Card> {
        let record = self.store.get(card_id).await?;
        match record {
            Some(record) if record.deleted => Err(GatewayError::not_found(format!("card {card_id}"))),
            Some(record) => match record.error_code() {
                Some(code) => Err(GatewayError::memoized(code, format!("card {card_id}"))),
                None => record
                    .card()
                    .cloned()
                    .ok_or_else(|| GatewayError::not_found(format!("card {card_id}"))),
            },
            None => Err(GatewayError::not_found(format!("card {card_id}"))),
        }
    }

    #[tracing::instrument(name = "local_search", skip(self, _ctx))]
    async fn search(&self, _ctx: &CallContext, criteria: &Criteria) -> GatewayResult<Vec<Card>> {
        let records = self.store.find(&criteria.normalized()).await?;
        Ok(records
            .into_iter()
            .filter(|record| !record.deleted)
            .filter_map(|record| record.card().cloned())
            .collect())
    }

    #[tracing::instrument(name = "local_create", skip_all)]
    async fn create(&self, _ctx: &CallContext, request: &CreateCardRequest) -> GatewayResult<Card> {
        let id = card_id(&request.request.snapshot);
        if let Some(existing) = self.store.get(&id).await? {
            if existing.deleted {
                return Err(GatewayError::forbidden(format!("card {id} was revoked")));
            }
            if let Some(card) = existing.card() {
                tracing::debug!(card_id = %id, "card already issued");
                return Ok(card.clone());
            }
        }

        let card = Card {
            id: id.clone(),
            snapshot: request.request.snapshot.clone(),
            meta: CardMeta {
                created_at: self.clock.now(),
                card_version: CARD_VERSION.to_owned(),
                signatures: request.request.signatures.clone(),
                relations: Signatures::new(),
            },
        };
        self.store.add(CachedRecord::authoritative(card.clone())?).await?;
        tracing::info!(card_id = %id, "card issued");
        Ok(card)
    }

    #[tracing::instrument(name = "local_revoke", skip_all, fields(card_id = %request.card_id))]
    async fn revoke(&self, _ctx: &CallContext, request: &RevokeCardRequest) -> GatewayResult<()> {
        match self.store.get(&request.card_id).await? {
            Some(record) if !record.deleted && record.card().is_some() => {
                self.store.mark_deleted(&request.card_id).await?;
                tracing::info!(card_id = %request.card_id, reason = %request.info.revocation_reason, "card revoked");
                Ok(())
            },
            _ => Err(GatewayError::not_found(format!("card {}", request.card_id))),
        }
    }
}
