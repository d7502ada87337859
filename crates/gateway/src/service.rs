//! The four-operation shape every gateway layer implements.
//!
//! Deployment modes are built by nesting values of this trait:
//!
//! ```text
//!   Guarded ──► FrontCache ──► PersistedCache ──► RemoteAuthority
//!                          └─► LocalAuthority          (default mode)
//! ```
//!
//! Each layer owns an `Arc<dyn CardService>` for the next one and adds exactly
//! one concern. None of them branch on the deployment mode.

use async_trait::async_trait;
use cardgate_storage::{Card, CreateCardRequest, Criteria, RevokeCardRequest};

use crate::{context::CallContext, error::GatewayResult};

/// Get, search, create and revoke cards.
#[async_trait]
pub trait CardService: Send + Sync {
    /// Returns the live card with id `card_id`.
    async fn get(&self, ctx: &CallContext, card_id: &str) -> GatewayResult<Card>;

    /// Returns every live card matching `criteria`.
    async fn search(&self, ctx: &CallContext, criteria: &Criteria) -> GatewayResult<Vec<Card>>;

    /// Publishes a new card.
    async fn create(&self, ctx: &CallContext, request: &CreateCardRequest) -> GatewayResult<Card>;

    /// Revokes a card.
    async fn revoke(&self, ctx: &CallContext, request: &RevokeCardRequest) -> GatewayResult<()>;
}

