//! The remote card authority contract.
//!
//! The gateway consumes this trait; it does not implement the authority's
//! wire protocol. HTTP or gRPC clients live outside this workspace and plug in
//! here. [`MemoryAuthority`](crate::MemoryAuthority) is the in-process
//! implementation used by tests and local development.
//!
//! # Error classification
//!
//! Implementations must map every failure onto [`RemoteError`]:
//!
//! ```text
//! HTTP 404                 ──► RemoteError::NotFound
//! HTTP 4xx/5xx with code   ──► RemoteError::Service { status, code, .. }
//! I/O, TLS, bad response   ──► RemoteError::Transport
//! ```

use async_trait::async_trait;
use cardgate_storage::{Card, Criteria, SignableRequest};

use crate::error::RemoteResult;

/// The four operations the gateway needs from the card authority.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Fetches a card by id.
    async fn get_card(&self, card_id: &str) -> RemoteResult<Card>;

    /// Returns every live card matching `criteria`.
    async fn search_cards(&self, criteria: &Criteria) -> RemoteResult<Vec<Card>>;

    /// Publishes a signed card and returns it as issued.
    async fn create_card(&self, request: &SignableRequest) -> RemoteResult<Card>;

    /// Revokes `card_id` using a signed revocation.
    async fn revoke_card(&self, card_id: &str, request: &SignableRequest) -> RemoteResult<()>;
}
