//! Per-call context.

use std::time::Duration;

use tokio::time::Instant;

/// Caller information carried through every layer of a single operation.
///
/// `owner` names the tenant on whose behalf the call is made and partitions
/// the front cache. `deadline` bounds any call to the remote authority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    /// Tenant the call is made for; empty for anonymous callers.
    pub owner: String,
    /// Instant after which remote calls give up.
    pub deadline: Option<Instant>,
}

impl CallContext {
    /// Creates a context for `owner` with no deadline.
    pub fn new(owner: impl Into<String>) -> Self {
        Self { owner: owner.into(), deadline: None }
    }

    /// Creates an anonymous context with no deadline.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Sets the deadline to `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
