//! # Cardgate Remote
//!
//! The gateway's view of the upstream card authority.
//!
//! This crate provides:
//! - **[`AuthorityClient`]**: The four-operation contract the gateway consumes
//! - **[`RemoteError`]**: Classification of authority failures into not-found, service codes and
//!   transport errors
//! - **Retry and deadlines**: [`with_retry`] and [`with_deadline`] for transient failures
//! - **[`MemoryAuthority`]**: An in-process authority with failure and latency injection
//!
//! ## Example
//!
//! ```
//! use cardgate_remote::{AuthorityClient, MemoryAuthority, RemoteConfig, with_deadline};
//!
//! # async fn example() -> Result<(), cardgate_remote::RemoteError> {
//! let authority = MemoryAuthority::new();
//! let config = RemoteConfig::default();
//!
//! let result = with_deadline(&config, None, "get_card", || authority.get_card("abc")).await;
//! assert!(result.is_err());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - **`failpoints`**: Enables the `remote-retry-before-sleep` fail point.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The authority client trait.
pub mod client;
/// Remote call settings.
pub mod config;
/// Remote error classification.
pub mod error;
/// In-process authority.
pub mod memory;
/// Retry and deadline wrappers.
pub mod retry;

pub use client::AuthorityClient;
pub use config::{RemoteConfig, RetryConfig};
pub use error::{RemoteError, RemoteResult};
pub use memory::{MemoryAuthority, Operation};
pub use retry::{with_deadline, with_retry};
