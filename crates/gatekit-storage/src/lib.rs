//! Storage abstraction for gatekit.
//!
//! Backend crates (e.g., gatekit-store-sqlite) implement [`Store`] so the billing
//! and session crates don't depend on any specific database engine or schema details.
//!
//! The store plays the part of the hosted backend: it owns the `users`,
//! `subscriptions` and `user_preferences` tables. Nothing in here interprets
//! subscription state; normalization lives in gatekit-billing.

use thiserror::Error;

mod store;
pub mod types;

pub use store::*;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}
