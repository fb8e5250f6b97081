//! gatekit-session - Per-session orchestration of the access engine
//!
//! A session owns one [`ReconciliationLoop`], which keeps the cached
//! subscription snapshot in step with the billing system of record, and one
//! [`AccessGate`], which resolves the signed-in user, reconciles, and asks
//! `gatekit-access` for a verdict on each visit.
//!
//! # Concurrency
//!
//! At most one reconciliation is in flight per session. Triggers that arrive
//! while a fetch is running are dropped. Leaving a surface or signing out
//! aborts the in-flight loop.

use gatekit_billing::BillingError;
use gatekit_events::EventBusError;
use gatekit_storage::StoreError;
use thiserror::Error;

mod auth;
mod gate;
mod reconcile;

pub use auth::{AuthSession, AuthState, LocalAuthSession};
pub use gate::{AccessGate, GateDecision, AUTH_SLOW_MESSAGE};
pub use reconcile::{
    LoopPhase, ReconcileOutcome, ReconciliationLoop, RetryPolicy, Trigger, TOOK_TOO_LONG_MESSAGE,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No signed-in user")]
    AuthUnavailable,

    #[error("User has no subscription")]
    NoSubscription,

    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Event bus error: {0}")]
    Events(#[from] EventBusError),
}
