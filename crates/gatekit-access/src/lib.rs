//! gatekit-access - Access decisions for gated product surfaces
//!
//! Everything in this crate is a pure function of its inputs: the signed-in
//! user, the latest subscription snapshot, the trial window and `now`. Nothing
//! here fetches, waits or navigates.
//!
//! - [`TrialClock`] computes the trial window from the account creation time
//! - [`decide`] combines trial and subscription state into an [`AccessVerdict`]
//! - [`affordances`] derives which subscription actions a surface should offer
//! - [`routes`] turns a verdict into a directive for the routing layer

pub mod affordances;
pub mod routes;
mod trial;
mod verdict;

pub use affordances::{
    checkout_view, profile_view, CheckoutView, ProfileAction, ProfileView, TrialNotice,
    CHECKOUT_PATH, CHECKOUT_REDIRECT_DELAY,
};
pub use routes::{login_redirect, RouteDirective, RouteGuard, LOGIN_PATH, PROFILE_PATH};
pub use trial::{TrialClock, TrialStatus, DEFAULT_TRIAL_HOURS};
pub use verdict::{decide, AccessReason, AccessVerdict};
