//! Access gate for one session.
//!
//! Ties the auth session, the reconciliation loop and the decision engine
//! together: every visit resolves the user, reconciles the subscription, and
//! hands the routing layer a [`GateDecision`].

use chrono::{DateTime, Utc};
use futures::StreamExt;
use gatekit_access::{
    checkout_view, decide, profile_view, AccessVerdict, CheckoutView, ProfileView,
    RouteDirective, RouteGuard, TrialClock,
};
use gatekit_billing::{BillingService, SubscriptionSnapshot};
use gatekit_config::GatekitConfig;
use gatekit_events::AuthEvent;
use gatekit_storage::{Store, StoreError, User, UserId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    AuthSession, AuthState, LoopPhase, ReconcileOutcome, ReconciliationLoop, SessionError, Trigger,
};

pub const AUTH_SLOW_MESSAGE: &str = "Taking longer than usual? Try refreshing the page.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub directive: RouteDirective,

    /// `None` when no verdict was needed or none could be computed yet
    pub verdict: Option<AccessVerdict>,

    /// Non-blocking message for the user (slow auth, slow or failed subscription load)
    pub notice: Option<String>,

    /// Show the onboarding tour on this surface
    pub show_onboarding: bool,
}

impl GateDecision {
    fn pending(notice: Option<String>) -> Self {
        Self {
            directive: RouteDirective::Pending,
            verdict: None,
            notice,
            show_onboarding: false,
        }
    }

    fn render() -> Self {
        Self {
            directive: RouteDirective::Render,
            verdict: None,
            notice: None,
            show_onboarding: false,
        }
    }
}

enum Resolved {
    User(User),
    Anonymous,
    StillLoading,
}

pub struct AccessGate {
    auth: Arc<dyn AuthSession>,
    billing: Arc<dyn BillingService>,
    store: Arc<dyn Store>,
    reconciler: Arc<ReconciliationLoop>,
    trial: TrialClock,
    routes: RouteGuard,
    auth_timeout: Duration,
}

impl AccessGate {
    pub fn new(
        auth: Arc<dyn AuthSession>,
        billing: Arc<dyn BillingService>,
        store: Arc<dyn Store>,
        reconciler: Arc<ReconciliationLoop>,
        config: &GatekitConfig,
    ) -> Self {
        Self {
            auth,
            billing,
            store,
            reconciler,
            trial: config.trial_clock(),
            routes: config.route_guard(),
            auth_timeout: config.auth_timeout(),
        }
    }

    pub fn reconciler(&self) -> &Arc<ReconciliationLoop> {
        &self.reconciler
    }

    /// Resolve the user, waiting for a loading session up to the auth timeout.
    async fn resolve_user(&self) -> Result<Resolved, SessionError> {
        if self.auth.state() != AuthState::Loading {
            return Ok(match self.auth.current_user().await? {
                Some(user) => Resolved::User(user),
                None => Resolved::Anonymous,
            });
        }

        match self.auth.wait_for_user(self.auth_timeout).await {
            Ok(user) => Ok(Resolved::User(user)),
            Err(SessionError::AuthUnavailable) if self.auth.state() == AuthState::Loading => {
                Ok(Resolved::StillLoading)
            }
            Err(SessionError::AuthUnavailable) => Ok(Resolved::Anonymous),
            Err(e) => Err(e),
        }
    }

    async fn require_user(&self) -> Result<User, SessionError> {
        self.auth
            .current_user()
            .await?
            .ok_or(SessionError::AuthUnavailable)
    }

    /// Decide what the routing layer should do with a visit to `path`.
    pub async fn visit(&self, path: &str, now: DateTime<Utc>) -> Result<GateDecision, SessionError> {
        let user = match self.resolve_user().await? {
            Resolved::User(user) => user,
            Resolved::StillLoading => {
                return Ok(GateDecision::pending(Some(AUTH_SLOW_MESSAGE.to_string())));
            }
            Resolved::Anonymous => {
                let directive = self.routes.guard(path, false, false);
                debug!(path, ?directive, "Anonymous visit");
                return Ok(GateDecision {
                    directive,
                    verdict: Some(decide(None, None, &self.trial.evaluate(now, now), now)),
                    notice: None,
                    show_onboarding: false,
                });
            }
        };

        if self.routes.is_public(path) && !self.routes.is_gated(path) {
            return Ok(GateDecision::render());
        }

        let Some(outcome) = self.reconciler.run(&user.id, Trigger::Visit).await else {
            return Ok(GateDecision::pending(None));
        };
        let notice = outcome.notice();
        let snapshot = match outcome {
            ReconcileOutcome::Settled(snapshot) => snapshot,
            ReconcileOutcome::TookTooLong { snapshot, .. } => snapshot,
            ReconcileOutcome::Failed(_) => self.reconciler.latest_snapshot(),
            ReconcileOutcome::Cancelled => return Ok(GateDecision::pending(None)),
        };

        let verdict = self.verdict_for(&user, snapshot.as_ref(), now);
        let directive = self.routes.gate(path, &verdict);

        let show_onboarding = directive == RouteDirective::Render
            && self.routes.is_gated(path)
            && !self.onboarding_completed(&user.id).await?;

        info!(
            user_id = %user.id,
            path,
            allowed = verdict.allowed,
            reason = %verdict.reason,
            ?directive,
            "Access decided"
        );

        Ok(GateDecision {
            directive,
            verdict: Some(verdict),
            notice,
            show_onboarding,
        })
    }

    fn verdict_for(
        &self,
        user: &User,
        snapshot: Option<&SubscriptionSnapshot>,
        now: DateTime<Utc>,
    ) -> AccessVerdict {
        let trial = self.trial.evaluate(user.created_at, now);
        if trial.clock_skew {
            warn!(
                user_id = %user.id,
                created_at = %user.created_at,
                "Account creation time is in the future, treating trial as active"
            );
        }
        decide(Some(user), snapshot, &trial, now)
    }

    /// Subscription actions for the signed-in user's profile surface.
    ///
    /// When the subscription has never been loaded for this session, the
    /// trial and subscribe affordances are withheld rather than guessed.
    pub async fn profile(&self, now: DateTime<Utc>) -> Result<ProfileView, SessionError> {
        let user = self.require_user().await?;
        let notice = match self.reconciler.run(&user.id, Trigger::Visit).await {
            Some(outcome) => outcome.notice(),
            None => {
                debug!(user_id = %user.id, "Using cached snapshot for profile");
                None
            }
        };

        if !self.reconciler.has_fetched() {
            warn!(
                user_id = %user.id,
                ?notice,
                "Subscription unknown, withholding profile actions"
            );
            return Ok(ProfileView::unavailable(&user, notice));
        }

        let snapshot = self.reconciler.latest_snapshot();
        let trial = self.trial.evaluate(user.created_at, now);
        Ok(profile_view(&user, snapshot.as_ref(), &trial, now).with_notice(notice))
    }

    /// Purchase eligibility from the cached snapshot.
    pub fn checkout(&self, now: DateTime<Utc>) -> CheckoutView {
        let loading = !self.reconciler.has_fetched()
            || self.reconciler.phase() != LoopPhase::Idle;
        checkout_view(self.reconciler.latest_snapshot().as_ref(), loading, now)
    }

    async fn subscription_id(&self, user_id: &UserId) -> Result<String, SessionError> {
        self.billing
            .get_subscription(user_id)
            .await?
            .and_then(|row| row.stripe_subscription_id)
            .ok_or(SessionError::NoSubscription)
    }

    /// Schedule cancellation at period end, then reconcile.
    pub async fn cancel_subscription(&self) -> Result<Option<ReconcileOutcome>, SessionError> {
        let user = self.require_user().await?;
        let subscription_id = self.subscription_id(&user.id).await?;

        self.billing.cancel_subscription(&subscription_id).await?;
        info!(user_id = %user.id, %subscription_id, "Cancellation requested");

        Ok(self.reconciler.run(&user.id, Trigger::Cancel).await)
    }

    /// Undo a scheduled cancellation, then reconcile.
    pub async fn reactivate_subscription(
        &self,
    ) -> Result<Option<ReconcileOutcome>, SessionError> {
        let user = self.require_user().await?;
        let subscription_id = self.subscription_id(&user.id).await?;

        self.billing.reactivate_subscription(&subscription_id).await?;
        info!(user_id = %user.id, %subscription_id, "Reactivation requested");

        Ok(self.reconciler.run(&user.id, Trigger::Reactivate).await)
    }

    async fn onboarding_completed(&self, user_id: &UserId) -> Result<bool, SessionError> {
        match self.store.get_user_preferences(user_id).await {
            Ok(prefs) => Ok(prefs.has_completed_onboarding),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn complete_onboarding(&self) -> Result<(), SessionError> {
        let user = self.require_user().await?;
        self.store.set_onboarding_completed(&user.id, true).await?;
        info!(user_id = %user.id, "Onboarding completed");
        Ok(())
    }

    /// React to an auth state change on this session.
    pub fn handle_auth_event(&self, event: &AuthEvent) {
        match event {
            AuthEvent::SignedIn { user_id } => {
                info!(%user_id, "Signed in, reconciling subscription");
                self.reconciler.spawn(user_id, Trigger::SignedIn);
            }
            AuthEvent::SignedOut => {
                info!("Signed out, clearing subscription state");
                self.reconciler.reset();
            }
            AuthEvent::UserUpdated { user_id } => {
                debug!(%user_id, "User updated");
            }
        }
    }

    /// Follow this session's auth events until the stream ends.
    pub async fn listen(self: Arc<Self>) -> Result<JoinHandle<()>, SessionError> {
        let mut events = self.auth.subscribe().await?;
        Ok(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                self.handle_auth_event(&event);
            }
            debug!("Auth event stream closed");
        }))
    }

    /// The visitor navigated away: stop any in-flight reconciliation.
    pub fn leave(&self) {
        self.reconciler.cancel();
    }
}
