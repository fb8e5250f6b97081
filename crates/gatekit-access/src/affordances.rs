//! Subscription actions offered on the profile and checkout surfaces.

use chrono::{DateTime, Utc};
use gatekit_billing::{SubscriptionSnapshot, SubscriptionStatus};
use gatekit_storage::User;
use serde::Serialize;
use std::time::Duration;

use crate::TrialStatus;

/// Where subscription purchases happen
pub const CHECKOUT_PATH: &str = "/pay";

/// Delay before an already-subscribed visitor is bounced off the checkout surface
pub const CHECKOUT_REDIRECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProfileAction {
    /// Schedule cancellation; access continues until `access_until`
    Cancel { access_until: DateTime<Utc> },

    /// Undo a scheduled cancellation that would end access on `ends_on`
    Resume { ends_on: DateTime<Utc> },

    Resubscribe { href: &'static str },

    Subscribe { href: &'static str },

    ResetPassword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum TrialNotice {
    InTrial { ends_at: DateTime<Utc> },
    TrialEnded { ended_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileView {
    /// Status as of `now`, after applying a scheduled cancellation
    pub status: Option<SubscriptionStatus>,
    pub trial_notice: Option<TrialNotice>,
    pub actions: Vec<ProfileAction>,

    /// Shown in place of the subscription status when it could not be loaded
    pub notice: Option<String>,
}

impl ProfileView {
    /// Profile surface while the subscription is unknown: no subscription
    /// actions, only the account ones and the reason.
    pub fn unavailable(user: &User, notice: Option<String>) -> Self {
        Self {
            status: None,
            trial_notice: None,
            actions: account_actions(user),
            notice,
        }
    }

    pub fn with_notice(mut self, notice: Option<String>) -> Self {
        self.notice = notice;
        self
    }
}

fn account_actions(user: &User) -> Vec<ProfileAction> {
    if user.is_oauth() {
        Vec::new()
    } else {
        vec![ProfileAction::ResetPassword]
    }
}

/// Build the profile surface for a signed-in user.
///
/// With a snapshot, at most one subscription action is offered: canceled or
/// lapsed subscriptions resubscribe, scheduled cancellations still inside the
/// paid period resume, live ones cancel. Without one, the trial notice and a
/// subscribe action are shown instead.
pub fn profile_view(
    user: &User,
    snapshot: Option<&SubscriptionSnapshot>,
    trial: &TrialStatus,
    now: DateTime<Utc>,
) -> ProfileView {
    let mut actions = Vec::new();
    let mut trial_notice = None;

    match snapshot {
        Some(s)
            if s.effective_status(now) == SubscriptionStatus::Canceled || s.has_lapsed(now) =>
        {
            actions.push(ProfileAction::Resubscribe {
                href: CHECKOUT_PATH,
            });
        }
        Some(s) if s.in_grace_period(now) => {
            actions.push(ProfileAction::Resume {
                ends_on: s.current_period_end,
            });
        }
        Some(s) if s.status.grants_access() => {
            actions.push(ProfileAction::Cancel {
                access_until: s.current_period_end,
            });
        }
        Some(_) => {}
        None => {
            trial_notice = Some(if trial.is_active {
                TrialNotice::InTrial {
                    ends_at: trial.ends_at,
                }
            } else {
                TrialNotice::TrialEnded {
                    ended_at: trial.ends_at,
                }
            });
            actions.push(ProfileAction::Subscribe {
                href: CHECKOUT_PATH,
            });
        }
    }

    actions.extend(account_actions(user));

    ProfileView {
        status: snapshot.map(|s| s.effective_status(now)),
        trial_notice,
        actions,
        notice: None,
    }
}

/// State of the checkout surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckoutView {
    pub can_subscribe: bool,

    /// Send the visitor to the profile page after this delay
    #[serde(skip)]
    pub redirect_after: Option<Duration>,
}

/// Whether a purchase may start given the latest snapshot.
///
/// Nothing is purchasable while the snapshot is still loading. Visitors
/// without a subscription, with one canceled outright, or with a scheduled
/// cancellation whose period has ended may buy.
pub fn checkout_view(
    snapshot: Option<&SubscriptionSnapshot>,
    loading: bool,
    now: DateTime<Utc>,
) -> CheckoutView {
    let can_subscribe = !loading
        && match snapshot {
            None => true,
            Some(s) if s.has_lapsed(now) => true,
            Some(s) => s.status == SubscriptionStatus::Canceled && !s.cancel_at_period_end,
        };

    let redirect_after = match snapshot {
        Some(s)
            if !loading && s.effective_status(now).grants_access() && !s.cancel_at_period_end =>
        {
            Some(CHECKOUT_REDIRECT_DELAY)
        }
        _ => None,
    };

    CheckoutView {
        can_subscribe,
        redirect_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{snapshot, user};
    use crate::TrialClock;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use gatekit_storage::AuthProvider;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_profile_active_offers_cancel() {
        let u = user(t0());
        let end = t0() + ChronoDuration::days(30);
        let s = snapshot(SubscriptionStatus::Active, false, end);
        let trial = TrialClock::default().evaluate(u.created_at, t0());

        let view = profile_view(&u, Some(&s), &trial, t0());
        assert_eq!(view.status, Some(SubscriptionStatus::Active));
        assert_eq!(view.trial_notice, None);
        assert_eq!(
            view.actions,
            vec![
                ProfileAction::Cancel { access_until: end },
                ProfileAction::ResetPassword
            ]
        );
    }

    #[test]
    fn test_profile_scheduled_cancellation_offers_resume() {
        let u = user(t0());
        let end = t0() + ChronoDuration::days(3);
        let s = snapshot(SubscriptionStatus::Active, true, end);
        let trial = TrialClock::default().evaluate(u.created_at, t0());

        let view = profile_view(&u, Some(&s), &trial, t0());
        assert_eq!(view.actions[0], ProfileAction::Resume { ends_on: end });
    }

    #[test]
    fn test_profile_canceled_wins_over_resume() {
        let u = user(t0());
        let s = snapshot(SubscriptionStatus::Canceled, true, t0() + ChronoDuration::days(3));
        let trial = TrialClock::default().evaluate(u.created_at, t0());

        let view = profile_view(&u, Some(&s), &trial, t0());
        assert_eq!(
            view.actions[0],
            ProfileAction::Resubscribe {
                href: CHECKOUT_PATH
            }
        );
    }

    #[test]
    fn test_profile_without_subscription_shows_trial() {
        let u = user(t0());
        let clock = TrialClock::default();

        let now = t0() + ChronoDuration::hours(2);
        let view = profile_view(&u, None, &clock.evaluate(u.created_at, now), now);
        assert_eq!(
            view.trial_notice,
            Some(TrialNotice::InTrial {
                ends_at: t0() + ChronoDuration::hours(48)
            })
        );
        assert!(view.actions.contains(&ProfileAction::Subscribe {
            href: CHECKOUT_PATH
        }));

        let later = t0() + ChronoDuration::days(3);
        let view = profile_view(&u, None, &clock.evaluate(u.created_at, later), later);
        assert!(matches!(
            view.trial_notice,
            Some(TrialNotice::TrialEnded { .. })
        ));
    }

    #[test]
    fn test_profile_oauth_has_no_password_reset() {
        let mut u = user(t0());
        u.auth_provider = AuthProvider::OauthGoogle;
        let trial = TrialClock::default().evaluate(u.created_at, t0());

        let view = profile_view(&u, None, &trial, t0());
        assert!(!view.actions.contains(&ProfileAction::ResetPassword));
    }

    #[test]
    fn test_checkout_eligibility() {
        let end = t0() + ChronoDuration::days(30);

        assert!(checkout_view(None, false, t0()).can_subscribe);
        assert!(!checkout_view(None, true, t0()).can_subscribe);

        let canceled = snapshot(SubscriptionStatus::Canceled, false, end);
        assert!(checkout_view(Some(&canceled), false, t0()).can_subscribe);

        let winding_down = snapshot(SubscriptionStatus::Canceled, true, end);
        assert!(!checkout_view(Some(&winding_down), false, t0()).can_subscribe);

        let active = snapshot(SubscriptionStatus::Active, false, end);
        let view = checkout_view(Some(&active), false, t0());
        assert!(!view.can_subscribe);
        assert_eq!(view.redirect_after, Some(CHECKOUT_REDIRECT_DELAY));
    }

    #[test]
    fn test_checkout_no_redirect_for_scheduled_cancellation() {
        let s = snapshot(SubscriptionStatus::Active, true, t0() + ChronoDuration::days(3));
        assert_eq!(checkout_view(Some(&s), false, t0()).redirect_after, None);
        assert_eq!(checkout_view(None, false, t0()).redirect_after, None);
    }

    #[test]
    fn test_lapsed_cancellation_resubscribes() {
        let u = user(t0() - ChronoDuration::days(60));
        let ended = t0() - ChronoDuration::days(5);
        let s = snapshot(SubscriptionStatus::Active, true, ended);
        let trial = TrialClock::default().evaluate(u.created_at, t0());

        let view = profile_view(&u, Some(&s), &trial, t0());
        assert_eq!(view.status, Some(SubscriptionStatus::None));
        assert_eq!(
            view.actions,
            vec![
                ProfileAction::Resubscribe {
                    href: CHECKOUT_PATH
                },
                ProfileAction::ResetPassword
            ]
        );

        let checkout = checkout_view(Some(&s), false, t0());
        assert!(checkout.can_subscribe);
        assert_eq!(checkout.redirect_after, None);
    }

    #[test]
    fn test_pending_payment_cannot_checkout() {
        let mut s = snapshot(SubscriptionStatus::None, false, t0() + ChronoDuration::days(30));
        s.pending = true;
        assert!(!checkout_view(Some(&s), false, t0()).can_subscribe);
    }

    #[test]
    fn test_unavailable_profile_hides_subscription_actions() {
        let u = user(t0());
        let view = ProfileView::unavailable(&u, Some("Unable to load subscription".into()));

        assert_eq!(view.status, None);
        assert_eq!(view.trial_notice, None);
        assert_eq!(view.actions, vec![ProfileAction::ResetPassword]);
        assert_eq!(view.notice.as_deref(), Some("Unable to load subscription"));
    }
}
