//! Bounded reconciliation of the cached subscription snapshot.
//!
//! ```text
//! Idle -> Fetching(1) -> Fetching(2) -> ... -> Idle
//!            |               |
//!            +---------------+--> outcome (settled, took too long, failed)
//! ```
//!
//! A fetch that returns a pending snapshot schedules another attempt after the
//! retry interval, until the attempt budget runs out. A fetch error ends the
//! run immediately.

use gatekit_billing::{FetchError, SnapshotFetcher, SubscriptionSnapshot};
use gatekit_config::GatekitConfig;
use gatekit_storage::UserId;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

pub const TOOK_TOO_LONG_MESSAGE: &str =
    "Loading subscription is taking longer than expected. Please refresh the page.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// Total fetches per run, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 3,
        }
    }
}

impl From<&GatekitConfig> for RetryPolicy {
    fn from(config: &GatekitConfig) -> Self {
        Self {
            interval: config.retry_interval(),
            max_attempts: config.max_fetch_attempts.max(1),
        }
    }
}

/// What started a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// A protected surface was entered
    Visit,
    SignedIn,
    Cancel,
    Reactivate,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Trigger::Visit => "visit",
            Trigger::SignedIn => "signed_in",
            Trigger::Cancel => "cancel",
            Trigger::Reactivate => "reactivate",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopPhase {
    #[default]
    Idle,
    Fetching {
        attempt: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A terminal snapshot was observed (`None`: the user has no subscription)
    Settled(Option<SubscriptionSnapshot>),

    /// Every attempt came back pending; carries the last snapshot seen
    TookTooLong {
        snapshot: Option<SubscriptionSnapshot>,
        message: &'static str,
    },

    /// A fetch failed and the run stopped without retrying
    Failed(FetchError),

    /// The run was cancelled before it finished
    Cancelled,
}

impl ReconcileOutcome {
    /// User-visible notice for outcomes that did not settle cleanly
    pub fn notice(&self) -> Option<String> {
        match self {
            ReconcileOutcome::TookTooLong { message, .. } => Some(message.to_string()),
            ReconcileOutcome::Failed(e) => Some(format!("Unable to load subscription: {}", e)),
            ReconcileOutcome::Settled(_) | ReconcileOutcome::Cancelled => None,
        }
    }
}

#[derive(Debug, Default)]
struct LoopState {
    phase: LoopPhase,
    snapshot: Option<SubscriptionSnapshot>,
    has_fetched: bool,
    // Bumped on cancel so a stale run can't touch the state
    generation: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive right to run one reconciliation. Dropping it returns the loop to
/// `Idle`, which also covers runs aborted mid-sleep.
struct Claim {
    state: Arc<Mutex<LoopState>>,
    generation: u64,
}

impl Claim {
    fn enter_attempt(&self, attempt: u32) -> bool {
        let mut state = lock(&self.state);
        if state.generation != self.generation {
            return false;
        }
        state.phase = LoopPhase::Fetching { attempt };
        true
    }

    fn store(&self, snapshot: Option<SubscriptionSnapshot>) -> bool {
        let mut state = lock(&self.state);
        if state.generation != self.generation {
            return false;
        }
        state.snapshot = snapshot;
        state.has_fetched = true;
        true
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.generation == self.generation {
            state.phase = LoopPhase::Idle;
        }
    }
}

/// Keeps one session's subscription snapshot eventually consistent with billing.
pub struct ReconciliationLoop {
    fetcher: Arc<dyn SnapshotFetcher>,
    policy: RetryPolicy,
    state: Arc<Mutex<LoopState>>,
    task: Mutex<Option<AbortHandle>>,
}

impl ReconciliationLoop {
    pub fn new(fetcher: Arc<dyn SnapshotFetcher>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            policy,
            state: Arc::new(Mutex::new(LoopState::default())),
            task: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn phase(&self) -> LoopPhase {
        lock(&self.state).phase
    }

    /// Snapshot from the most recent successful fetch
    pub fn latest_snapshot(&self) -> Option<SubscriptionSnapshot> {
        lock(&self.state).snapshot.clone()
    }

    /// Whether any fetch has succeeded since creation or the last reset
    pub fn has_fetched(&self) -> bool {
        lock(&self.state).has_fetched
    }

    fn claim(&self, user_id: &UserId, trigger: Trigger) -> Option<Claim> {
        let mut state = lock(&self.state);
        if let LoopPhase::Fetching { attempt } = state.phase {
            debug!(%user_id, %trigger, attempt, "Reconciliation already in flight, ignoring trigger");
            return None;
        }
        state.phase = LoopPhase::Fetching { attempt: 1 };
        Some(Claim {
            state: Arc::clone(&self.state),
            generation: state.generation,
        })
    }

    /// Run a reconciliation to completion on the current task.
    ///
    /// Returns `None` without fetching when another run is already in flight.
    pub async fn run(&self, user_id: &UserId, trigger: Trigger) -> Option<ReconcileOutcome> {
        let claim = self.claim(user_id, trigger)?;
        let outcome = drive(
            Arc::clone(&self.fetcher),
            self.policy,
            claim,
            user_id.clone(),
            trigger,
        )
        .await;
        Some(outcome)
    }

    /// Start a reconciliation in the background. [`cancel`](Self::cancel) aborts it.
    ///
    /// The claim is taken before spawning, so a trigger right after this call
    /// is de-duplicated even if the task has not been polled yet.
    pub fn spawn(&self, user_id: &UserId, trigger: Trigger) -> Option<JoinHandle<ReconcileOutcome>> {
        let claim = self.claim(user_id, trigger)?;
        let handle = tokio::spawn(drive(
            Arc::clone(&self.fetcher),
            self.policy,
            claim,
            user_id.clone(),
            trigger,
        ));
        *lock(&self.task) = Some(handle.abort_handle());
        Some(handle)
    }

    /// Abort any in-flight run. The cached snapshot is kept.
    pub fn cancel(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }

        let mut state = lock(&self.state);
        state.generation += 1;
        if let LoopPhase::Fetching { attempt } = state.phase {
            info!(attempt, "Reconciliation cancelled");
        }
        state.phase = LoopPhase::Idle;
    }

    /// Abort any in-flight run and forget the cached snapshot.
    pub fn reset(&self) {
        self.cancel();
        let mut state = lock(&self.state);
        state.snapshot = None;
        state.has_fetched = false;
    }
}

async fn drive(
    fetcher: Arc<dyn SnapshotFetcher>,
    policy: RetryPolicy,
    claim: Claim,
    user_id: UserId,
    trigger: Trigger,
) -> ReconcileOutcome {
    let max_attempts = policy.max_attempts.max(1);
    info!(%user_id, %trigger, max_attempts, "Reconciling subscription");

    let mut attempt = 1;
    loop {
        if !claim.enter_attempt(attempt) {
            return ReconcileOutcome::Cancelled;
        }

        debug!(%user_id, attempt, "Fetching subscription snapshot");
        let result = fetcher.fetch(&user_id).await;

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(%user_id, attempt, error = %e, "Subscription fetch failed, stopping reconciliation");
                return ReconcileOutcome::Failed(e);
            }
        };

        if !claim.store(snapshot.clone()) {
            return ReconcileOutcome::Cancelled;
        }

        let pending = snapshot.as_ref().is_some_and(|s| s.pending);
        if !pending {
            info!(
                %user_id,
                attempt,
                status = ?snapshot.as_ref().map(|s| s.status),
                "Subscription settled"
            );
            return ReconcileOutcome::Settled(snapshot);
        }

        if attempt >= max_attempts {
            warn!(%user_id, attempts = attempt, "Subscription still pending, retry budget exhausted");
            return ReconcileOutcome::TookTooLong {
                snapshot,
                message: TOOK_TOO_LONG_MESSAGE,
            };
        }

        debug!(%user_id, attempt, interval = ?policy.interval, "Subscription pending, retrying");
        tokio::time::sleep(policy.interval).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use gatekit_billing::{MockSnapshotFetcher, SubscriptionStatus};
    use mockall::Sequence;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn snapshot(status: SubscriptionStatus, pending: bool) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            status,
            pending,
            current_period_end: Utc::now() + ChronoDuration::days(30),
            cancel_at_period_end: false,
            stripe_subscription_id: Some("sub_1".to_string()),
            created_at: Utc::now(),
        }
    }

    fn pending() -> SubscriptionSnapshot {
        snapshot(SubscriptionStatus::None, true)
    }

    fn active() -> SubscriptionSnapshot {
        snapshot(SubscriptionStatus::Active, false)
    }

    fn user() -> UserId {
        UserId(Uuid::new_v4())
    }

    fn reconciler(fetcher: MockSnapshotFetcher) -> ReconciliationLoop {
        ReconciliationLoop::new(Arc::new(fetcher), RetryPolicy::default())
    }

    /// Always pending, counting calls
    struct PendingFetcher {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SnapshotFetcher for PendingFetcher {
        async fn fetch(
            &self,
            _user_id: &UserId,
        ) -> Result<Option<SubscriptionSnapshot>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(pending()))
        }
    }

    #[tokio::test]
    async fn settles_on_first_terminal_fetch() {
        let mut fetcher = MockSnapshotFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(Some(active())));

        let reconciler = reconciler(fetcher);
        let outcome = reconciler.run(&user(), Trigger::Visit).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Settled(Some(ref s)) if s.status == SubscriptionStatus::Active));
        assert_eq!(reconciler.phase(), LoopPhase::Idle);
        assert!(reconciler.has_fetched());
        assert_eq!(
            reconciler.latest_snapshot().map(|s| s.status),
            Some(SubscriptionStatus::Active)
        );
    }

    #[tokio::test]
    async fn no_subscription_is_terminal() {
        let mut fetcher = MockSnapshotFetcher::new();
        fetcher.expect_fetch().times(1).returning(|_| Ok(None));

        let reconciler = reconciler(fetcher);
        let outcome = reconciler.run(&user(), Trigger::Visit).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Settled(None));
        assert!(reconciler.has_fetched());
        assert!(reconciler.latest_snapshot().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pending_retries_until_settled() {
        let mut seq = Sequence::new();
        let mut fetcher = MockSnapshotFetcher::new();
        fetcher
            .expect_fetch()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(pending())));
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(active())));

        let start = tokio::time::Instant::now();
        let outcome = reconciler(fetcher)
            .run(&user(), Trigger::Cancel)
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Settled(Some(_))));
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_stops_after_three_fetches() {
        let mut fetcher = MockSnapshotFetcher::new();
        // A fourth call has no matching expectation and would panic
        fetcher
            .expect_fetch()
            .times(3)
            .returning(|_| Ok(Some(pending())));

        let start = tokio::time::Instant::now();
        let reconciler = reconciler(fetcher);
        let outcome = reconciler.run(&user(), Trigger::Visit).await.unwrap();

        match outcome {
            ReconcileOutcome::TookTooLong { snapshot, message } => {
                assert!(snapshot.unwrap().pending);
                assert_eq!(message, TOOK_TOO_LONG_MESSAGE);
            }
            other => panic!("expected TookTooLong, got {:?}", other),
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_secs(9));
        assert_eq!(reconciler.phase(), LoopPhase::Idle);
    }

    #[tokio::test]
    async fn fetch_error_aborts_immediately() {
        let mut fetcher = MockSnapshotFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Err(FetchError::Transport("connection refused".into())));

        let outcome = reconciler(fetcher)
            .run(&user(), Trigger::Visit)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Failed(FetchError::Transport("connection refused".into()))
        );
        assert!(outcome.notice().unwrap().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn error_after_pending_keeps_last_snapshot() {
        let mut seq = Sequence::new();
        let mut fetcher = MockSnapshotFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(pending())));
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(FetchError::Timeout(Duration::from_secs(10))));

        let reconciler = reconciler(fetcher);
        let outcome = reconciler.run(&user(), Trigger::Visit).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Failed(FetchError::Timeout(_))));
        assert!(reconciler.latest_snapshot().unwrap().pending);
    }

    #[tokio::test]
    async fn trigger_while_fetching_is_ignored() {
        let mut fetcher = MockSnapshotFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(Some(active())));

        let reconciler = reconciler(fetcher);
        let user_id = user();

        let handle = reconciler.spawn(&user_id, Trigger::SignedIn).unwrap();
        assert_eq!(reconciler.phase(), LoopPhase::Fetching { attempt: 1 });
        assert!(reconciler.run(&user_id, Trigger::Visit).await.is_none());
        assert!(reconciler.spawn(&user_id, Trigger::Visit).is_none());

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Settled(Some(_))));
        assert_eq!(reconciler.phase(), LoopPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_pending_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let reconciler = ReconciliationLoop::new(
            Arc::new(PendingFetcher {
                calls: Arc::clone(&calls),
            }),
            RetryPolicy::default(),
        );
        let user_id = user();

        let handle = reconciler.spawn(&user_id, Trigger::Visit).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        reconciler.cancel();
        assert_eq!(reconciler.phase(), LoopPhase::Idle);
        assert!(handle.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A fresh trigger may start a new run
        let outcome = reconciler.run(&user_id, Trigger::Visit).await;
        assert!(matches!(outcome, Some(ReconcileOutcome::TookTooLong { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn reset_forgets_snapshot() {
        let mut fetcher = MockSnapshotFetcher::new();
        fetcher.expect_fetch().returning(|_| Ok(Some(active())));

        let reconciler = reconciler(fetcher);
        reconciler.run(&user(), Trigger::Visit).await.unwrap();
        assert!(reconciler.latest_snapshot().is_some());

        reconciler.reset();
        assert!(reconciler.latest_snapshot().is_none());
        assert!(!reconciler.has_fetched());
    }

    #[test]
    fn policy_from_config() {
        let config = GatekitConfig {
            retry_interval_ms: 250,
            max_fetch_attempts: 5,
            ..Default::default()
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(RetryPolicy::default().max_attempts, 3);
    }
}
