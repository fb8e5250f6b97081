use gatekit_billing::normalize_provider_status;
use gatekit_session::ReconcileOutcome;
use gatekit_storage::{Store, UpsertSubscriptionParams};
use uuid::Uuid;

use super::{parse_instant, Context};

pub async fn cmd_subscription_set(
    ctx: &Context,
    user: &str,
    status: &str,
    period_end: &str,
    cancel_at_period_end: bool,
    stripe_id: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    // Reject statuses the engine could never read back
    normalize_provider_status(status)?;

    let user = ctx.find_user(user).await?;
    let current_period_end = parse_instant(Some(period_end))?;
    let stripe_subscription_id = stripe_id
        .map(str::to_string)
        .unwrap_or_else(|| format!("sub_{}", Uuid::new_v4().simple()));

    let row = ctx
        .store
        .upsert_subscription(&UpsertSubscriptionParams {
            user_id: user.id.clone(),
            stripe_subscription_id: Some(stripe_subscription_id),
            status: status.to_string(),
            current_period_end,
            cancel_at_period_end,
        })
        .await?;

    println!(
        "Subscription {} for '{}' set to '{}' (period ends {})",
        row.stripe_subscription_id.as_deref().unwrap_or("-"),
        user.email,
        row.status,
        row.current_period_end.to_rfc3339()
    );

    Ok(())
}

fn print_outcome(action: &str, outcome: Option<ReconcileOutcome>) {
    match outcome {
        Some(ReconcileOutcome::Settled(Some(snapshot))) => println!(
            "{}: status {}, cancel at period end: {}",
            action, snapshot.status, snapshot.cancel_at_period_end
        ),
        Some(ReconcileOutcome::Settled(None)) => println!("{}: no subscription", action),
        Some(other) => match other.notice() {
            Some(notice) => println!("{}: {}", action, notice),
            None => println!("{}: reconciliation cancelled", action),
        },
        None => println!("{}: reconciliation already in progress", action),
    }
}

pub async fn cmd_subscription_cancel(
    ctx: &Context,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let user = ctx.find_user(user).await?;
    let outcome = ctx.gate_for(&user.id).cancel_subscription().await?;
    print_outcome("Cancellation scheduled", outcome);
    Ok(())
}

pub async fn cmd_subscription_reactivate(
    ctx: &Context,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let user = ctx.find_user(user).await?;
    let outcome = ctx.gate_for(&user.id).reactivate_subscription().await?;
    print_outcome("Subscription reactivated", outcome);
    Ok(())
}
