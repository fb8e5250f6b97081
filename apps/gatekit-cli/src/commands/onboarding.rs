use gatekit_storage::{Store, StoreError};

use super::Context;

pub async fn cmd_onboarding_complete(
    ctx: &Context,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let user = ctx.find_user(user).await?;
    ctx.gate_for(&user.id).complete_onboarding().await?;

    println!("Onboarding completed for '{}'", user.email);

    Ok(())
}

pub async fn cmd_onboarding_status(
    ctx: &Context,
    user: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let user = ctx.find_user(user).await?;
    let completed = match ctx.store.get_user_preferences(&user.id).await {
        Ok(prefs) => prefs.has_completed_onboarding,
        Err(StoreError::NotFound) => false,
        Err(e) => return Err(e.into()),
    };

    println!(
        "Onboarding for '{}': {}",
        user.email,
        if completed { "completed" } else { "not completed" }
    );

    Ok(())
}
