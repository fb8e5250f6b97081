use gatekit_storage::{AuthProvider, CreateUserParams, Store};

use super::{parse_instant, Context};

pub async fn cmd_user_create(
    ctx: &Context,
    email: &str,
    provider: &str,
    created_at: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let auth_provider: AuthProvider = provider.parse()?;
    let created_at = created_at.map(|v| parse_instant(Some(v))).transpose()?;

    let user_id = ctx
        .store
        .create_user(&CreateUserParams {
            email: email.to_string(),
            auth_provider,
            created_at,
        })
        .await?;

    println!("User '{}' created (ID: {})", email, user_id);

    Ok(())
}

pub async fn cmd_user_show(ctx: &Context, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let user = ctx.find_user(user).await?;
    let trial = ctx.config.trial_clock().evaluate(user.created_at, chrono::Utc::now());

    println!("User: {}", user.email);
    println!("  ID: {}", user.id);
    println!("  Provider: {}", user.auth_provider.as_str());
    println!("  Created: {}", user.created_at.to_rfc3339());
    if let Some(at) = user.last_sign_in_at {
        println!("  Last sign-in: {}", at.to_rfc3339());
    }
    println!(
        "  Trial: {} (ends {})",
        if trial.is_active { "active" } else { "ended" },
        trial.ends_at.to_rfc3339()
    );

    Ok(())
}
