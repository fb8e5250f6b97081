mod cli;
mod commands;

use clap::Parser;
use gatekit_config::GatekitConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{AccessCommand, Cli, Command, OnboardingCommand, SubscriptionCommand, UserCommand};
use commands::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = GatekitConfig::load_or_default(cli.config.as_deref())?.apply_env()?;
    debug!(?config, "Configuration loaded");
    let ctx = Context::open(config, cli.database_url.as_deref()).await?;

    match cli.command {
        Command::User { user_cmd } => match user_cmd {
            UserCommand::Create {
                email,
                provider,
                created_at,
            } => {
                cmd_user_create(&ctx, &email, &provider, created_at.as_deref()).await?;
            }
            UserCommand::Show { user } => {
                cmd_user_show(&ctx, &user).await?;
            }
        },
        Command::Subscription { subscription_cmd } => match subscription_cmd {
            SubscriptionCommand::Set {
                user,
                status,
                period_end,
                cancel_at_period_end,
                stripe_id,
            } => {
                cmd_subscription_set(
                    &ctx,
                    &user,
                    &status,
                    &period_end,
                    cancel_at_period_end,
                    stripe_id.as_deref(),
                )
                .await?;
            }
            SubscriptionCommand::Cancel { user } => {
                cmd_subscription_cancel(&ctx, &user).await?;
            }
            SubscriptionCommand::Reactivate { user } => {
                cmd_subscription_reactivate(&ctx, &user).await?;
            }
        },
        Command::Access { access_cmd } => match access_cmd {
            AccessCommand::Check { user, path, now } => {
                cmd_access_check(&ctx, &user, &path, now.as_deref()).await?;
            }
            AccessCommand::Profile { user, now } => {
                cmd_access_profile(&ctx, &user, now.as_deref()).await?;
            }
        },
        Command::Onboarding { onboarding_cmd } => match onboarding_cmd {
            OnboardingCommand::Complete { user } => {
                cmd_onboarding_complete(&ctx, &user).await?;
            }
            OnboardingCommand::Status { user } => {
                cmd_onboarding_status(&ctx, &user).await?;
            }
        },
    }

    Ok(())
}
