use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gatekit")]
#[command(about = "Subscription access engine CLI")]
pub struct Cli {
    /// SQLite database URL (defaults to ~/.gatekit/store.db)
    #[arg(long, env = "GATEKIT_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Path to config file (defaults to ~/.gatekit/config.json)
    #[arg(long, env = "GATEKIT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// User commands
    User {
        #[command(subcommand)]
        user_cmd: UserCommand,
    },
    /// Subscription commands
    Subscription {
        #[command(subcommand)]
        subscription_cmd: SubscriptionCommand,
    },
    /// Access decisions
    Access {
        #[command(subcommand)]
        access_cmd: AccessCommand,
    },
    /// Onboarding state
    Onboarding {
        #[command(subcommand)]
        onboarding_cmd: OnboardingCommand,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Create a user
    Create {
        /// Email address
        #[arg(long)]
        email: String,
        /// Sign-in provider (password or google)
        #[arg(long, default_value = "password")]
        provider: String,
        /// Backdate account creation (RFC 3339)
        #[arg(long)]
        created_at: Option<String>,
    },
    /// Show a user
    Show {
        /// User ID or email
        user: String,
    },
}

#[derive(Subcommand)]
pub enum SubscriptionCommand {
    /// Create or replace a user's subscription record
    Set {
        /// User ID or email
        user: String,
        /// Provider status (active, trialing, canceled, incomplete, past_due, ...)
        #[arg(long)]
        status: String,
        /// End of the current billing period (RFC 3339)
        #[arg(long)]
        period_end: String,
        /// Cancel when the period ends
        #[arg(long)]
        cancel_at_period_end: bool,
        /// Provider subscription ID (generated if omitted)
        #[arg(long)]
        stripe_id: Option<String>,
    },
    /// Schedule cancellation at period end
    Cancel {
        /// User ID or email
        user: String,
    },
    /// Undo a scheduled cancellation
    Reactivate {
        /// User ID or email
        user: String,
    },
}

#[derive(Subcommand)]
pub enum AccessCommand {
    /// Decide a visit and print the decision as JSON
    Check {
        /// User ID or email
        user: String,
        /// Path being visited
        #[arg(long, default_value = "/dashboard")]
        path: String,
        /// Evaluate at this instant instead of now (RFC 3339)
        #[arg(long)]
        now: Option<String>,
    },
    /// Print the profile surface's subscription actions as JSON
    Profile {
        /// User ID or email
        user: String,
        /// Evaluate at this instant instead of now (RFC 3339)
        #[arg(long)]
        now: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum OnboardingCommand {
    /// Mark onboarding as completed
    Complete {
        /// User ID or email
        user: String,
    },
    /// Show whether onboarding is completed
    Status {
        /// User ID or email
        user: String,
    },
}
