//! User types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::UserId;

/// How the user signs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Password,
    OauthGoogle,
}

impl FromStr for AuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" | "email" => Ok(AuthProvider::Password),
            "google" | "oauth-google" => Ok(AuthProvider::OauthGoogle),
            _ => Err(format!("invalid auth provider: {}", s)),
        }
    }
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Password => "password",
            AuthProvider::OauthGoogle => "google",
        }
    }
}

/// User record (owned by the auth collaborator; read-only to the access engine)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub auth_provider: AuthProvider,
    pub email_confirmed_at: Option<DateTime<Utc>>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// OAuth accounts have no password to reset.
    pub fn is_oauth(&self) -> bool {
        self.auth_provider == AuthProvider::OauthGoogle
    }
}

/// Parameters for creating a user
#[derive(Clone, Debug)]
pub struct CreateUserParams {
    pub email: String,
    pub auth_provider: AuthProvider,
    /// Backdate the account (defaults to now)
    pub created_at: Option<DateTime<Utc>>,
}
