//! Engine configuration stored in ~/.gatekit/config.json
//!
//! Every field has a default, so a missing file or a partial file is valid.
//! Environment variables override file values:
//!
//! ```bash
//! GATEKIT_TRIAL_HOURS=48
//! GATEKIT_RETRY_INTERVAL_MS=3000
//! GATEKIT_MAX_FETCH_ATTEMPTS=3
//! GATEKIT_FETCH_TIMEOUT_MS=10000
//! GATEKIT_DATABASE_URL=sqlite:///var/lib/gatekit/store.db
//! ```

use gatekit_access::routes::{DEFAULT_GATED_ROUTES, DEFAULT_PUBLIC_ROUTES};
use gatekit_access::{RouteGuard, TrialClock, DEFAULT_TRIAL_HOURS};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found")]
    NotFound,
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Could not determine home directory")]
    NoHomeDir,
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GatekitConfig {
    pub trial_hours: u32,
    pub retry_interval_ms: u64,
    /// Total fetches per reconciliation, including the first
    pub max_fetch_attempts: u32,
    pub fetch_timeout_ms: u64,
    pub auth_timeout_ms: u64,
    pub public_routes: Vec<String>,
    pub gated_routes: Vec<String>,
    pub database_url: Option<String>,
}

impl Default for GatekitConfig {
    fn default() -> Self {
        Self {
            trial_hours: DEFAULT_TRIAL_HOURS,
            retry_interval_ms: 3_000,
            max_fetch_attempts: 3,
            fetch_timeout_ms: 10_000,
            auth_timeout_ms: 15_000,
            public_routes: DEFAULT_PUBLIC_ROUTES.iter().map(|r| r.to_string()).collect(),
            gated_routes: DEFAULT_GATED_ROUTES.iter().map(|r| r.to_string()).collect(),
            database_url: None,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

impl GatekitConfig {
    /// Load config from default path (~/.gatekit/config.json)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path()?)
    }

    /// Load config from custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound
            } else {
                ConfigError::Read(e)
            }
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from `path` (or the default path), falling back to defaults
    /// when the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let result = match path {
            Some(p) => Self::load_from(p),
            None => Self::load(),
        };
        match result {
            Err(ConfigError::NotFound) => Ok(Self::default()),
            other => other,
        }
    }

    /// Save config to custom path
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self)?)?;
        Ok(())
    }

    /// Get default config path (~/.gatekit/config.json)
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".gatekit").join("config.json"))
            .ok_or(ConfigError::NoHomeDir)
    }

    /// Override fields from `GATEKIT_*` environment variables
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = parse_env("GATEKIT_TRIAL_HOURS")? {
            self.trial_hours = v;
        }
        if let Some(v) = parse_env("GATEKIT_RETRY_INTERVAL_MS")? {
            self.retry_interval_ms = v;
        }
        if let Some(v) = parse_env("GATEKIT_MAX_FETCH_ATTEMPTS")? {
            self.max_fetch_attempts = v;
        }
        if let Some(v) = parse_env("GATEKIT_FETCH_TIMEOUT_MS")? {
            self.fetch_timeout_ms = v;
        }
        if let Ok(url) = env::var("GATEKIT_DATABASE_URL") {
            self.database_url = Some(url);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_fetch_attempts < 1 {
            return Err(ConfigError::InvalidValue {
                key: "max_fetch_attempts".to_string(),
                value: self.max_fetch_attempts.to_string(),
            });
        }
        if self.trial_hours < 1 {
            return Err(ConfigError::InvalidValue {
                key: "trial_hours".to_string(),
                value: self.trial_hours.to_string(),
            });
        }
        Ok(())
    }

    pub fn trial_clock(&self) -> TrialClock {
        TrialClock::from_hours(self.trial_hours)
    }

    pub fn route_guard(&self) -> RouteGuard {
        RouteGuard::new(self.public_routes.clone(), self.gated_routes.clone())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }
}
