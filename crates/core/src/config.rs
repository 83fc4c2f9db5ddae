use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LikelihoodError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub postgres: PostgresConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `LIKELIHOOD_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, LikelihoodError> {
        let profile = env_or("LIKELIHOOD_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, LikelihoodError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Ok(Self {
            profile: p.to_string(),
            postgres: PostgresConfig::from_env_profiled(p),
            engine: EngineConfig::from_env_profiled(p)?,
        })
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  postgres:    host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!(
            "  engine:      recipes={}, overflow={}, full_history={}",
            self.engine.recipes_path.display(),
            self.engine.overflow_policy,
            self.engine.full_history
        );
    }

    /// Return a redacted view (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
            "engine": {
                "recipes_path": self.engine.recipes_path,
                "overflow_policy": self.engine.overflow_policy,
                "full_history": self.engine.full_history,
            },
        })
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
    /// Full connection URL; takes precedence over the individual fields.
    pub url: Option<String>,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "ba"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 5),
            url: profiled_env_opt(p, "PG_URL"),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    /// `PG_URL` if set, otherwise the URL assembled from the parts.
    pub fn database_url(&self) -> String {
        self.url.clone().unwrap_or_else(|| self.connection_string())
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some() || self.username.is_some()
    }
}

// ── Engine ────────────────────────────────────────────────────

/// What to do when a date holds more base features than its recipe allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Skip the date and leave any stored derived value in place.
    #[default]
    Keep,
    /// Delete a stored derived value for the overflowing date.
    Delete,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Keep => write!(f, "keep"),
            OverflowPolicy::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = LikelihoodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Ok(OverflowPolicy::Keep),
            "delete" => Ok(OverflowPolicy::Delete),
            _ => Err(LikelihoodError::InvalidConfig {
                key: "LIKELIHOOD_OVERFLOW_POLICY".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the recipe YAML document.
    pub recipes_path: PathBuf,
    pub overflow_policy: OverflowPolicy,
    /// Reconcile every stored day up to the end date instead of only the
    /// requested range.
    pub full_history: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recipes_path: PathBuf::from("config/recipes.yml"),
            overflow_policy: OverflowPolicy::Keep,
            full_history: true,
        }
    }
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Result<Self, LikelihoodError> {
        let defaults = Self::default();
        let overflow_policy = match profiled_env_opt(p, "LIKELIHOOD_OVERFLOW_POLICY") {
            Some(v) => v.parse()?,
            None => defaults.overflow_policy,
        };
        let full_history = match profiled_env_opt(p, "LIKELIHOOD_FULL_HISTORY") {
            Some(v) => parse_bool(&v).ok_or(LikelihoodError::InvalidConfig {
                key: "LIKELIHOOD_FULL_HISTORY".to_string(),
                value: v,
            })?,
            None => defaults.full_history,
        };
        Ok(Self {
            recipes_path: profiled_env_opt(p, "LIKELIHOOD_RECIPES")
                .map(PathBuf::from)
                .unwrap_or(defaults.recipes_path),
            overflow_policy,
            full_history,
        })
    }
}
