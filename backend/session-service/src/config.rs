//! Configuration management for the session service
//!
//! Loads settings from environment variables, with a `.env` file honoured in
//! debug builds. Storage backends are optional: without `DATABASE_URL` users
//! live in memory, without `REDIS_URL` revocations do.

use anyhow::{bail, Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub jwt: JwtSettings,
    pub database: Option<DatabaseSettings>,
    pub redis: Option<RedisSettings>,
    pub policy: PolicySettings,
    pub seed_user: Option<SeedUser>,
}

impl Settings {
    /// Load settings, reading `.env` first in development
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) && dotenvy::dotenv().is_ok() {
            info!("Loaded .env file for development");
        }

        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            server: ServerSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            policy: PolicySettings::from_env()?,
            seed_user: SeedUser::from_env()?,
        })
    }
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("SERVER_PORT", 8080)?,
        })
    }
}

/// Token signing settings
#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub ttl_seconds: i64,
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.len() < crypto_core::jwt::MIN_SECRET_BYTES {
            bail!(
                "JWT_SECRET must be at least {} bytes",
                crypto_core::jwt::MIN_SECRET_BYTES
            );
        }

        let ttl_seconds = parse_env(
            "JWT_TTL_SECONDS",
            crypto_core::jwt::DEFAULT_ACCESS_TOKEN_TTL_SECS,
        )?;
        if ttl_seconds <= 0 {
            bail!("JWT_TTL_SECONDS must be positive");
        }

        Ok(Self {
            secret,
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "session-service".to_string()),
            ttl_seconds,
        })
    }
}

/// Postgres settings, present only when `DATABASE_URL` is set
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Option<Self>> {
        let Some(url) = non_empty_var("DATABASE_URL") else {
            return Ok(None);
        };

        Ok(Some(Self {
            url,
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
            acquire_timeout_secs: parse_env("DATABASE_ACQUIRE_TIMEOUT", 10)?,
        }))
    }
}

/// Redis settings, present only when `REDIS_URL` is set
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub response_timeout_ms: u64,
}

impl RedisSettings {
    fn from_env() -> Result<Option<Self>> {
        let Some(url) = non_empty_var("REDIS_URL") else {
            return Ok(None);
        };

        Ok(Some(Self {
            url,
            response_timeout_ms: parse_env("REDIS_RESPONSE_TIMEOUT_MS", 500)?,
        }))
    }
}

/// Session and credential policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySettings {
    pub min_password_length: usize,
    pub guest_logout_redirect: String,
    pub revoke_sessions_on_password_reset: bool,
    pub revocation_prune_interval_secs: u64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            min_password_length: 8,
            guest_logout_redirect: "/".to_string(),
            revoke_sessions_on_password_reset: false,
            revocation_prune_interval_secs: 60,
        }
    }
}

impl PolicySettings {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let min_password_length = parse_env("MIN_PASSWORD_LENGTH", defaults.min_password_length)?;
        if min_password_length == 0 || min_password_length > crate::validators::MAX_PASSWORD_LENGTH
        {
            bail!(
                "MIN_PASSWORD_LENGTH must be between 1 and {}",
                crate::validators::MAX_PASSWORD_LENGTH
            );
        }

        let revocation_prune_interval_secs = parse_env(
            "REVOCATION_PRUNE_INTERVAL_SECS",
            defaults.revocation_prune_interval_secs,
        )?;
        if revocation_prune_interval_secs == 0 {
            bail!("REVOCATION_PRUNE_INTERVAL_SECS must be positive");
        }

        Ok(Self {
            min_password_length,
            guest_logout_redirect: non_empty_var("GUEST_LOGOUT_REDIRECT")
                .unwrap_or(defaults.guest_logout_redirect),
            revoke_sessions_on_password_reset: parse_bool_env(
                "REVOKE_SESSIONS_ON_PASSWORD_RESET",
                defaults.revoke_sessions_on_password_reset,
            )?,
            revocation_prune_interval_secs,
        })
    }
}

/// Account created at startup for local development
#[derive(Clone)]
pub struct SeedUser {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SeedUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedUser")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl SeedUser {
    fn from_env() -> Result<Option<Self>> {
        match (
            non_empty_var("SEED_USER_EMAIL"),
            non_empty_var("SEED_USER_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Ok(Some(Self { email, password })),
            (None, None) => Ok(None),
            _ => bail!("SEED_USER_EMAIL and SEED_USER_PASSWORD must be set together"),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}")),
        None => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> Result<bool> {
    match non_empty_var(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => bail!("Invalid {key}: {v}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "SERVER_HOST",
        "SERVER_PORT",
        "JWT_SECRET",
        "JWT_ISSUER",
        "JWT_TTL_SECONDS",
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "REDIS_URL",
        "MIN_PASSWORD_LENGTH",
        "GUEST_LOGOUT_REDIRECT",
        "REVOKE_SESSIONS_ON_PASSWORD_RESET",
        "REVOCATION_PRUNE_INTERVAL_SECS",
        "SEED_USER_EMAIL",
        "SEED_USER_PASSWORD",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn set_secret() {
        env::set_var("JWT_SECRET", "0123456789abcdef0123456789abcdef");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        set_secret();

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.jwt.issuer, "session-service");
        assert_eq!(settings.jwt.ttl_seconds, 3600);
        assert!(settings.database.is_none());
        assert!(settings.redis.is_none());
        assert_eq!(settings.policy, PolicySettings::default());
        assert!(settings.seed_user.is_none());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_secret_fails() {
        clear_env();
        assert!(Settings::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_short_secret_fails() {
        clear_env();
        env::set_var("JWT_SECRET", "too-short");
        let err = Settings::from_env().unwrap_err();
        assert!(err.to_string().contains("at least 32 bytes"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        set_secret();
        env::set_var("SERVER_PORT", "9000");
        env::set_var("JWT_TTL_SECONDS", "120");
        env::set_var("REDIS_URL", "redis://localhost:6379");
        env::set_var("MIN_PASSWORD_LENGTH", "12");
        env::set_var("GUEST_LOGOUT_REDIRECT", "/login");
        env::set_var("REVOKE_SESSIONS_ON_PASSWORD_RESET", "true");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.jwt.ttl_seconds, 120);
        assert_eq!(
            settings.redis.map(|r| r.url).as_deref(),
            Some("redis://localhost:6379")
        );
        assert_eq!(settings.policy.min_password_length, 12);
        assert_eq!(settings.policy.guest_logout_redirect, "/login");
        assert!(settings.policy.revoke_sessions_on_password_reset);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_number_fails() {
        clear_env();
        set_secret();
        env::set_var("SERVER_PORT", "not-a-port");
        assert!(Settings::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_seed_user_requires_both() {
        clear_env();
        set_secret();
        env::set_var("SEED_USER_EMAIL", "dev@example.com");
        assert!(Settings::from_env().is_err());

        env::set_var("SEED_USER_PASSWORD", "dev-password");
        let seed = Settings::from_env().unwrap().seed_user.unwrap();
        assert_eq!(seed.email, "dev@example.com");
        assert!(!format!("{seed:?}").contains("dev-password"));
        clear_env();
    }

    #[test]
    fn test_jwt_debug_redacts_secret() {
        let jwt = JwtSettings {
            secret: "super-secret-value-that-is-long-enough".into(),
            issuer: "iss".into(),
            ttl_seconds: 60,
        };
        assert!(!format!("{jwt:?}").contains("super-secret"));
    }
}
