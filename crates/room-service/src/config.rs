//! Room service configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! redacted in Debug output and the token signing key is held as a
//! `SecretString`.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW, MIN_HMAC_SECRET_BYTES};
use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default session token lifetime in seconds (48 hours).
pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 60 * 60 * 48;

/// Default maximum number of active members per room.
pub const DEFAULT_ROOM_MEMBER_CAP: i64 = 16;

/// Largest member cap accepted from configuration.
pub const MAX_ROOM_MEMBER_CAP: i64 = 256;

/// Default age in days after which a room is reaped.
pub const DEFAULT_ROOM_RETENTION_DAYS: i32 = 2;

/// Default UTC hour at which the daily room sweep runs.
pub const DEFAULT_ROOM_SWEEP_HOUR_UTC: u32 = 6;

/// Default seconds without a heartbeat before a listener is marked idle.
pub const DEFAULT_LISTENER_IDLE_SECONDS: i64 = 60;

/// Default interval between listener idle sweeps in seconds.
pub const DEFAULT_LISTENER_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Room service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// HMAC key used to sign session tokens.
    pub token_secret: SecretString,

    /// Session token lifetime in seconds.
    pub token_ttl_seconds: i64,

    /// Clock skew tolerance in seconds for `iat`/`exp` checks.
    pub jwt_clock_skew_seconds: i64,

    /// Maximum number of active members in one room.
    pub room_member_cap: i64,

    /// Rooms older than this many days are deleted by the daily sweep.
    pub room_retention_days: i32,

    /// UTC hour (0-23) at which the daily room sweep runs.
    pub room_sweep_hour_utc: u32,

    /// Listeners without a heartbeat for this long are marked idle.
    pub listener_idle_seconds: i64,

    /// Interval between listener idle sweeps.
    pub listener_sweep_interval_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("token_secret", &self.token_secret)
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("room_member_cap", &self.room_member_cap)
            .field("room_retention_days", &self.room_retention_days)
            .field("room_sweep_hour_utc", &self.room_sweep_hour_utc)
            .field("listener_idle_seconds", &self.listener_idle_seconds)
            .field(
                "listener_sweep_interval_seconds",
                &self.listener_sweep_interval_seconds,
            )
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid token secret: {0}")]
    InvalidTokenSecret(String),

    #[error("Invalid token TTL configuration: {0}")]
    InvalidTokenTtl(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid room member cap: {0}")]
    InvalidMemberCap(String),

    #[error("Invalid reaper configuration: {0}")]
    InvalidReaper(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let raw_secret = vars
            .get("ROOM_TOKEN_SECRET")
            .ok_or_else(|| ConfigError::MissingEnvVar("ROOM_TOKEN_SECRET".to_string()))?;
        if raw_secret.len() < MIN_HMAC_SECRET_BYTES {
            return Err(ConfigError::InvalidTokenSecret(format!(
                "ROOM_TOKEN_SECRET must be at least {} bytes, got {}",
                MIN_HMAC_SECRET_BYTES,
                raw_secret.len()
            )));
        }
        let token_secret = SecretString::from(raw_secret.clone());

        let token_ttl_seconds = if let Some(value_str) = vars.get("ROOM_TOKEN_TTL_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidTokenTtl(format!(
                    "ROOM_TOKEN_TTL_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidTokenTtl(format!(
                    "ROOM_TOKEN_TTL_SECONDS must be positive, got {}",
                    value
                )));
            }

            value
        } else {
            DEFAULT_TOKEN_TTL_SECONDS
        };

        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            if value > MAX_CLOCK_SKEW.as_secs() as i64 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        };

        let room_member_cap = if let Some(value_str) = vars.get("ROOM_MEMBER_CAP") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidMemberCap(format!(
                    "ROOM_MEMBER_CAP must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if !(1..=MAX_ROOM_MEMBER_CAP).contains(&value) {
                return Err(ConfigError::InvalidMemberCap(format!(
                    "ROOM_MEMBER_CAP must be between 1 and {}, got {}",
                    MAX_ROOM_MEMBER_CAP, value
                )));
            }

            value
        } else {
            DEFAULT_ROOM_MEMBER_CAP
        };

        let room_retention_days = parse_positive(
            vars,
            "ROOM_RETENTION_DAYS",
            DEFAULT_ROOM_RETENTION_DAYS,
        )?;

        let room_sweep_hour_utc = if let Some(value_str) = vars.get("ROOM_SWEEP_HOUR_UTC") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidReaper(format!(
                    "ROOM_SWEEP_HOUR_UTC must be a valid hour, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value > 23 {
                return Err(ConfigError::InvalidReaper(format!(
                    "ROOM_SWEEP_HOUR_UTC must be between 0 and 23, got {}",
                    value
                )));
            }

            value
        } else {
            DEFAULT_ROOM_SWEEP_HOUR_UTC
        };

        let listener_idle_seconds = parse_positive(
            vars,
            "LISTENER_IDLE_SECONDS",
            DEFAULT_LISTENER_IDLE_SECONDS,
        )?;

        let listener_sweep_interval_seconds = parse_positive(
            vars,
            "LISTENER_SWEEP_INTERVAL_SECONDS",
            DEFAULT_LISTENER_SWEEP_INTERVAL_SECONDS,
        )?;

        Ok(Config {
            database_url,
            bind_address,
            token_secret,
            token_ttl_seconds,
            jwt_clock_skew_seconds,
            room_member_cap,
            room_retention_days,
            room_sweep_hour_utc,
            listener_idle_seconds,
            listener_sweep_interval_seconds,
        })
    }

    /// Raw signing key bytes, for constructing the token service.
    pub fn token_secret_bytes(&self) -> &[u8] {
        self.token_secret.expose_secret().as_bytes()
    }
}

/// Parse an optional, strictly positive numeric reaper setting.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default + fmt::Display,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.parse().map_err(|e: T::Err| {
        ConfigError::InvalidReaper(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value <= T::default() {
        return Err(ConfigError::InvalidReaper(format!(
            "{} must be greater than 0, got {}",
            name, value
        )));
    }

    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-room-token-secret-0123456789abcdef";

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://localhost/room_test".to_string(),
            ),
            ("ROOM_TOKEN_SECRET".to_string(), TEST_SECRET.to_string()),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.database_url, "postgresql://localhost/room_test");
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.token_ttl_seconds, 172_800);
        assert_eq!(
            config.jwt_clock_skew_seconds,
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        );
        assert_eq!(config.room_member_cap, 16);
        assert_eq!(config.room_retention_days, 2);
        assert_eq!(config.room_sweep_hour_utc, 6);
        assert_eq!(config.listener_idle_seconds, 60);
        assert_eq!(config.listener_sweep_interval_seconds, 60);
        assert_eq!(config.token_secret_bytes(), TEST_SECRET.as_bytes());
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("ROOM_TOKEN_TTL_SECONDS".to_string(), "3600".to_string());
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "120".to_string());
        vars.insert("ROOM_MEMBER_CAP".to_string(), "4".to_string());
        vars.insert("ROOM_RETENTION_DAYS".to_string(), "7".to_string());
        vars.insert("ROOM_SWEEP_HOUR_UTC".to_string(), "0".to_string());
        vars.insert("LISTENER_IDLE_SECONDS".to_string(), "90".to_string());
        vars.insert(
            "LISTENER_SWEEP_INTERVAL_SECONDS".to_string(),
            "15".to_string(),
        );

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.token_ttl_seconds, 3600);
        assert_eq!(config.jwt_clock_skew_seconds, 120);
        assert_eq!(config.room_member_cap, 4);
        assert_eq!(config.room_retention_days, 7);
        assert_eq!(config.room_sweep_hour_utc, 0);
        assert_eq!(config.listener_idle_seconds, 90);
        assert_eq!(config.listener_sweep_interval_seconds, 15);
    }

    #[test]
    fn test_from_vars_missing_database_url() {
        let mut vars = base_vars();
        vars.remove("DATABASE_URL");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_from_vars_missing_token_secret() {
        let mut vars = base_vars();
        vars.remove("ROOM_TOKEN_SECRET");

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "ROOM_TOKEN_SECRET"));
    }

    #[test]
    fn test_token_secret_rejects_short_key() {
        let mut vars = base_vars();
        vars.insert("ROOM_TOKEN_SECRET".to_string(), "too-short".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidTokenSecret(msg)) if msg.contains("at least 32 bytes"))
        );
    }

    #[test]
    fn test_token_ttl_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("ROOM_TOKEN_TTL_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidTokenTtl(msg)) if msg.contains("must be positive"))
        );
    }

    #[test]
    fn test_jwt_clock_skew_rejects_too_large() {
        let mut vars = base_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "601".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtClockSkew(msg)) if msg.contains("must not exceed 600"))
        );
    }

    #[test]
    fn test_jwt_clock_skew_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert(
            "JWT_CLOCK_SKEW_SECONDS".to_string(),
            "five-minutes".to_string(),
        );

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtClockSkew(msg)) if msg.contains("must be a valid integer"))
        );
    }

    #[test]
    fn test_member_cap_rejects_out_of_range() {
        for bad in ["0", "-1", "257"] {
            let mut vars = base_vars();
            vars.insert("ROOM_MEMBER_CAP".to_string(), bad.to_string());

            let result = Config::from_vars(&vars);
            assert!(
                matches!(result, Err(ConfigError::InvalidMemberCap(ref msg)) if msg.contains("between 1 and 256")),
                "cap {bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_sweep_hour_rejects_24() {
        let mut vars = base_vars();
        vars.insert("ROOM_SWEEP_HOUR_UTC".to_string(), "24".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidReaper(msg)) if msg.contains("between 0 and 23"))
        );
    }

    #[test]
    fn test_retention_days_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("ROOM_RETENTION_DAYS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidReaper(msg)) if msg.contains("ROOM_RETENTION_DAYS must be greater than 0"))
        );
    }

    #[test]
    fn test_listener_idle_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("LISTENER_IDLE_SECONDS".to_string(), "a-minute".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidReaper(msg)) if msg.contains("must be a valid positive integer"))
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("postgresql://"));
        assert!(!debug_output.contains("room_test"));
        assert!(!debug_output.contains(TEST_SECRET));
    }
}
