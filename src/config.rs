use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Telemed";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 60;
pub const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 1;
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 600_000;
pub const DEFAULT_RATE_PER_MINUTE: u32 = 100;
pub const DEFAULT_RATE_PER_HOUR: u32 = 1000;

/// Get the application data directory (~/Telemed/).
/// Falls back to the working directory when no home is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default database file
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("telemed.db")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "telemed_lib=info,telemed=info,tower_http=warn"
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration, read from `TELEMED_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    pub jwt_secret: Vec<u8>,
    /// True when no secret was configured and a random one was generated;
    /// tokens then do not survive a restart.
    pub jwt_secret_generated: bool,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub password_iterations: u32,
    pub rate_per_minute: u32,
    pub rate_per_hour: u32,
    /// Key anonymous rate limits on `X-Forwarded-For` instead of the peer
    /// address. Only enable behind a proxy that sets the header.
    pub trust_forwarded_for: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment in production,
    /// a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = parse_var(&lookup, "TELEMED_BIND_ADDR")?
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8000)));

        let database_path = lookup("TELEMED_DATABASE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        let (jwt_secret, jwt_secret_generated) = match lookup("TELEMED_JWT_SECRET") {
            Some(secret) if !secret.is_empty() => (secret.into_bytes(), false),
            _ => (random_secret(), true),
        };

        let access_minutes: i64 = parse_var(&lookup, "TELEMED_ACCESS_TOKEN_MINUTES")?
            .unwrap_or(DEFAULT_ACCESS_TOKEN_MINUTES);
        let refresh_days: i64 = parse_var(&lookup, "TELEMED_REFRESH_TOKEN_DAYS")?
            .unwrap_or(DEFAULT_REFRESH_TOKEN_DAYS);
        require_positive("TELEMED_ACCESS_TOKEN_MINUTES", access_minutes)?;
        require_positive("TELEMED_REFRESH_TOKEN_DAYS", refresh_days)?;

        let password_iterations: u32 = parse_var(&lookup, "TELEMED_PASSWORD_ITERATIONS")?
            .unwrap_or(DEFAULT_PASSWORD_ITERATIONS);
        require_positive("TELEMED_PASSWORD_ITERATIONS", i64::from(password_iterations))?;

        Ok(Self {
            bind_addr,
            database_path,
            jwt_secret,
            jwt_secret_generated,
            access_token_ttl: Duration::minutes(access_minutes),
            refresh_token_ttl: Duration::days(refresh_days),
            password_iterations,
            rate_per_minute: parse_var(&lookup, "TELEMED_RATE_PER_MINUTE")?
                .unwrap_or(DEFAULT_RATE_PER_MINUTE),
            rate_per_hour: parse_var(&lookup, "TELEMED_RATE_PER_HOUR")?
                .unwrap_or(DEFAULT_RATE_PER_HOUR),
            trust_forwarded_for: parse_var(&lookup, "TELEMED_TRUST_FORWARDED_FOR")?
                .unwrap_or(false),
        })
    }

    /// Fast hashing, fixed secret, in-memory friendly.
    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_path: PathBuf::from(":memory:"),
            jwt_secret: b"test-secret".to_vec(),
            jwt_secret_generated: false,
            access_token_ttl: Duration::minutes(DEFAULT_ACCESS_TOKEN_MINUTES),
            refresh_token_ttl: Duration::days(DEFAULT_REFRESH_TOKEN_DAYS),
            password_iterations: 1_000,
            rate_per_minute: DEFAULT_RATE_PER_MINUTE,
            rate_per_hour: DEFAULT_RATE_PER_HOUR,
            trust_forwarded_for: false,
        }
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(var, &raw, e)),
    }
}

fn require_positive(var: &'static str, value: i64) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(invalid(var, &value.to_string(), "must be positive"))
    }
}

fn invalid(var: &'static str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn random_secret() -> Vec<u8> {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(bytes)
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.access_token_ttl, Duration::minutes(60));
        assert_eq!(config.refresh_token_ttl, Duration::days(1));
        assert_eq!(config.password_iterations, 600_000);
        assert!(config.jwt_secret_generated);
        assert!(!config.jwt_secret.is_empty());
        assert!(config.database_path.ends_with("telemed.db"));
        assert!(!config.trust_forwarded_for);
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("TELEMED_BIND_ADDR", "0.0.0.0:9000"),
            ("TELEMED_DATABASE_PATH", "/tmp/t.db"),
            ("TELEMED_JWT_SECRET", "abc"),
            ("TELEMED_ACCESS_TOKEN_MINUTES", "5"),
            ("TELEMED_RATE_PER_MINUTE", "7"),
            ("TELEMED_TRUST_FORWARDED_FOR", "true"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.database_path, PathBuf::from("/tmp/t.db"));
        assert_eq!(config.jwt_secret, b"abc");
        assert!(!config.jwt_secret_generated);
        assert_eq!(config.access_token_ttl, Duration::minutes(5));
        assert_eq!(config.rate_per_minute, 7);
        assert!(config.trust_forwarded_for);
    }

    #[test]
    fn unparseable_value_fails() {
        let err = Config::from_lookup(lookup(&[("TELEMED_RATE_PER_HOUR", "lots")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var: "TELEMED_RATE_PER_HOUR", .. }
        ));
        assert!(Config::from_lookup(lookup(&[("TELEMED_ACCESS_TOKEN_MINUTES", "0")])).is_err());
    }

    #[test]
    fn app_data_dir_named_after_app() {
        assert!(app_data_dir().ends_with("Telemed"));
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
