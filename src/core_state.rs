//! Shared application state: one SQLite connection, runtime config and
//! token signing keys. Wrapped in `Arc` at startup and handed to the
//! HTTP layer.

use std::sync::{Mutex, MutexGuard, OnceLock};

use rusqlite::Connection;

use crate::config::Config;
use crate::crypto::{hash_password, TokenKeys};
use crate::db;

pub struct CoreState {
    /// The store is the only shared mutable resource. Writers serialize
    /// on this lock; multi-row writes open a transaction under it.
    db: Mutex<Connection>,
    pub config: Config,
    pub tokens: TokenKeys,
    decoy_hash: OnceLock<String>,
}

impl CoreState {
    /// Open (or create) the database at `config.database_path` and run
    /// pending migrations.
    pub fn open(config: Config) -> Result<Self, CoreError> {
        let conn = db::open_database(&config.database_path)?;
        Ok(Self::with_connection(conn, config))
    }

    /// Fresh in-memory database. Used by tests.
    pub fn in_memory(config: Config) -> Result<Self, CoreError> {
        let conn = db::open_memory_database()?;
        Ok(Self::with_connection(conn, config))
    }

    fn with_connection(conn: Connection, config: Config) -> Self {
        let tokens = TokenKeys::new(
            &config.jwt_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        );
        Self {
            db: Mutex::new(conn),
            config,
            tokens,
            decoy_hash: OnceLock::new(),
        }
    }

    /// Lock the shared connection. Hold the guard only for the duration
    /// of one operation and never across an `.await`.
    pub fn lock_db(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.db.lock().map_err(|_| CoreError::LockPoisoned)
    }

    /// A hash of no account's password at the configured cost. Logins
    /// for unknown usernames verify against it.
    pub fn decoy_password_hash(&self) -> &str {
        self.decoy_hash
            .get_or_init(|| hash_password("decoy", self.config.password_iterations))
    }

    /// Record one access in the audit trail.
    pub fn log_access(&self, source: AccessSource, action: &str, outcome: &str) {
        tracing::info!(target: "telemed::audit", %source, action, outcome, "access");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Access source tracking
// ═══════════════════════════════════════════════════════════

/// Who made a request, for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessSource {
    /// No (valid) bearer token: register, login, health.
    Anonymous,
    /// Authenticated user.
    User { user_id: String },
}

impl std::fmt::Display for AccessSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::User { user_id } => write!(f, "user:{user_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_state_is_migrated() {
        let state = CoreState::in_memory(Config::for_tests()).unwrap();
        let conn = state.lock_db().unwrap();
        assert_eq!(db::get_current_version(&conn), 1);
    }

    #[test]
    fn file_state_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_tests();
        config.database_path = dir.path().join("nested").join("telemed.db");
        let state = CoreState::open(config).unwrap();
        drop(state);
        assert!(dir.path().join("nested").join("telemed.db").exists());
    }

    #[test]
    fn decoy_hash_matches_configured_cost() {
        let mut config = Config::for_tests();
        config.password_iterations = 1_234;
        let state = CoreState::in_memory(config).unwrap();

        let decoy = state.decoy_password_hash();
        assert_eq!(decoy.split('$').nth(1), Some("1234"));
        assert!(!crate::crypto::verify_password("password-123", decoy).unwrap());
        assert!(std::ptr::eq(decoy, state.decoy_password_hash()));
    }

    #[test]
    fn access_source_display() {
        assert_eq!(AccessSource::Anonymous.to_string(), "anonymous");
        assert_eq!(
            AccessSource::User { user_id: "abc".into() }.to_string(),
            "user:abc"
        );
    }
}
