//! Registration and login.
//!
//! Login credentials are hashed with [`PasswordRecord`] and never touch
//! the session key. New users are always stored in the combined layout;
//! legacy rows keep verifying until they are re-registered.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tracing::{info, warn};

use super::record_access;
use crate::config::Settings;
use crate::crypto::PasswordRecord;
use crate::errors::{Result, VaultError};
use crate::store::{AccessLogStore, CredentialStore, UserId, UserRecord};

/// Minimum login password length unless configured higher.
pub const MIN_PASSWORD_LEN: usize = 6;

pub struct UserService {
    store: Arc<dyn CredentialStore>,
    access_log: Option<Arc<dyn AccessLogStore>>,
    min_password_len: usize,
}

impl UserService {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            access_log: None,
            min_password_len: MIN_PASSWORD_LEN,
        }
    }

    /// Apply the password policy from `settings`.
    pub fn with_settings(mut self, settings: &Settings) -> Result<Self> {
        settings.validate()?;
        self.min_password_len = settings.min_password_len;
        Ok(self)
    }

    /// Record login and other events in `log`.
    pub fn with_access_log(mut self, log: Arc<dyn AccessLogStore>) -> Self {
        self.access_log = Some(log);
        self
    }

    /// Create a new login.
    pub fn register(&self, username: &str, password: &str) -> Result<UserRecord> {
        if username.trim().is_empty() {
            return Err(VaultError::Validation("username cannot be empty".into()));
        }
        if password.chars().count() < self.min_password_len {
            return Err(VaultError::Validation(format!(
                "password must be at least {} characters",
                self.min_password_len
            )));
        }
        if self.store.find_by_username(username)?.is_some() {
            return Err(VaultError::UsernameTaken(username.to_string()));
        }

        let record = PasswordRecord::new(password)?;
        let user = self.store.insert(username, &record)?;
        info!(user_id = user.id, "user registered");
        record_access(self.access_log.as_deref(), user.id, "register", None);
        Ok(user)
    }

    /// Check a login. Returns `None` for an unknown user or a wrong password.
    pub fn login(&self, username: &str, password: &str) -> Result<Option<UserRecord>> {
        let Some(mut user) = self.store.find_by_username(username)? else {
            // Spend the same hashing time as a real check.
            let _ = dummy_record().verify(password);
            warn!("login failed: unknown user");
            return Ok(None);
        };

        if !user.password.verify(password) {
            warn!(user_id = user.id, "login failed: wrong password");
            record_access(self.access_log.as_deref(), user.id, "login_failed", None);
            return Ok(None);
        }

        self.store.touch_last_login(user.id)?;
        user.last_login = Some(Utc::now());
        info!(user_id = user.id, format = user.password.format_name(), "user logged in");
        record_access(self.access_log.as_deref(), user.id, "login", None);
        Ok(Some(user))
    }

    /// Record an arbitrary event. Failures are logged, never returned.
    pub fn log_access(&self, user_id: UserId, action: &str, key_name: Option<&str>) {
        record_access(self.access_log.as_deref(), user_id, action, key_name);
    }
}

/// A fixed record to verify against when the username does not exist.
fn dummy_record() -> &'static PasswordRecord {
    static DUMMY: OnceLock<PasswordRecord> = OnceLock::new();
    DUMMY.get_or_init(|| PasswordRecord::Legacy {
        hash: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".into(),
        salt: "AAAAAAAAAAAAAAAAAAAAAA==".into(),
    })
}
