//! Vault services built on the crypto core.
//!
//! This module provides:
//! - `SecretVault` for encrypted text secrets (`secrets`)
//! - `FileVault` for encrypted files (`files`)
//! - `UserService` for registration and login (`users`)
//! - Per-vault KDF salt persistence (`kdf_store`)
//! - `LocalVault`, a SQLite-backed vault directory (`local`)

pub mod files;
pub mod kdf_store;
#[cfg(feature = "sqlite")]
pub mod local;
pub mod secrets;
pub mod users;

use tracing::warn;

use crate::store::{AccessLogStore, UserId};

// Re-export the most commonly used items.
pub use files::{head_hex, FileVault};
#[cfg(feature = "sqlite")]
pub use local::{LocalVault, UnlockedVault};
pub use secrets::{Secret, SecretMetadata, SecretVault};
pub use users::UserService;

/// Write an access event if a log is attached. Never fails the caller.
pub(crate) fn record_access(
    log: Option<&dyn AccessLogStore>,
    user_id: UserId,
    action: &str,
    key_name: Option<&str>,
) {
    if let Some(log) = log {
        if let Err(e) = log.record(user_id, action, key_name) {
            warn!(user_id, action, error = %e, "access log write failed");
        }
    }
}
