//! Text secret operations.
//!
//! `SecretVault` encrypts values through the session's
//! [`EncryptionManager`] and hands only base64 envelopes to the
//! [`SecretStore`]. Listing returns metadata without decrypting anything.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use zeroize::Zeroizing;

use super::record_access;
use crate::errors::{Result, VaultError};
use crate::session::EncryptionManager;
use crate::store::{AccessLogStore, SecretRecord, SecretStore, UserId};

/// Longest accepted secret name.
const MAX_KEY_NAME_LEN: usize = 256;

/// A decrypted secret. The value is wiped from memory on drop.
pub struct Secret {
    pub id: i64,
    pub key_name: String,
    pub value: Zeroizing<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("id", &self.id)
            .field("key_name", &self.key_name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Lightweight metadata about a secret (no value, no envelope).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMetadata {
    pub id: i64,
    pub key_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SecretRecord> for SecretMetadata {
    fn from(r: &SecretRecord) -> Self {
        Self {
            id: r.id,
            key_name: r.key_name.clone(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

pub struct SecretVault {
    store: Arc<dyn SecretStore>,
    session: Arc<EncryptionManager>,
    access_log: Option<Arc<dyn AccessLogStore>>,
}

impl SecretVault {
    pub fn new(store: Arc<dyn SecretStore>, session: Arc<EncryptionManager>) -> Self {
        Self {
            store,
            session,
            access_log: None,
        }
    }

    /// Record add/view/update/delete events in `log`.
    pub fn with_access_log(mut self, log: Arc<dyn AccessLogStore>) -> Self {
        self.access_log = Some(log);
        self
    }

    /// Encrypt and store a new secret.
    pub fn add_secret(
        &self,
        user_id: UserId,
        key_name: &str,
        value: &str,
    ) -> Result<SecretMetadata> {
        validate_key_name(key_name)?;
        let envelope = self.session.encrypt_text(value)?;
        let record = self.store.insert(user_id, key_name, &envelope)?;
        debug!(user_id, secret_id = record.id, "secret added");
        record_access(self.access_log.as_deref(), user_id, "add_secret", Some(key_name));
        Ok(SecretMetadata::from(&record))
    }

    /// Replace the name and value of an existing secret.
    pub fn update_secret(
        &self,
        user_id: UserId,
        id: i64,
        key_name: &str,
        value: &str,
    ) -> Result<()> {
        validate_key_name(key_name)?;
        let envelope = self.session.encrypt_text(value)?;
        if !self.store.update(user_id, id, key_name, &envelope)? {
            return Err(not_found(id));
        }
        debug!(user_id, secret_id = id, "secret updated");
        record_access(self.access_log.as_deref(), user_id, "update_secret", Some(key_name));
        Ok(())
    }

    /// Fetch and decrypt a secret.
    pub fn get_secret(&self, user_id: UserId, id: i64) -> Result<Secret> {
        let record = self.store.get(user_id, id)?.ok_or_else(|| not_found(id))?;
        let value = Zeroizing::new(self.session.decrypt_text(&record.envelope)?);
        record_access(
            self.access_log.as_deref(),
            user_id,
            "view_secret",
            Some(record.key_name.as_str()),
        );
        Ok(Secret {
            id: record.id,
            key_name: record.key_name,
            value,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// The stored base64 envelope of a secret, undecrypted.
    pub fn encrypted_value(&self, user_id: UserId, id: i64) -> Result<String> {
        let record = self.store.get(user_id, id)?.ok_or_else(|| not_found(id))?;
        Ok(record.envelope)
    }

    /// Secret metadata whose names contain `query`, newest first.
    pub fn list_secrets(
        &self,
        user_id: UserId,
        query: Option<&str>,
    ) -> Result<Vec<SecretMetadata>> {
        let records = self.store.list(user_id, query)?;
        Ok(records.iter().map(SecretMetadata::from).collect())
    }

    pub fn delete_secret(&self, user_id: UserId, id: i64) -> Result<()> {
        if !self.store.delete(user_id, id)? {
            return Err(not_found(id));
        }
        debug!(user_id, secret_id = id, "secret deleted");
        record_access(self.access_log.as_deref(), user_id, "delete_secret", None);
        Ok(())
    }
}

fn not_found(id: i64) -> VaultError {
    VaultError::SecretNotFound(format!("#{id}"))
}

/// A secret name must be non-blank and at most 256 characters.
fn validate_key_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(VaultError::Validation("secret name cannot be empty".into()));
    }
    if name.chars().count() > MAX_KEY_NAME_LEN {
        return Err(VaultError::Validation(format!(
            "secret name cannot exceed {MAX_KEY_NAME_LEN} characters"
        )));
    }
    Ok(())
}
