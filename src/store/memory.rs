//! In-memory collaborators.
//!
//! One `MemoryStore` implements every store trait, so a single
//! `Arc<MemoryStore>` can back all the services of an embedded vault or
//! a test.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{
    name_matches, AccessEvent, AccessLogStore, CredentialStore, FileInfo, FileStore, SecretRecord,
    SecretStore, UserId, UserRecord,
};
use crate::crypto::PasswordRecord;
use crate::errors::{Result, VaultError};

struct StoredFile {
    id: i64,
    user_id: UserId,
    file_name: String,
    file_size: usize,
    envelope: Vec<u8>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    secrets: Vec<SecretRecord>,
    files: Vec<StoredFile>,
    users: Vec<UserRecord>,
    events: Vec<AccessEvent>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| VaultError::Storage("memory store lock poisoned".into()))
    }
}

impl SecretStore for MemoryStore {
    fn insert(&self, user_id: UserId, key_name: &str, envelope: &str) -> Result<SecretRecord> {
        let mut t = self.lock()?;
        let now = Utc::now();
        let record = SecretRecord {
            id: t.next_id(),
            user_id,
            key_name: key_name.to_string(),
            envelope: envelope.to_string(),
            created_at: now,
            updated_at: now,
        };
        t.secrets.push(record.clone());
        Ok(record)
    }

    fn update(&self, user_id: UserId, id: i64, key_name: &str, envelope: &str) -> Result<bool> {
        let mut t = self.lock()?;
        match t
            .secrets
            .iter_mut()
            .find(|s| s.user_id == user_id && s.id == id)
        {
            Some(secret) => {
                secret.key_name = key_name.to_string();
                secret.envelope = envelope.to_string();
                secret.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get(&self, user_id: UserId, id: i64) -> Result<Option<SecretRecord>> {
        let t = self.lock()?;
        Ok(t.secrets
            .iter()
            .find(|s| s.user_id == user_id && s.id == id)
            .cloned())
    }

    fn list(&self, user_id: UserId, query: Option<&str>) -> Result<Vec<SecretRecord>> {
        let t = self.lock()?;
        let mut out: Vec<SecretRecord> = t
            .secrets
            .iter()
            .filter(|s| s.user_id == user_id && name_matches(&s.key_name, query))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(out)
    }

    fn delete(&self, user_id: UserId, id: i64) -> Result<bool> {
        let mut t = self.lock()?;
        let before = t.secrets.len();
        t.secrets.retain(|s| !(s.user_id == user_id && s.id == id));
        Ok(t.secrets.len() != before)
    }
}

impl FileStore for MemoryStore {
    fn insert(
        &self,
        user_id: UserId,
        file_name: &str,
        _file_type: Option<&str>,
        original_len: usize,
        envelope: &[u8],
    ) -> Result<()> {
        let mut t = self.lock()?;
        let id = t.next_id();
        t.files.push(StoredFile {
            id,
            user_id,
            file_name: file_name.to_string(),
            file_size: original_len,
            envelope: envelope.to_vec(),
        });
        Ok(())
    }

    fn list(&self, user_id: UserId) -> Result<Vec<FileInfo>> {
        let t = self.lock()?;
        let mut files: Vec<&StoredFile> = t.files.iter().filter(|f| f.user_id == user_id).collect();
        files.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(files
            .into_iter()
            .map(|f| FileInfo {
                file_name: f.file_name.clone(),
                file_size: f.file_size,
            })
            .collect())
    }

    fn get_envelope(&self, user_id: UserId, file_name: &str) -> Result<Option<Vec<u8>>> {
        let t = self.lock()?;
        Ok(t.files
            .iter()
            .filter(|f| f.user_id == user_id && f.file_name == file_name)
            .max_by_key(|f| f.id)
            .map(|f| f.envelope.clone()))
    }
}

impl CredentialStore for MemoryStore {
    fn insert(&self, username: &str, password: &PasswordRecord) -> Result<UserRecord> {
        let mut t = self.lock()?;
        if t.users.iter().any(|u| u.username == username) {
            return Err(VaultError::UsernameTaken(username.to_string()));
        }
        let user = UserRecord {
            id: t.next_id(),
            username: username.to_string(),
            password: password.clone(),
            created_at: Utc::now(),
            last_login: None,
        };
        t.users.push(user.clone());
        Ok(user)
    }

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let t = self.lock()?;
        Ok(t.users.iter().find(|u| u.username == username).cloned())
    }

    fn touch_last_login(&self, user_id: UserId) -> Result<()> {
        let mut t = self.lock()?;
        if let Some(user) = t.users.iter_mut().find(|u| u.id == user_id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }
}

impl AccessLogStore for MemoryStore {
    fn record(&self, user_id: UserId, action: &str, key_name: Option<&str>) -> Result<()> {
        let mut t = self.lock()?;
        let id = t.next_id();
        t.events.push(AccessEvent {
            id,
            user_id,
            action: action.to_string(),
            key_name: key_name.map(str::to_string),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<AccessEvent>> {
        let t = self.lock()?;
        Ok(t.events
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
