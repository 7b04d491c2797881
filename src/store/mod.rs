//! Persistence collaborators.
//!
//! The crypto core never interprets storage schema: it hands envelopes
//! and password records to these traits and reads them back. Stores are
//! passed to the services explicitly, so there is no process-wide
//! database handle.
//!
//! - `MemoryStore` keeps everything in a mutex-guarded struct (`memory`)
//! - `SqliteStore` persists to a local SQLite file (`sqlite`)

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::crypto::PasswordRecord;
use crate::errors::Result;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Row identifier of a registered user.
pub type UserId = i64;

/// A stored text secret. `envelope` is the base64 ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRecord {
    pub id: i64,
    pub user_id: UserId,
    pub key_name: String,
    pub envelope: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Name and original (pre-encryption) size of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_name: String,
    pub file_size: usize,
}

/// A registered login.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub password: PasswordRecord,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// One access log entry.
#[derive(Debug, Clone)]
pub struct AccessEvent {
    pub id: i64,
    pub user_id: UserId,
    pub action: String,
    pub key_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Text secret persistence keyed by `(user_id, id)`.
pub trait SecretStore: Send + Sync {
    fn insert(&self, user_id: UserId, key_name: &str, envelope: &str) -> Result<SecretRecord>;

    /// Returns `false` if no such row exists for this user.
    fn update(&self, user_id: UserId, id: i64, key_name: &str, envelope: &str) -> Result<bool>;

    fn get(&self, user_id: UserId, id: i64) -> Result<Option<SecretRecord>>;

    /// Secrets whose name contains `query` (ASCII case-insensitive), most
    /// recently updated first.
    fn list(&self, user_id: UserId, query: Option<&str>) -> Result<Vec<SecretRecord>>;

    /// Returns `false` if no such row exists for this user.
    fn delete(&self, user_id: UserId, id: i64) -> Result<bool>;
}

/// Binary file persistence keyed by `(user_id, file_name)`.
pub trait FileStore: Send + Sync {
    fn insert(
        &self,
        user_id: UserId,
        file_name: &str,
        file_type: Option<&str>,
        original_len: usize,
        envelope: &[u8],
    ) -> Result<()>;

    /// All of a user's files, newest first.
    fn list(&self, user_id: UserId) -> Result<Vec<FileInfo>>;

    /// The newest envelope stored under `file_name`.
    fn get_envelope(&self, user_id: UserId, file_name: &str) -> Result<Option<Vec<u8>>>;
}

/// Login credential persistence keyed by username.
pub trait CredentialStore: Send + Sync {
    fn insert(&self, username: &str, password: &PasswordRecord) -> Result<UserRecord>;

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    fn touch_last_login(&self, user_id: UserId) -> Result<()>;
}

/// Append-only record of vault operations.
pub trait AccessLogStore: Send + Sync {
    fn record(&self, user_id: UserId, action: &str, key_name: Option<&str>) -> Result<()>;

    /// Most recent events for a user, newest first.
    fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<AccessEvent>>;
}

/// ASCII case-insensitive substring match, the same rule as SQLite's `LIKE`.
pub(crate) fn name_matches(name: &str, query: Option<&str>) -> bool {
    match query {
        None | Some("") => true,
        Some(q) => name
            .to_ascii_lowercase()
            .contains(&q.to_ascii_lowercase()),
    }
}
