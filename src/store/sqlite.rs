//! SQLite-backed collaborators.
//!
//! Tables follow the established vault database layout (`users`,
//! `vault_data`, `vault_files`, `access_logs`). `users` additionally
//! carries a `record_format` column so the password layout is read back
//! rather than guessed; databases created without it gain the column on
//! open. Timestamps are written as RFC 3339 text with a fixed number of
//! fractional digits, so they sort correctly as strings. SQLite's own
//! `CURRENT_TIMESTAMP` text is still accepted on read.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::{
    AccessEvent, AccessLogStore, CredentialStore, FileInfo, FileStore, SecretRecord, SecretStore,
    UserId, UserRecord,
};
use crate::crypto::PasswordRecord;
use crate::errors::{Result, VaultError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    username       TEXT NOT NULL UNIQUE,
    password_hash  TEXT NOT NULL,
    salt           TEXT,
    record_format  TEXT,
    created_at     TEXT NOT NULL,
    last_login     TEXT
);
CREATE TABLE IF NOT EXISTS vault_data (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL,
    key_name      TEXT NOT NULL,
    secret_value  TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS vault_files (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         INTEGER NOT NULL,
    file_name       TEXT NOT NULL,
    file_type       TEXT,
    file_size       INTEGER NOT NULL,
    encrypted_data  BLOB NOT NULL,
    created_at      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS access_logs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER NOT NULL,
    action     TEXT NOT NULL,
    key_name   TEXT,
    timestamp  TEXT NOT NULL
);
";

/// SQLite implementation of every store trait.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the vault database at `db_path`.
    ///
    /// A newly created file is restricted to owner read/write on Unix.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(db_path, perms)?;
        }

        debug!(path = %db_path.display(), "opened vault database");
        Self::init(conn)
    }

    /// A throwaway database that lives only as long as the store.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        migrate_users(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VaultError::Storage("database lock poisoned".into()))
    }
}

/// Add `record_format` to a `users` table created before the column existed.
fn migrate_users(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(users)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if !columns.iter().any(|c| c == "record_format") {
        conn.execute("ALTER TABLE users ADD COLUMN record_format TEXT", [])?;
        info!("added record_format column to users table");
    }
    Ok(())
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(idx, &text)
}

/// SQLite `CURRENT_TIMESTAMP` layout, always UTC.
const SQLITE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S%.f";

fn parse_timestamp(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, SQLITE_TIMESTAMP)
        .map(|naive| naive.and_utc())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Escape `%`, `_` and `\` so a search string matches literally in `LIKE`.
fn like_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    out.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn secret_from_row(row: &Row<'_>) -> rusqlite::Result<SecretRecord> {
    Ok(SecretRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        key_name: row.get(2)?,
        envelope: row.get(3)?,
        created_at: timestamp(row, 4)?,
        updated_at: timestamp(row, 5)?,
    })
}

impl SecretStore for SqliteStore {
    fn insert(&self, user_id: UserId, key_name: &str, envelope: &str) -> Result<SecretRecord> {
        let conn = self.conn()?;
        let now = now_text();
        conn.execute(
            "INSERT INTO vault_data (user_id, key_name, secret_value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![user_id, key_name, envelope, now],
        )?;
        let id = conn.last_insert_rowid();
        let ts = parse_timestamp(0, &now)?;
        Ok(SecretRecord {
            id,
            user_id,
            key_name: key_name.to_string(),
            envelope: envelope.to_string(),
            created_at: ts,
            updated_at: ts,
        })
    }

    fn update(&self, user_id: UserId, id: i64, key_name: &str, envelope: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE vault_data SET key_name = ?1, secret_value = ?2, updated_at = ?3
             WHERE user_id = ?4 AND id = ?5",
            params![key_name, envelope, now_text(), user_id, id],
        )?;
        Ok(changed > 0)
    }

    fn get(&self, user_id: UserId, id: i64) -> Result<Option<SecretRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, user_id, key_name, secret_value, created_at, updated_at
                 FROM vault_data WHERE user_id = ?1 AND id = ?2",
                params![user_id, id],
                secret_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn list(&self, user_id: UserId, query: Option<&str>) -> Result<Vec<SecretRecord>> {
        let conn = self.conn()?;
        let pattern = like_pattern(query.unwrap_or(""));
        let mut stmt = conn.prepare(
            "SELECT id, user_id, key_name, secret_value, created_at, updated_at
             FROM vault_data
             WHERE user_id = ?1 AND key_name LIKE ?2 ESCAPE '\\'
             ORDER BY updated_at DESC, created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![user_id, pattern], secret_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn delete(&self, user_id: UserId, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM vault_data WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
        )?;
        Ok(changed > 0)
    }
}

impl FileStore for SqliteStore {
    fn insert(
        &self,
        user_id: UserId,
        file_name: &str,
        file_type: Option<&str>,
        original_len: usize,
        envelope: &[u8],
    ) -> Result<()> {
        let size = i64::try_from(original_len)
            .map_err(|_| VaultError::Storage(format!("file size {original_len} out of range")))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO vault_files (user_id, file_name, file_type, file_size, encrypted_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, file_name, file_type, size, envelope, now_text()],
        )?;
        Ok(())
    }

    fn list(&self, user_id: UserId) -> Result<Vec<FileInfo>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_name, file_size FROM vault_files WHERE user_id = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let size: i64 = row.get(1)?;
            Ok((row.get::<_, String>(0)?, size))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (file_name, size) = row?;
            let file_size = usize::try_from(size)
                .map_err(|_| VaultError::Storage(format!("negative file size for '{file_name}'")))?;
            out.push(FileInfo {
                file_name,
                file_size,
            });
        }
        Ok(out)
    }

    fn get_envelope(&self, user_id: UserId, file_name: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let envelope = conn
            .query_row(
                "SELECT encrypted_data FROM vault_files
                 WHERE user_id = ?1 AND file_name = ?2 ORDER BY id DESC LIMIT 1",
                params![user_id, file_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(envelope)
    }
}

/// Raw `users` columns before the password record is rebuilt.
struct UserRow {
    id: UserId,
    username: String,
    password_hash: String,
    salt: Option<String>,
    record_format: Option<String>,
    created_at: DateTime<Utc>,
    last_login: Option<String>,
}

impl UserRow {
    fn into_record(self) -> Result<UserRecord> {
        let password = PasswordRecord::from_stored(
            self.record_format.as_deref(),
            &self.password_hash,
            self.salt.as_deref(),
        )?;
        let last_login = self
            .last_login
            .as_deref()
            .map(|t| parse_timestamp(6, t))
            .transpose()?;
        Ok(UserRecord {
            id: self.id,
            username: self.username,
            password,
            created_at: self.created_at,
            last_login,
        })
    }
}

impl CredentialStore for SqliteStore {
    fn insert(&self, username: &str, password: &PasswordRecord) -> Result<UserRecord> {
        let conn = self.conn()?;
        let (password_hash, salt) = password.to_columns();
        // Older tables declare `salt NOT NULL`; combined records store it empty.
        let salt = salt.unwrap_or_default();
        let now = now_text();
        let inserted = conn.execute(
            "INSERT INTO users (username, password_hash, salt, record_format, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, password_hash, salt, password.format_name(), now],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(VaultError::UsernameTaken(username.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(UserRecord {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            password: password.clone(),
            created_at: parse_timestamp(0, &now)?,
            last_login: None,
        })
    }

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, username, password_hash, salt, record_format, created_at, last_login
                 FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                        salt: row.get(3)?,
                        record_format: row.get(4)?,
                        created_at: timestamp(row, 5)?,
                        last_login: row.get(6)?,
                    })
                },
            )
            .optional()?;
        row.map(UserRow::into_record).transpose()
    }

    fn touch_last_login(&self, user_id: UserId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_text(), user_id],
        )?;
        Ok(())
    }
}

impl AccessLogStore for SqliteStore {
    fn record(&self, user_id: UserId, action: &str, key_name: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO access_logs (user_id, action, key_name, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, action, key_name, now_text()],
        )?;
        Ok(())
    }

    fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<AccessEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, action, key_name, timestamp FROM access_logs
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok(AccessEvent {
                id: row.get(0)?,
                user_id: row.get(1)?,
                action: row.get(2)?,
                key_name: row.get(3)?,
                timestamp: timestamp(row, 4)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
