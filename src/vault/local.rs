//! A vault directory on local disk.
//!
//! Ties the pieces together: settings from `.datavault.toml`, a SQLite
//! database for every collaborator, and the per-vault KDF sidecar. A
//! successful [`LocalVault::unlock`] yields the services bound to one
//! freshly derived session key.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::files::FileVault;
use super::kdf_store;
use super::secrets::SecretVault;
use super::users::UserService;
use crate::config::Settings;
use crate::crypto::KdfParams;
use crate::errors::{Result, VaultError};
use crate::session::EncryptionManager;
use crate::store::{AccessLogStore, SqliteStore, UserRecord};

pub struct LocalVault {
    dir: PathBuf,
    settings: Settings,
    store: Arc<SqliteStore>,
    kdf: KdfParams,
}

/// The services of one logged-in session.
pub struct UnlockedVault {
    pub user: UserRecord,
    pub secrets: SecretVault,
    pub files: FileVault,
    session: Arc<EncryptionManager>,
}

impl UnlockedVault {
    pub fn session(&self) -> &EncryptionManager {
        &self.session
    }
}

impl LocalVault {
    /// Open the vault in `dir`, creating the database and KDF salt on
    /// first use. The directory itself must already exist.
    ///
    /// A database found without a KDF sidecar predates per-vault salts
    /// and is bound to the shared legacy salt instead of a fresh one.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(VaultError::Config(format!(
                "vault directory {} does not exist",
                dir.display()
            )));
        }

        let settings = Settings::load(dir)?;
        let db_path = settings.database_path(dir);
        let kdf_path = settings.kdf_path(dir);

        // The sidecar is written before a new database file appears.
        let kdf = if db_path.exists() {
            kdf_store::load_or_adopt_legacy(&kdf_path)?
        } else {
            kdf_store::load_or_create(&kdf_path)?
        };
        let store = Arc::new(SqliteStore::open(&db_path)?);

        info!(dir = %dir.display(), cipher = %settings.cipher, "vault opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            settings,
            store,
            kdf,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn access_log(&self) -> Option<Arc<dyn AccessLogStore>> {
        if !self.settings.access_log {
            return None;
        }
        let log: Arc<dyn AccessLogStore> = self.store.clone();
        Some(log)
    }

    /// The registration/login service for this vault.
    pub fn users(&self) -> Result<UserService> {
        let users = UserService::new(self.store.clone()).with_settings(&self.settings)?;
        Ok(match self.access_log() {
            Some(log) => users.with_access_log(log),
            None => users,
        })
    }

    /// Log in and derive the session key from the same password.
    ///
    /// Returns `None` if the credentials do not match.
    pub fn unlock(&self, username: &str, password: &str) -> Result<Option<UnlockedVault>> {
        let Some(user) = self.users()?.login(username, password)? else {
            return Ok(None);
        };

        let session = Arc::new(
            EncryptionManager::new(password, &self.kdf, self.settings.cipher)?
                .with_codec(self.settings.codec()?),
        );

        let mut secrets = SecretVault::new(self.store.clone(), session.clone());
        let mut files = FileVault::new(self.store.clone(), session.clone());
        if let Some(log) = self.access_log() {
            secrets = secrets.with_access_log(log.clone());
            files = files.with_access_log(log);
        }

        Ok(Some(UnlockedVault {
            user,
            secrets,
            files,
            session,
        }))
    }
}
