use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::envelope::{EnvelopeCodec, MAX_FILE_BYTES};
use crate::crypto::CipherSuite;
use crate::errors::{Result, VaultError};

/// Lowest minimum password length a config may ask for.
const MIN_PASSWORD_LEN_FLOOR: usize = 6;

/// Vault-level configuration, loaded from `.datavault.toml`.
///
/// Every field has a sensible default so the vault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database file name, relative to the vault directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Per-vault KDF parameter file, stored next to the database.
    #[serde(default = "default_kdf_file")]
    pub kdf_file: String,

    /// Envelope cipher suite for this vault.
    #[serde(default)]
    pub cipher: CipherSuite,

    /// Minimum login password length at registration.
    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,

    /// Maximum file payload in bytes (never above 10 MiB).
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Whether services record access events.
    #[serde(default = "default_access_log")]
    pub access_log: bool,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_database_file() -> String {
    "vault.db".to_string()
}

fn default_kdf_file() -> String {
    "vault.kdf.json".to_string()
}

fn default_min_password_len() -> usize {
    MIN_PASSWORD_LEN_FLOOR
}

fn default_max_file_bytes() -> usize {
    MAX_FILE_BYTES
}

fn default_access_log() -> bool {
    true
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            kdf_file: default_kdf_file(),
            cipher: CipherSuite::default(),
            min_password_len: default_min_password_len(),
            max_file_bytes: default_max_file_bytes(),
            access_log: default_access_log(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the vault directory.
    const FILE_NAME: &'static str = ".datavault.toml";

    /// Load settings from `<vault_dir>/.datavault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed or holds out-of-range
    /// values, an error is returned.
    pub fn load(vault_dir: &Path) -> Result<Self> {
        let config_path = vault_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would weaken the vault's fixed policies.
    pub fn validate(&self) -> Result<()> {
        if self.min_password_len < MIN_PASSWORD_LEN_FLOOR {
            return Err(VaultError::Config(format!(
                "min_password_len must be at least {MIN_PASSWORD_LEN_FLOOR} (got {})",
                self.min_password_len
            )));
        }
        if self.max_file_bytes > MAX_FILE_BYTES {
            return Err(VaultError::Config(format!(
                "max_file_bytes cannot exceed {MAX_FILE_BYTES} (got {})",
                self.max_file_bytes
            )));
        }
        Ok(())
    }

    /// Full path to the SQLite database.
    pub fn database_path(&self, vault_dir: &Path) -> PathBuf {
        vault_dir.join(&self.database_file)
    }

    /// Full path to the KDF parameter file.
    pub fn kdf_path(&self, vault_dir: &Path) -> PathBuf {
        vault_dir.join(&self.kdf_file)
    }

    /// Build the envelope codec these settings describe.
    pub fn codec(&self) -> Result<EnvelopeCodec> {
        EnvelopeCodec::new(self.cipher).with_max_file_bytes(self.max_file_bytes)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
