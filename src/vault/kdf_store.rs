//! Per-vault key-derivation parameters on disk.
//!
//! The salt for master-key derivation is generated when a vault is first
//! used and kept in a small JSON file next to the database, never inside
//! the encrypted data:
//!
//! ```text
//! {"version":1,"salt":"<base64>","iterations":65536,"created_at":"..."}
//! ```

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::crypto::KdfParams;
use crate::errors::{Result, VaultError};

/// Current sidecar format version.
pub const CURRENT_VERSION: u8 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredKdfParams {
    version: u8,
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    salt: Vec<u8>,
    iterations: u32,
    created_at: DateTime<Utc>,
}

/// Read the KDF parameters stored at `path`.
pub fn load(path: &Path) -> Result<KdfParams> {
    let data = fs::read(path)?;
    let stored: StoredKdfParams = serde_json::from_slice(&data)
        .map_err(|e| VaultError::Serialization(format!("kdf params: {e}")))?;

    if stored.version != CURRENT_VERSION {
        return Err(VaultError::Serialization(format!(
            "unsupported kdf params version {}, expected {CURRENT_VERSION}",
            stored.version
        )));
    }
    if stored.salt.is_empty() || stored.iterations < 1 {
        return Err(VaultError::Configuration(
            "stored kdf params have an empty salt or zero iterations".into(),
        ));
    }

    Ok(KdfParams {
        salt: stored.salt,
        iterations: stored.iterations,
    })
}

/// Write KDF parameters to `path` atomically (temp file + rename).
pub fn save(path: &Path, params: &KdfParams) -> Result<()> {
    let stored = StoredKdfParams {
        version: CURRENT_VERSION,
        salt: params.salt.clone(),
        iterations: params.iterations,
        created_at: Utc::now(),
    };
    let bytes = serde_json::to_vec_pretty(&stored)
        .map_err(|e| VaultError::Serialization(format!("kdf params: {e}")))?;

    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, &bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load the vault's KDF parameters, generating them on first use.
pub fn load_or_create(path: &Path) -> Result<KdfParams> {
    if path.exists() {
        return load(path);
    }

    let params = KdfParams::generate();
    save(path, &params)?;
    info!(path = %path.display(), "generated per-vault key derivation salt");
    Ok(params)
}

/// Load the vault's KDF parameters, recording the shared legacy salt if
/// none are stored yet.
///
/// For data written before per-vault salts existed: its envelopes can
/// only be opened with keys derived from [`KdfParams::legacy`].
pub fn load_or_adopt_legacy(path: &Path) -> Result<KdfParams> {
    if path.exists() {
        return load(path);
    }

    let params = KdfParams::legacy();
    save(path, &params)?;
    warn!(
        path = %path.display(),
        "existing vault has no key derivation sidecar; recorded the shared legacy salt"
    );
    Ok(params)
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&BASE64.encode(data))
}

fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}
