//! Login password hashing and verification.
//!
//! Independent of the session key: PBKDF2-HMAC-SHA256 with 100 000
//! rounds and a random 16-byte salt per password. Two stored layouts
//! are accepted:
//!
//! - combined: `"<saltB64>:<hashB64>"` in one column
//! - legacy: a bare `<hashB64>` plus a separately stored `<saltB64>`
//!
//! [`PasswordRecord`] names the layout explicitly so verification never
//! has to guess it from the string.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::errors::{Result, VaultError};

/// PBKDF2 iteration count for login password hashes.
pub const PASSWORD_HASH_ITERATIONS: u32 = 100_000;

/// Length of a password salt in bytes.
pub const PASSWORD_SALT_LEN: usize = 16;

/// Length of a password digest in bytes (256 bits).
const DIGEST_LEN: usize = 32;

/// Separator between salt and hash in the combined layout.
const DELIMITER: char = ':';

/// Generate a random 16-byte salt, base64-encoded.
pub fn generate_salt() -> String {
    let mut salt = [0u8; PASSWORD_SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    BASE64.encode(salt)
}

/// Hash `password` with a base64 `salt`, returning the base64 digest.
pub fn hash_password_with_salt(password: &str, salt: &str) -> Result<String> {
    let mut digest = compute_digest(password, salt)?;
    let encoded = BASE64.encode(digest);
    digest.zeroize();
    Ok(encoded)
}

/// Hash `password` under a fresh salt, returning `"salt:hash"`.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = generate_salt();
    let hash = hash_password_with_salt(password, &salt)?;
    Ok(format!("{salt}{DELIMITER}{hash}"))
}

/// Verify `password` against raw stored columns.
///
/// `stored` is either a combined `"salt:hash"` string, in which case
/// `provided_salt` is ignored, or a bare legacy hash checked with
/// `provided_salt`. Malformed input verifies as `false`.
pub fn verify_password(password: &str, stored: &str, provided_salt: Option<&str>) -> bool {
    match PasswordRecord::from_columns(stored, provided_salt) {
        Ok(record) => record.verify(password),
        Err(_) => false,
    }
}

fn compute_digest(password: &str, salt: &str) -> Result<[u8; DIGEST_LEN]> {
    let salt_bytes = BASE64
        .decode(salt)
        .map_err(|e| VaultError::Validation(format!("password salt is not valid base64: {e}")))?;

    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        &salt_bytes,
        PASSWORD_HASH_ITERATIONS,
        &mut digest,
    );
    Ok(digest)
}

/// Decode a stored base64 digest into a fixed-size buffer.
///
/// Anything that is not exactly 32 bytes comes back as zeros plus a
/// `false` flag, so the caller still runs a full-length comparison.
fn decode_stored_digest(hash: &str) -> ([u8; DIGEST_LEN], bool) {
    let mut out = [0u8; DIGEST_LEN];
    match BASE64.decode(hash) {
        Ok(bytes) if bytes.len() == DIGEST_LEN => {
            out.copy_from_slice(&bytes);
            (out, true)
        }
        _ => (out, false),
    }
}

/// A persisted login credential, tagged with its storage layout.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum PasswordRecord {
    /// Salt and hash stored together as `"salt:hash"`.
    Combined { salt: String, hash: String },
    /// Bare hash with the salt kept in its own column.
    Legacy { hash: String, salt: String },
}

impl PasswordRecord {
    /// Hash `password` under a fresh salt into a combined record.
    pub fn new(password: &str) -> Result<Self> {
        let salt = generate_salt();
        let hash = hash_password_with_salt(password, &salt)?;
        Ok(PasswordRecord::Combined { salt, hash })
    }

    /// Build a record from the baseline `(password_hash, salt)` columns.
    ///
    /// Rows written before the layout was recorded explicitly are
    /// classified once here by the presence of `:`.
    pub fn from_columns(password_hash: &str, salt: Option<&str>) -> Result<Self> {
        if let Some((salt, hash)) = password_hash.split_once(DELIMITER) {
            return Ok(PasswordRecord::Combined {
                salt: salt.to_string(),
                hash: hash.to_string(),
            });
        }
        match salt {
            Some(salt) => Ok(PasswordRecord::Legacy {
                hash: password_hash.to_string(),
                salt: salt.to_string(),
            }),
            None => Err(VaultError::Validation(
                "legacy password record has no salt".into(),
            )),
        }
    }

    /// Rebuild a record from columns plus its persisted layout name.
    ///
    /// A missing layout name means the row predates the discriminator
    /// and falls back to [`from_columns`](Self::from_columns).
    pub fn from_stored(
        format: Option<&str>,
        password_hash: &str,
        salt: Option<&str>,
    ) -> Result<Self> {
        match format {
            None => Self::from_columns(password_hash, salt),
            Some("combined") => password_hash
                .split_once(DELIMITER)
                .map(|(salt, hash)| PasswordRecord::Combined {
                    salt: salt.to_string(),
                    hash: hash.to_string(),
                })
                .ok_or_else(|| {
                    VaultError::Validation("combined password record has no delimiter".into())
                }),
            Some("legacy") => salt
                .map(|salt| PasswordRecord::Legacy {
                    hash: password_hash.to_string(),
                    salt: salt.to_string(),
                })
                .ok_or_else(|| VaultError::Validation("legacy password record has no salt".into())),
            Some(other) => Err(VaultError::Validation(format!(
                "unknown password record format '{other}'"
            ))),
        }
    }

    /// Split into the baseline `(password_hash, salt)` column values.
    pub fn to_columns(&self) -> (String, Option<String>) {
        match self {
            PasswordRecord::Combined { salt, hash } => (format!("{salt}{DELIMITER}{hash}"), None),
            PasswordRecord::Legacy { hash, salt } => (hash.clone(), Some(salt.clone())),
        }
    }

    /// Name of the layout, as persisted next to the record.
    pub fn format_name(&self) -> &'static str {
        match self {
            PasswordRecord::Combined { .. } => "combined",
            PasswordRecord::Legacy { .. } => "legacy",
        }
    }

    /// Check `password` against this record.
    ///
    /// Both digests are compared in full with a constant-time equality.
    pub fn verify(&self, password: &str) -> bool {
        let (salt, hash) = match self {
            PasswordRecord::Combined { salt, hash } | PasswordRecord::Legacy { hash, salt } => {
                (salt, hash)
            }
        };

        let mut candidate = match compute_digest(password, salt) {
            Ok(d) => d,
            Err(_) => return false,
        };
        let (mut stored, well_formed) = decode_stored_digest(hash);

        let equal: bool = candidate[..].ct_eq(&stored[..]).into();
        candidate.zeroize();
        stored.zeroize();

        equal & well_formed
    }
}

impl fmt::Debug for PasswordRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PasswordRecord({})", self.format_name())
    }
}
