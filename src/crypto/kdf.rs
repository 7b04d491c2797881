//! Password-based key derivation using PBKDF2-HMAC-SHA256.
//!
//! The session key is derived once per login from the master password.
//! Cost is fixed by the iteration count alone, so derivation time does
//! not depend on the password's content.

use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use super::keys::{MasterKey, KEY_LEN};
use crate::errors::{Result, VaultError};

/// PBKDF2 iteration count for master-key derivation.
pub const MASTER_KEY_ITERATIONS: u32 = 65_536;

/// Length of a freshly generated per-vault salt in bytes.
pub const KDF_SALT_LEN: usize = 16;

/// The application-wide salt used by vaults created before per-vault
/// salts existed. Only for opening those vaults.
const LEGACY_APP_SALT: &[u8] = b"a9v5n38s";

/// Salt and cost used to derive a vault's master key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    pub salt: Vec<u8>,
    pub iterations: u32,
}

impl KdfParams {
    /// Fresh parameters for a new vault: random 16-byte salt, 65 536 rounds.
    pub fn generate() -> Self {
        let mut salt = vec![0u8; KDF_SALT_LEN];
        rand::rng().fill_bytes(&mut salt);
        Self {
            salt,
            iterations: MASTER_KEY_ITERATIONS,
        }
    }

    /// Parameters matching vaults written with the shared hardcoded salt.
    pub fn legacy() -> Self {
        Self {
            salt: LEGACY_APP_SALT.to_vec(),
            iterations: MASTER_KEY_ITERATIONS,
        }
    }

    /// Returns `true` if these are the shared legacy parameters.
    pub fn is_legacy(&self) -> bool {
        self.salt == LEGACY_APP_SALT
    }
}

/// Derive `key_bits / 8` bytes from `password` and `salt`.
///
/// Same password + salt + iteration count always yields the same key.
pub fn derive_key(
    password: &str,
    salt: &[u8],
    iterations: u32,
    key_bits: usize,
) -> Result<Vec<u8>> {
    if iterations < 1 {
        return Err(VaultError::Configuration(
            "PBKDF2 iterations must be at least 1".into(),
        ));
    }
    if key_bits == 0 || key_bits % 8 != 0 {
        return Err(VaultError::Configuration(format!(
            "key length must be a positive multiple of 8 bits (got {key_bits})"
        )));
    }

    let mut out = vec![0u8; key_bits / 8];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    Ok(out)
}

/// Derive the 256-bit session master key for `password`.
pub fn derive_master_key(password: &str, params: &KdfParams) -> Result<MasterKey> {
    if password.is_empty() {
        return Err(VaultError::Configuration(
            "a master password is required".into(),
        ));
    }

    let mut derived = derive_key(password, &params.salt, params.iterations, KEY_LEN * 8)?;

    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&derived);
    derived.zeroize();

    let key = MasterKey::new(bytes);
    bytes.zeroize();
    Ok(key)
}
