//! AES-256 envelope encryption.
//!
//! Every call draws a fresh IV from the OS random source and prepends it
//! to the ciphertext, so the caller only needs to store one blob.
//!
//! Two suites are supported, chosen per vault:
//!
//! ```text
//! aes-256-cbc : [ 16-byte IV | AES-CBC ciphertext, PKCS7-padded ]
//! aes-256-gcm : [ 12-byte nonce | ciphertext | 16-byte auth tag ]
//! ```
//!
//! CBC is the format of vaults created before GCM support and carries no
//! integrity tag. GCM is the default for new vaults.

use std::fmt;

use aes::Aes256;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::TryRngCore;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::keys::MasterKey;
use crate::errors::{Result, VaultError};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;

/// Size of the CBC initialization vector.
pub const CBC_IV_LEN: usize = 16;

/// Size of the GCM nonce.
pub const GCM_NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag.
pub const GCM_TAG_LEN: usize = 16;

/// No envelope of either suite is valid below this length.
pub const MIN_ENVELOPE_LEN: usize = 16;

/// Which AES-256 mode a vault's envelopes are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CipherSuite {
    /// AES-256-GCM, authenticated.
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// AES-256-CBC with PKCS7 padding, unauthenticated.
    #[serde(rename = "aes-256-cbc")]
    Aes256Cbc,
}

impl CipherSuite {
    /// Length of the random prefix of an envelope.
    pub fn iv_len(self) -> usize {
        match self {
            CipherSuite::Aes256Gcm => GCM_NONCE_LEN,
            CipherSuite::Aes256Cbc => CBC_IV_LEN,
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherSuite::Aes256Gcm => f.write_str("aes-256-gcm"),
            CipherSuite::Aes256Cbc => f.write_str("aes-256-cbc"),
        }
    }
}

/// Fill `buf` from the operating system's CSPRNG.
fn random_iv(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| VaultError::EncryptionFailed(format!("random source unavailable: {e}")))
}

/// Encrypt `plaintext` under `key`, returning IV || ciphertext.
pub fn encrypt_bytes(suite: CipherSuite, key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    trace!(suite = %suite, len = plaintext.len(), "encrypting payload");
    match suite {
        CipherSuite::Aes256Cbc => encrypt_cbc(key, plaintext),
        CipherSuite::Aes256Gcm => encrypt_gcm(key, plaintext),
    }
}

/// Decrypt an envelope produced by [`encrypt_bytes`] with the same suite.
///
/// Never returns partial plaintext: any failure yields an error.
pub fn decrypt_bytes(suite: CipherSuite, key: &MasterKey, envelope: &[u8]) -> Result<Vec<u8>> {
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(VaultError::DecryptionFailed);
    }
    match suite {
        CipherSuite::Aes256Cbc => decrypt_cbc(key, envelope),
        CipherSuite::Aes256Gcm => decrypt_gcm(key, envelope),
    }
}

fn encrypt_cbc(key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; CBC_IV_LEN];
    random_iv(&mut iv)?;

    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| VaultError::EncryptionFailed(format!("cipher init: {e}")))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut output = Vec::with_capacity(CBC_IV_LEN + ciphertext.len());
    output.extend_from_slice(&iv);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

fn decrypt_cbc(key: &MasterKey, envelope: &[u8]) -> Result<Vec<u8>> {
    let (iv, ciphertext) = envelope.split_at(CBC_IV_LEN);
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(VaultError::DecryptionFailed);
    }

    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|_| VaultError::DecryptionFailed)?;

    // A wrong key surfaces here as a padding error; both look the same.
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| VaultError::DecryptionFailed)
}

fn encrypt_gcm(key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce_bytes = [0u8; GCM_NONCE_LEN];
    random_iv(&mut nonce_bytes)?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| VaultError::EncryptionFailed(format!("encryption error: {e}")))?;

    let mut output = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

fn decrypt_gcm(key: &MasterKey, envelope: &[u8]) -> Result<Vec<u8>> {
    if envelope.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
        return Err(VaultError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = envelope.split_at(GCM_NONCE_LEN);
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| VaultError::DecryptionFailed)?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| VaultError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> MasterKey {
        MasterKey::new([byte; 32])
    }

    #[test]
    fn cbc_envelope_layout() {
        let env = encrypt_bytes(CipherSuite::Aes256Cbc, &key(1), b"hello").unwrap();
        // IV + one padded block.
        assert_eq!(env.len(), CBC_IV_LEN + BLOCK_LEN);

        // A full block of input gains a whole block of padding.
        let env = encrypt_bytes(CipherSuite::Aes256Cbc, &key(1), &[7u8; 16]).unwrap();
        assert_eq!(env.len(), CBC_IV_LEN + 2 * BLOCK_LEN);
    }

    #[test]
    fn gcm_envelope_layout() {
        let env = encrypt_bytes(CipherSuite::Aes256Gcm, &key(1), b"hello").unwrap();
        assert_eq!(env.len(), GCM_NONCE_LEN + 5 + GCM_TAG_LEN);
    }

    #[test]
    fn both_suites_roundtrip() {
        for suite in [CipherSuite::Aes256Cbc, CipherSuite::Aes256Gcm] {
            let k = key(9);
            for plain in [&b""[..], b"x", &[0xAAu8; 100][..]] {
                let env = encrypt_bytes(suite, &k, plain).unwrap();
                assert_eq!(decrypt_bytes(suite, &k, &env).unwrap(), plain, "{suite}");
            }
        }
    }

    #[test]
    fn short_envelopes_are_rejected() {
        for suite in [CipherSuite::Aes256Cbc, CipherSuite::Aes256Gcm] {
            for len in [0, 1, 15] {
                let err = decrypt_bytes(suite, &key(2), &vec![0u8; len]).unwrap_err();
                assert!(matches!(err, VaultError::DecryptionFailed), "{suite} len {len}");
            }
        }
    }

    #[test]
    fn cbc_iv_only_envelope_is_rejected() {
        let err = decrypt_bytes(CipherSuite::Aes256Cbc, &key(2), &[0u8; 16]).unwrap_err();
        assert!(matches!(err, VaultError::DecryptionFailed));
    }

    #[test]
    fn cbc_ragged_ciphertext_is_rejected() {
        let mut env = encrypt_bytes(CipherSuite::Aes256Cbc, &key(3), b"data").unwrap();
        env.push(0);
        let err = decrypt_bytes(CipherSuite::Aes256Cbc, &key(3), &env).unwrap_err();
        assert!(matches!(err, VaultError::DecryptionFailed));
    }

    #[test]
    fn gcm_tamper_is_an_authentication_failure() {
        let mut env = encrypt_bytes(CipherSuite::Aes256Gcm, &key(4), b"VALUE=abc").unwrap();
        env[GCM_NONCE_LEN] ^= 0x01;
        let err = decrypt_bytes(CipherSuite::Aes256Gcm, &key(4), &env).unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));
    }

    #[test]
    fn gcm_wrong_key_is_an_authentication_failure() {
        let env = encrypt_bytes(CipherSuite::Aes256Gcm, &key(5), b"x").unwrap();
        let err = decrypt_bytes(CipherSuite::Aes256Gcm, &key(6), &env).unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailed));
    }

    #[test]
    fn suite_serializes_with_kebab_names() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            cipher: CipherSuite,
        }
        let text = toml::to_string(&Wrapper {
            cipher: CipherSuite::Aes256Cbc,
        })
        .unwrap();
        assert_eq!(text.trim(), "cipher = \"aes-256-cbc\"");
        let back: Wrapper = toml::from_str("cipher = \"aes-256-gcm\"").unwrap();
        assert_eq!(back.cipher, CipherSuite::Aes256Gcm);
    }
}
