//! Cryptographic primitives for the vault core.
//!
//! This module provides:
//! - PBKDF2-HMAC-SHA256 master-key derivation (`kdf`)
//! - The zeroize-on-drop session key (`keys`)
//! - AES-256 envelope encryption in GCM or CBC mode (`encryption`)
//! - Text/file framing and the file size limit (`envelope`)
//! - Login password hashing and verification (`password`)

pub mod encryption;
pub mod envelope;
pub mod kdf;
pub mod keys;
pub mod password;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{derive_master_key, CipherSuite, EnvelopeCodec, ...};
pub use encryption::{decrypt_bytes, encrypt_bytes, CipherSuite};
pub use envelope::{EnvelopeCodec, Payload, Sealed, MAX_FILE_BYTES};
pub use kdf::{derive_key, derive_master_key, KdfParams};
pub use keys::MasterKey;
pub use password::{
    generate_salt, hash_password, hash_password_with_salt, verify_password, PasswordRecord,
};
