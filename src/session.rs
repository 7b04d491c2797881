//! Per-login encryption session.
//!
//! An [`EncryptionManager`] is built once per authenticated session from
//! the master password. It owns the derived key for its whole life and
//! exposes the text and file envelope operations to the vault services.
//!
//! Lifecycle: construction derives the key and the manager is then
//! active for any number of calls. [`EncryptionManager::close`] (or a
//! plain drop) ends the session and zeroizes the key. A new session
//! needs a new manager.
//!
//! The key is immutable after construction and every call builds its own
//! cipher context and IV, so a manager can be shared across threads
//! behind an `Arc` without further locking.

use std::fmt;

use tracing::{debug, info};

use crate::crypto::envelope::EnvelopeCodec;
use crate::crypto::kdf::{derive_master_key, KdfParams};
use crate::crypto::keys::MasterKey;
use crate::crypto::CipherSuite;
use crate::errors::Result;

pub struct EncryptionManager {
    key: MasterKey,
    codec: EnvelopeCodec,
}

impl EncryptionManager {
    /// Derive the session key from `password` and open the session.
    pub fn new(password: &str, params: &KdfParams, suite: CipherSuite) -> Result<Self> {
        let key = derive_master_key(password, params)?;
        info!(suite = %suite, legacy_salt = params.is_legacy(), "encryption session opened");
        Ok(Self::from_master_key(key, suite))
    }

    /// Open a session around an already-derived key.
    pub fn from_master_key(key: MasterKey, suite: CipherSuite) -> Self {
        Self {
            key,
            codec: EnvelopeCodec::new(suite),
        }
    }

    /// Replace the default envelope policy (e.g. a lower file limit).
    pub fn with_codec(mut self, codec: EnvelopeCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.codec.suite()
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    /// Encrypt a text secret into a base64 envelope.
    pub fn encrypt_text(&self, plain: &str) -> Result<String> {
        self.codec.encrypt_text(&self.key, plain)
    }

    /// Decrypt a base64 envelope into the text secret.
    pub fn decrypt_text(&self, encoded: &str) -> Result<String> {
        self.codec.decrypt_text(&self.key, encoded)
    }

    /// Like [`encrypt_text`](Self::encrypt_text), passing `None` through.
    pub fn encrypt_text_opt(&self, plain: Option<&str>) -> Result<Option<String>> {
        plain.map(|p| self.encrypt_text(p)).transpose()
    }

    /// Like [`decrypt_text`](Self::decrypt_text), passing `None` through.
    pub fn decrypt_text_opt(&self, encoded: Option<&str>) -> Result<Option<String>> {
        encoded.map(|e| self.decrypt_text(e)).transpose()
    }

    /// Encrypt file bytes into a raw envelope, enforcing the size limit.
    pub fn encrypt_file(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.codec.encrypt_file(&self.key, data)
    }

    /// Decrypt a raw file envelope.
    pub fn decrypt_file(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        self.codec.decrypt_file(&self.key, envelope)
    }

    /// End the session. The key is zeroized as it drops.
    pub fn close(self) {
        debug!("encryption session closed");
    }
}

impl fmt::Debug for EncryptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionManager")
            .field("key", &self.key)
            .field("codec", &self.codec)
            .finish()
    }
}
