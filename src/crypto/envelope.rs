//! Envelope framing and payload policy.
//!
//! Text secrets are stored as `base64(IV || ciphertext)`; files are
//! stored as the raw binary envelope. File payloads above the size limit
//! are refused before any cipher work happens.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;
use zeroize::Zeroize;

use super::encryption::{decrypt_bytes, encrypt_bytes, CipherSuite};
use super::keys::MasterKey;
use crate::errors::{Result, VaultError};

/// Hard upper bound on a file payload: 10 MiB.
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// A logical secret handed to the codec.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Text(&'a str),
    File(&'a [u8]),
}

/// The stored form of a [`Payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sealed {
    /// Base64 envelope, printable.
    Text(String),
    /// Raw binary envelope.
    File(Vec<u8>),
}

/// Applies size and framing policy around the symmetric cipher.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    suite: CipherSuite,
    max_file_bytes: usize,
}

impl EnvelopeCodec {
    pub fn new(suite: CipherSuite) -> Self {
        Self {
            suite,
            max_file_bytes: MAX_FILE_BYTES,
        }
    }

    /// Lower the file size limit. Raising it above 10 MiB is refused.
    pub fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Result<Self> {
        if max_file_bytes > MAX_FILE_BYTES {
            return Err(VaultError::Configuration(format!(
                "file size limit cannot exceed {MAX_FILE_BYTES} bytes (got {max_file_bytes})"
            )));
        }
        self.max_file_bytes = max_file_bytes;
        Ok(self)
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    /// Route a payload to the matching encryption path.
    pub fn seal(&self, key: &MasterKey, payload: Payload<'_>) -> Result<Sealed> {
        match payload {
            Payload::Text(text) => self.encrypt_text(key, text).map(Sealed::Text),
            Payload::File(data) => self.encrypt_file(key, data).map(Sealed::File),
        }
    }

    /// Encrypt UTF-8 text into a base64 envelope.
    pub fn encrypt_text(&self, key: &MasterKey, text: &str) -> Result<String> {
        let envelope = encrypt_bytes(self.suite, key, text.as_bytes())?;
        debug!(suite = %self.suite, envelope_len = envelope.len(), "encrypted text secret");
        Ok(BASE64.encode(envelope))
    }

    /// Decrypt a base64 envelope back to text.
    pub fn decrypt_text(&self, key: &MasterKey, encoded: &str) -> Result<String> {
        let envelope = BASE64
            .decode(encoded)
            .map_err(|_| VaultError::DecryptionFailed)?;
        let plaintext = decrypt_bytes(self.suite, key, &envelope)?;

        String::from_utf8(plaintext).map_err(|e| {
            let mut bad_bytes = e.into_bytes();
            bad_bytes.zeroize();
            VaultError::DecryptionFailed
        })
    }

    /// Encrypt raw file bytes into a binary envelope.
    pub fn encrypt_file(&self, key: &MasterKey, data: &[u8]) -> Result<Vec<u8>> {
        self.check_file_size(data.len())?;
        let envelope = encrypt_bytes(self.suite, key, data)?;
        debug!(
            suite = %self.suite,
            plain_len = data.len(),
            envelope_len = envelope.len(),
            "encrypted file payload"
        );
        Ok(envelope)
    }

    /// Decrypt a binary envelope back to file bytes.
    pub fn decrypt_file(&self, key: &MasterKey, envelope: &[u8]) -> Result<Vec<u8>> {
        decrypt_bytes(self.suite, key, envelope)
    }

    /// Refuse file payloads over the configured limit.
    pub fn check_file_size(&self, len: usize) -> Result<()> {
        if len > self.max_file_bytes {
            return Err(VaultError::Validation(format!(
                "file too large: {len} bytes exceeds the {} byte limit",
                self.max_file_bytes
            )));
        }
        Ok(())
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(CipherSuite::default())
    }
}
