//! Encrypted file operations.
//!
//! Files are stored as raw binary envelopes together with their original
//! size for display. Payloads over the session's size limit are refused
//! before any encryption happens.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::debug;

use super::record_access;
use crate::errors::{Result, VaultError};
use crate::session::EncryptionManager;
use crate::store::{AccessLogStore, FileInfo, FileStore, UserId};

pub struct FileVault {
    store: Arc<dyn FileStore>,
    session: Arc<EncryptionManager>,
    access_log: Option<Arc<dyn AccessLogStore>>,
}

impl FileVault {
    pub fn new(store: Arc<dyn FileStore>, session: Arc<EncryptionManager>) -> Self {
        Self {
            store,
            session,
            access_log: None,
        }
    }

    /// Record save/view events in `log`.
    pub fn with_access_log(mut self, log: Arc<dyn AccessLogStore>) -> Self {
        self.access_log = Some(log);
        self
    }

    /// Encrypt `data` and store it under `file_name`.
    pub fn save_file(
        &self,
        user_id: UserId,
        file_name: &str,
        file_type: Option<&str>,
        data: &[u8],
    ) -> Result<()> {
        if file_name.trim().is_empty() {
            return Err(VaultError::Validation("file name cannot be empty".into()));
        }
        let envelope = self.session.encrypt_file(data)?;
        self.store
            .insert(user_id, file_name, file_type, data.len(), &envelope)?;

        debug!(user_id, size = data.len(), "file saved");
        record_access(self.access_log.as_deref(), user_id, "save_file", Some(file_name));
        Ok(())
    }

    /// Names and original sizes of a user's files, newest first.
    pub fn list_files(&self, user_id: UserId) -> Result<Vec<FileInfo>> {
        self.store.list(user_id)
    }

    /// Fetch and decrypt a stored file.
    pub fn get_file(&self, user_id: UserId, file_name: &str) -> Result<Vec<u8>> {
        let envelope = self.get_encrypted_bytes(user_id, file_name)?;
        let data = self.session.decrypt_file(&envelope)?;
        record_access(self.access_log.as_deref(), user_id, "view_file", Some(file_name));
        Ok(data)
    }

    /// The raw stored envelope (IV || ciphertext) of a file.
    pub fn get_encrypted_bytes(&self, user_id: UserId, file_name: &str) -> Result<Vec<u8>> {
        self.store
            .get_envelope(user_id, file_name)?
            .ok_or_else(|| VaultError::FileNotFound(file_name.to_string()))
    }
}

/// Render the first `n` bytes of `data` as space-separated upper-case hex.
pub fn head_hex(data: &[u8], n: usize) -> String {
    let mut out = String::with_capacity(n.min(data.len()) * 3);
    for (i, byte) in data.iter().take(n).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CipherSuite, EnvelopeCodec, MasterKey, MAX_FILE_BYTES};
    use crate::store::MemoryStore;

    fn vault(codec: EnvelopeCodec) -> (Arc<MemoryStore>, FileVault) {
        let store = Arc::new(MemoryStore::new());
        let session = Arc::new(
            EncryptionManager::from_master_key(MasterKey::new([0x22u8; 32]), codec.suite())
                .with_codec(codec),
        );
        (store.clone(), FileVault::new(store, session))
    }

    #[test]
    fn save_and_get_roundtrip() {
        let (_store, vault) = vault(EnvelopeCodec::new(CipherSuite::Aes256Cbc));
        let data: Vec<u8> = (0..=255u8).collect();
        vault.save_file(1, "bytes.bin", None, &data).unwrap();

        assert_eq!(vault.get_file(1, "bytes.bin").unwrap(), data);

        let files = vault.list_files(1).unwrap();
        assert_eq!(files[0].file_size, 256);

        let raw = vault.get_encrypted_bytes(1, "bytes.bin").unwrap();
        assert_eq!(raw.len(), 16 + 272);
    }

    #[test]
    fn oversized_file_is_not_stored() {
        let codec = EnvelopeCodec::default().with_max_file_bytes(8).unwrap();
        let (store, vault) = vault(codec);
        let err = vault.save_file(1, "big.bin", None, &[0u8; 9]).unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
        assert!(FileStore::list(store.as_ref(), 1).unwrap().is_empty());
    }

    #[test]
    fn oversized_file_leaves_no_access_event() {
        let store = Arc::new(MemoryStore::new());
        let session = Arc::new(EncryptionManager::from_master_key(
            MasterKey::new([0x22u8; 32]),
            CipherSuite::Aes256Gcm,
        ));
        let vault = FileVault::new(store.clone(), session).with_access_log(store.clone());

        let data = vec![0u8; MAX_FILE_BYTES + 1];
        let err = vault.save_file(1, "big.bin", None, &data).unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
        assert!(FileStore::list(store.as_ref(), 1).unwrap().is_empty());
        assert!(store.recent(1, 10).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_reported() {
        let (_store, vault) = vault(EnvelopeCodec::default());
        assert!(matches!(
            vault.get_file(1, "nope"),
            Err(VaultError::FileNotFound(_))
        ));
    }

    #[test]
    fn empty_file_name_is_rejected() {
        let (_store, vault) = vault(EnvelopeCodec::default());
        assert!(matches!(
            vault.save_file(1, "", None, b"x"),
            Err(VaultError::Validation(_))
        ));
    }

    #[test]
    fn head_hex_formats_prefix() {
        assert_eq!(head_hex(&[0x00, 0xAB, 0x10, 0xFF], 3), "00 AB 10");
        assert_eq!(head_hex(&[0x0F], 16), "0F");
        assert_eq!(head_hex(&[], 4), "");
    }
}
