use thiserror::Error;

/// All errors that can occur in the vault core.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Crypto errors ---
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed — wrong password or corrupted data")]
    DecryptionFailed,

    #[error("Authentication failed — envelope was modified or the key is wrong")]
    AuthenticationFailed,

    // --- Policy errors ---
    #[error("Validation failed: {0}")]
    Validation(String),

    // --- Vault errors ---
    #[error("Secret {0} not found")]
    SecretNotFound(String),

    #[error("File '{0}' not found")]
    FileNotFound(String),

    #[error("Username '{0}' already exists")]
    UsernameTaken(String),

    // --- Collaborator errors ---
    #[error("Storage error: {0}")]
    Storage(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    Config(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience type alias for vault results.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Storage(e.to_string())
    }
}
