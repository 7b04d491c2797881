//! Encryption and credential-hashing core for a local secret and file vault.
//!
//! - [`crypto`]: key derivation, AES-256 envelopes, password hashing
//! - [`session::EncryptionManager`]: one derived key per login session
//! - [`store`]: persistence collaborators (in-memory and SQLite)
//! - [`vault`]: secret, file and user services wired to the stores

pub mod config;
pub mod crypto;
pub mod errors;
pub mod session;
pub mod store;
pub mod vault;

pub use errors::{Result, VaultError};
pub use session::EncryptionManager;
