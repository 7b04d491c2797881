//! Integration tests for a vault directory backed by SQLite.

#![cfg(feature = "sqlite")]

use std::fs;
use std::sync::Arc;
use std::thread;

use datavault::crypto::{generate_salt, hash_password_with_salt, CipherSuite, KdfParams};
use datavault::store::{AccessLogStore, SqliteStore};
use datavault::vault::{kdf_store, LocalVault};
use datavault::{EncryptionManager, VaultError};
use rusqlite::{params, Connection};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Helper: a fresh vault directory with one registered user.
fn vault_with_user(config: Option<&str>) -> (TempDir, LocalVault) {
    init_tracing();
    let dir = TempDir::new().expect("create temp dir");
    if let Some(config) = config {
        fs::write(dir.path().join(".datavault.toml"), config).unwrap();
    }
    let vault = LocalVault::open(dir.path()).expect("open vault");
    vault
        .users()
        .unwrap()
        .register("alice", "Secret123")
        .expect("register");
    (dir, vault)
}

// ---------------------------------------------------------------------------
// Unlock
// ---------------------------------------------------------------------------

#[test]
fn unlock_requires_correct_password() {
    let (_dir, vault) = vault_with_user(None);
    assert!(vault.unlock("alice", "Secret124").unwrap().is_none());
    assert!(vault.unlock("nobody", "Secret123").unwrap().is_none());
    assert!(vault.unlock("alice", "Secret123").unwrap().is_some());
}

#[test]
fn first_open_creates_database_and_kdf_sidecar() {
    let (dir, _vault) = vault_with_user(None);
    assert!(dir.path().join("vault.db").exists());
    assert!(dir.path().join("vault.kdf.json").exists());
}

#[test]
fn open_fails_for_missing_directory() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    assert!(matches!(
        LocalVault::open(&missing),
        Err(VaultError::Config(_))
    ));
}

// ---------------------------------------------------------------------------
// Directories written before per-vault salts
// ---------------------------------------------------------------------------

/// Lay out a vault directory from before per-vault salts: no KDF
/// sidecar, `users` without `record_format`, SQLite default timestamps,
/// and one CBC secret under the shared legacy salt.
fn older_vault_dir(password: &str, secret: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".datavault.toml"),
        "cipher = \"aes-256-cbc\"\n",
    )
    .unwrap();

    let salt = generate_salt();
    let hash = hash_password_with_salt(password, &salt).unwrap();
    let session =
        EncryptionManager::new(password, &KdfParams::legacy(), CipherSuite::Aes256Cbc).unwrap();
    let envelope = session.encrypt_text(secret).unwrap();

    let conn = Connection::open(dir.path().join("vault.db")).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             username TEXT NOT NULL UNIQUE,
             password_hash TEXT NOT NULL,
             salt TEXT NOT NULL,
             created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
             last_login TIMESTAMP);
         CREATE TABLE vault_data (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             user_id INTEGER NOT NULL,
             key_name TEXT NOT NULL,
             secret_value TEXT NOT NULL,
             created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
             updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP);",
    )
    .unwrap();
    conn.execute(
        "INSERT INTO users (username, password_hash, salt) VALUES ('alice', ?1, ?2)",
        params![hash, salt],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO vault_data (user_id, key_name, secret_value) VALUES (1, 'API_KEY', ?1)",
        params![envelope],
    )
    .unwrap();
    dir
}

#[test]
fn older_vault_opens_with_legacy_salt() {
    init_tracing();
    let dir = older_vault_dir("Secret123", "sk-from-before");

    let vault = LocalVault::open(dir.path()).unwrap();
    assert!(vault.unlock("alice", "Secret124").unwrap().is_none());
    let s = vault.unlock("alice", "Secret123").unwrap().unwrap();

    let listed = s.secrets.list_secrets(s.user.id, None).unwrap();
    assert_eq!(listed.len(), 1);
    let secret = s.secrets.get_secret(s.user.id, listed[0].id).unwrap();
    assert_eq!(secret.value.as_str(), "sk-from-before");

    let sidecar = kdf_store::load(&dir.path().join("vault.kdf.json")).unwrap();
    assert!(sidecar.is_legacy());
}

#[test]
fn older_vault_keeps_legacy_salt_across_reopen() {
    init_tracing();
    let dir = older_vault_dir("Secret123", "sk-from-before");
    drop(LocalVault::open(dir.path()).unwrap());

    let vault = LocalVault::open(dir.path()).unwrap();
    let s = vault.unlock("alice", "Secret123").unwrap().unwrap();
    let meta = s.secrets.add_secret(s.user.id, "NEW_KEY", "sk-after").unwrap();
    drop(s);
    drop(vault);

    let vault = LocalVault::open(dir.path()).unwrap();
    let s = vault.unlock("alice", "Secret123").unwrap().unwrap();
    assert_eq!(
        s.secrets.get_secret(s.user.id, meta.id).unwrap().value.as_str(),
        "sk-after"
    );
}

#[test]
fn fresh_vault_never_uses_legacy_salt() {
    let (dir, _vault) = vault_with_user(None);
    let sidecar = kdf_store::load(&dir.path().join("vault.kdf.json")).unwrap();
    assert!(!sidecar.is_legacy());
}

// ---------------------------------------------------------------------------
// Secrets survive reopening
// ---------------------------------------------------------------------------

#[test]
fn secrets_survive_reopen() {
    let (dir, vault) = vault_with_user(None);
    let id = {
        let session = vault.unlock("alice", "Secret123").unwrap().unwrap();
        let meta = session
            .secrets
            .add_secret(session.user.id, "API_KEY", "sk-12345abcde")
            .unwrap();
        meta.id
    };
    drop(vault);

    let reopened = LocalVault::open(dir.path()).unwrap();
    let session = reopened.unlock("alice", "Secret123").unwrap().unwrap();
    let secret = session.secrets.get_secret(session.user.id, id).unwrap();
    assert_eq!(secret.value.as_str(), "sk-12345abcde");
}

#[test]
fn secrets_are_not_readable_from_the_database_file() {
    let (dir, vault) = vault_with_user(None);
    let session = vault.unlock("alice", "Secret123").unwrap().unwrap();
    session
        .secrets
        .add_secret(session.user.id, "PLAIN_MARKER", "do-not-store-me-in-clear")
        .unwrap();
    drop(session);
    drop(vault);

    let db = fs::read(dir.path().join("vault.db")).unwrap();
    let needle = b"do-not-store-me-in-clear";
    assert!(!db.windows(needle.len()).any(|w| w == needle));
}

#[test]
fn list_and_search_secrets() {
    let (_dir, vault) = vault_with_user(None);
    let s = vault.unlock("alice", "Secret123").unwrap().unwrap();
    let uid = s.user.id;
    s.secrets.add_secret(uid, "aws_access_key", "AKIA").unwrap();
    s.secrets.add_secret(uid, "aws_secret_key", "wJal").unwrap();
    s.secrets.add_secret(uid, "github_token", "ghp_").unwrap();

    assert_eq!(s.secrets.list_secrets(uid, None).unwrap().len(), 3);
    assert_eq!(s.secrets.list_secrets(uid, Some("AWS")).unwrap().len(), 2);
    assert!(s.secrets.list_secrets(uid, Some("%")).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[test]
fn files_roundtrip_and_record_original_size() {
    let (_dir, vault) = vault_with_user(None);
    let s = vault.unlock("alice", "Secret123").unwrap().unwrap();
    let uid = s.user.id;

    let data = b"%PDF-1.7 not really a pdf".to_vec();
    s.files
        .save_file(uid, "doc.pdf", Some("application/pdf"), &data)
        .unwrap();

    let listed = s.files.list_files(uid).unwrap();
    assert_eq!(listed[0].file_name, "doc.pdf");
    assert_eq!(listed[0].file_size, data.len());
    assert_eq!(s.files.get_file(uid, "doc.pdf").unwrap(), data);

    let raw = s.files.get_encrypted_bytes(uid, "doc.pdf").unwrap();
    assert_ne!(raw, data);
}

#[test]
fn configured_file_limit_is_enforced() {
    let (_dir, vault) = vault_with_user(Some("max_file_bytes = 1024\n"));
    let s = vault.unlock("alice", "Secret123").unwrap().unwrap();
    let err = s
        .files
        .save_file(s.user.id, "big.bin", None, &[0u8; 1025])
        .unwrap_err();
    assert!(matches!(err, VaultError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[test]
fn cbc_vault_writes_cbc_envelopes() {
    let (_dir, vault) = vault_with_user(Some("cipher = \"aes-256-cbc\"\n"));
    let s = vault.unlock("alice", "Secret123").unwrap().unwrap();
    assert_eq!(s.session().cipher_suite(), CipherSuite::Aes256Cbc);

    s.files.save_file(s.user.id, "f", None, b"0123456789").unwrap();
    let raw = s.files.get_encrypted_bytes(s.user.id, "f").unwrap();
    assert_eq!(raw.len(), 32);
}

#[test]
fn access_log_can_be_disabled() {
    let (dir, vault) = vault_with_user(Some("access_log = false\n"));
    let s = vault.unlock("alice", "Secret123").unwrap().unwrap();
    s.secrets.add_secret(s.user.id, "K", "v").unwrap();
    let uid = s.user.id;
    drop(s);
    drop(vault);

    let store = SqliteStore::open(&dir.path().join("vault.db")).unwrap();
    assert!(store.recent(uid, 10).unwrap().is_empty());
}

#[test]
fn access_log_records_session_activity() {
    let (dir, vault) = vault_with_user(None);
    let s = vault.unlock("alice", "Secret123").unwrap().unwrap();
    let meta = s.secrets.add_secret(s.user.id, "K", "v").unwrap();
    s.secrets.get_secret(s.user.id, meta.id).unwrap();
    let uid = s.user.id;
    drop(s);
    drop(vault);

    let store = SqliteStore::open(&dir.path().join("vault.db")).unwrap();
    let actions: Vec<String> = store
        .recent(uid, 10)
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, ["view_secret", "add_secret", "login", "register"]);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn one_session_serves_concurrent_callers() {
    let (_dir, vault) = vault_with_user(None);
    let s = Arc::new(vault.unlock("alice", "Secret123").unwrap().unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let s = Arc::clone(&s);
            thread::spawn(move || {
                let value = format!("value-{i}");
                let meta = s
                    .secrets
                    .add_secret(s.user.id, &format!("KEY_{i}"), &value)
                    .unwrap();
                let back = s.secrets.get_secret(s.user.id, meta.id).unwrap();
                assert_eq!(back.value.as_str(), value);
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(s.secrets.list_secrets(s.user.id, None).unwrap().len(), 8);
}
