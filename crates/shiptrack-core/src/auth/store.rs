//! Durable key-value storage for the credential pair.
//!
//! The session keeps exactly two string entries, `accessToken` and
//! `refreshToken`. The store is the source of truth: the session reads it
//! at the start of every operation and the HTTP client reads the access
//! token from it on every request, so a renewal is picked up immediately.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::auth::KeyringTokenStore;
use crate::config::{Config, TokenStoreKind};
use crate::models::TokenPair;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    fn access_token(&self) -> Result<Option<String>> {
        self.get(ACCESS_TOKEN_KEY)
    }

    fn refresh_token(&self) -> Result<Option<String>> {
        self.get(REFRESH_TOKEN_KEY)
    }

    /// Write both tokens. On failure neither is left behind.
    fn store_pair(&self, pair: &TokenPair) -> Result<()> {
        let result = self
            .set(REFRESH_TOKEN_KEY, &pair.refresh)
            .and_then(|_| self.set(ACCESS_TOKEN_KEY, &pair.access));
        if result.is_err() {
            if let Err(e) = self.clear() {
                warn!(error = %format!("{:#}", e), "Failed to roll back partially stored tokens");
            }
        }
        result
    }

    /// Remove both tokens, attempting each even if the first removal fails
    fn clear(&self) -> Result<()> {
        let access = self.remove(ACCESS_TOKEN_KEY);
        let refresh = self.remove(REFRESH_TOKEN_KEY);
        access.and(refresh)
    }
}

/// Open the store selected in the config
pub fn open_store(config: &Config) -> Result<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match config.token_store {
        TokenStoreKind::File => Arc::new(FileTokenStore::new(config.data_dir()?)),
        TokenStoreKind::Keyring => Arc::new(KeyringTokenStore::new()?),
        TokenStoreKind::Memory => Arc::new(MemoryTokenStore::new()),
    };
    Ok(store)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tokens persisted as a flat JSON object in `session.json`.
///
/// The file is re-read on every access so another process logging out is
/// observed. It is deleted once empty.
pub struct FileTokenStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        let contents = match std::fs::read_to_string(self.path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e).context("Failed to read session file"),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let path = self.path();
        if entries.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path).context("Failed to remove session file")?;
            }
            return Ok(());
        }
        std::fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;
        let contents = serde_json::to_string_pretty(entries)?;

        // Readers only ever see the old file or the new one
        let mut tmp = NamedTempFile::new_in(&self.data_dir)
            .context("Failed to create temporary session file")?;
        restrict_permissions(tmp.as_file())?;
        tmp.write_all(contents.as_bytes())
            .context("Failed to write session file")?;
        tmp.persist(&path).context("Failed to replace session file")?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .context("Failed to restrict session file permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &std::fs::File) -> Result<()> {
    Ok(())
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = lock(&self.write_lock);
        let mut entries = self.read()?;
        entries.insert(key.to_string(), value.to_string());
        self.write(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = lock(&self.write_lock);
        let mut entries = self.read()?;
        if entries.remove(key).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }
}

/// Tokens kept in process memory.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(access: &str, refresh: &str) -> Self {
        let store = Self::new();
        {
            let mut entries = lock(&store.entries);
            entries.insert(ACCESS_TOKEN_KEY.to_string(), access.to_string());
            entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh.to_string());
        }
        store
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}
