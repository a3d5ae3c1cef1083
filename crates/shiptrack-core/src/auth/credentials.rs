use anyhow::{Context, Result};
use keyring::Entry;

use super::store::{TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

const SERVICE_NAME: &str = "shiptrack";

/// Token pair stored in the OS keychain, one entry per key.
///
/// Keeps the refresh token out of plain files. Only the two session keys
/// are accepted.
pub struct KeyringTokenStore {
    access: Entry,
    refresh: Entry,
}

impl KeyringTokenStore {
    pub fn new() -> Result<Self> {
        Ok(Self {
            access: Entry::new(SERVICE_NAME, ACCESS_TOKEN_KEY)
                .context("Failed to create keyring entry")?,
            refresh: Entry::new(SERVICE_NAME, REFRESH_TOKEN_KEY)
                .context("Failed to create keyring entry")?,
        })
    }

    fn entry(&self, key: &str) -> Result<&Entry> {
        match key {
            ACCESS_TOKEN_KEY => Ok(&self.access),
            REFRESH_TOKEN_KEY => Ok(&self.refresh),
            other => Err(anyhow::anyhow!("Unsupported keychain key: {}", other)),
        }
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store token in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}
