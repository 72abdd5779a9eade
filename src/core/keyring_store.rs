//! OS keyring backend (Keychain, Credential Manager, Secret Service).

use crate::core::store::SecretStore;
use crate::error::{KeyringError, Result};

#[derive(Debug, Clone, Default)]
pub struct OsKeyringStore;

impl OsKeyringStore {
    pub fn new() -> Self {
        Self
    }
}

fn entry(service: &str, username: &str) -> Result<keyring::Entry> {
    keyring::Entry::new(service, username).map_err(|e| KeyringError::Backend(e.to_string()))
}

impl SecretStore for OsKeyringStore {
    fn get(&self, service: &str, username: &str) -> Result<Option<Vec<u8>>> {
        match entry(service, username)?.get_secret() {
            Ok(data) => Ok(Some(data)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeyringError::Backend(e.to_string())),
        }
    }

    fn set(&self, service: &str, username: &str, value: &[u8]) -> Result<()> {
        entry(service, username)?
            .set_secret(value)
            .map_err(|e| KeyringError::Backend(e.to_string()))
    }

    fn delete(&self, service: &str, username: &str) -> Result<()> {
        match entry(service, username)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeyringError::Backend(e.to_string())),
        }
    }
}
