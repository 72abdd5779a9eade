//! Backing secret store interface.
//!
//! The keyring only needs unconditional get/set/delete by (service, username).
//! Expiration, key management, and encryption live above this layer.

use crate::error::Result;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

pub trait SecretStore: fmt::Debug {
    fn get(&self, service: &str, username: &str) -> Result<Option<Vec<u8>>>;

    fn set(&self, service: &str, username: &str, value: &[u8]) -> Result<()>;

    /// Remove an entry. Removing a missing entry is not an error.
    fn delete(&self, service: &str, username: &str) -> Result<()>;

    fn has(&self, service: &str, username: &str) -> bool {
        matches!(self.get(service, username), Ok(Some(_)))
    }
}

impl<S: SecretStore + ?Sized> SecretStore for &S {
    fn get(&self, service: &str, username: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(service, username)
    }

    fn set(&self, service: &str, username: &str, value: &[u8]) -> Result<()> {
        (**self).set(service, username, value)
    }

    fn delete(&self, service: &str, username: &str) -> Result<()> {
        (**self).delete(service, username)
    }

    fn has(&self, service: &str, username: &str) -> bool {
        (**self).has(service, username)
    }
}

impl<S: SecretStore + ?Sized> SecretStore for Box<S> {
    fn get(&self, service: &str, username: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(service, username)
    }

    fn set(&self, service: &str, username: &str, value: &[u8]) -> Result<()> {
        (**self).set(service, username, value)
    }

    fn delete(&self, service: &str, username: &str) -> Result<()> {
        (**self).delete(service, username)
    }

    fn has(&self, service: &str, username: &str) -> bool {
        (**self).has(service, username)
    }
}

/// In-process store, used by tests and as a scratch backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, service: &str, username: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .borrow()
            .get(&(service.to_string(), username.to_string()))
            .cloned())
    }

    fn set(&self, service: &str, username: &str, value: &[u8]) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert((service.to_string(), username.to_string()), value.to_vec());
        Ok(())
    }

    fn delete(&self, service: &str, username: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .remove(&(service.to_string(), username.to_string()));
        Ok(())
    }
}
