//! In-memory metadata ledger: bucket timestamps, bucket keys, and identity bindings.
//!
//! A bucket is one canonical expiration timestamp plus the encryption key
//! shared by every identity expiring at exactly that timestamp. All mutations
//! are in memory; [`Ledger::persist`] rewrites the whole document under the
//! reserved meta identity.

use crate::constants::IDENTITY_SEPARATOR;
use crate::core::dates;
use crate::core::store::SecretStore;
use crate::error::{KeyringError, Result};
use crate::models::ledger::LedgerDocument;
use chrono::NaiveDateTime;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// A (service, username) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub service: String,
    pub username: String,
}

impl Identity {
    pub fn new(service: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            username: username.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.username)
    }
}

/// One identity -> bucket binding, with the bucket instant already parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub timestamp: String,
    pub expires_at: NaiveDateTime,
    pub identity: Identity,
}

/// Reject identity components carrying the ledger separator.
pub fn validate_identity(service: &str, username: &str) -> Result<()> {
    if service.contains(IDENTITY_SEPARATOR) {
        return Err(KeyringError::InvalidIdentity(format!(
            "service cannot contain '{}'",
            IDENTITY_SEPARATOR
        )));
    }
    if username.contains(IDENTITY_SEPARATOR) {
        return Err(KeyringError::InvalidIdentity(format!(
            "username cannot contain '{}'",
            IDENTITY_SEPARATOR
        )));
    }
    Ok(())
}

fn ledger_key(service: &str, username: &str) -> String {
    format!("{}{}{}", service, IDENTITY_SEPARATOR, username)
}

fn split_key(key: &str) -> Option<Identity> {
    key.split_once(IDENTITY_SEPARATOR)
        .map(|(service, username)| Identity::new(service, username))
}

#[derive(Debug)]
pub struct Ledger {
    meta: Identity,
    doc: LedgerDocument,
    parsed: RefCell<HashMap<String, NaiveDateTime>>,
}

impl Ledger {
    /// An empty ledger stored under `meta`.
    pub fn new(meta: Identity) -> Self {
        Self {
            meta,
            doc: LedgerDocument::default(),
            parsed: RefCell::new(HashMap::new()),
        }
    }

    /// Read the ledger document from `store`; absent means empty.
    pub fn load<S: SecretStore>(store: &S, meta: Identity) -> Result<Self> {
        let mut ledger = Self::new(meta);
        ledger.reload(store)?;
        Ok(ledger)
    }

    /// Replace in-memory state with what `store` currently holds.
    pub fn reload<S: SecretStore>(&mut self, store: &S) -> Result<()> {
        let raw = store.get(&self.meta.service, &self.meta.username)?;
        self.doc = match raw {
            None => LedgerDocument::default(),
            Some(bytes) => {
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| KeyringError::CorruptLedger(e.to_string()))?;
                serde_json::from_str(text)?
            }
        };
        self.parsed.borrow_mut().clear();
        let dangling = self
            .doc
            .name_dates
            .iter()
            .find(|(_, ts)| !self.doc.date_encryption.contains_key(ts.as_str()))
            .map(|(key, ts)| format!("identity '{}' points at missing bucket {}", key, ts));
        if let Some(msg) = dangling {
            self.doc = LedgerDocument::default();
            return Err(KeyringError::CorruptLedger(msg));
        }
        debug!(
            buckets = self.doc.date_encryption.len(),
            identities = self.doc.name_dates.len(),
            "ledger loaded"
        );
        Ok(())
    }

    /// Rewrite the whole document under the meta identity.
    pub fn persist<S: SecretStore>(&self, store: &S) -> Result<()> {
        let json = serde_json::to_string(&self.doc)?;
        store.set(&self.meta.service, &self.meta.username, json.as_bytes())?;
        debug!(
            buckets = self.doc.date_encryption.len(),
            identities = self.doc.name_dates.len(),
            "ledger persisted"
        );
        Ok(())
    }

    pub fn meta(&self) -> &Identity {
        &self.meta
    }

    pub fn document(&self) -> &LedgerDocument {
        &self.doc
    }

    pub fn has_bucket(&self, timestamp: &str) -> bool {
        self.doc.date_encryption.contains_key(timestamp)
    }

    pub fn has_identity(&self, service: &str, username: &str) -> bool {
        self.doc
            .name_dates
            .contains_key(&ledger_key(service, username))
    }

    pub fn bucket_key(&self, timestamp: &str) -> Result<&str> {
        self.doc
            .date_encryption
            .get(timestamp)
            .map(String::as_str)
            .ok_or_else(|| KeyringError::BucketNotFound(timestamp.to_string()))
    }

    /// Timestamp of the bucket `service:username` is bound to.
    pub fn bucket_of(&self, service: &str, username: &str) -> Option<&str> {
        self.doc
            .name_dates
            .get(&ledger_key(service, username))
            .map(String::as_str)
    }

    /// Number of identities bound to `timestamp`.
    pub fn members(&self, timestamp: &str) -> usize {
        self.doc
            .name_dates
            .values()
            .filter(|ts| ts.as_str() == timestamp)
            .count()
    }

    pub fn bucket_count(&self) -> usize {
        self.doc.date_encryption.len()
    }

    pub fn identity_count(&self) -> usize {
        self.doc.name_dates.len()
    }

    /// Create a bucket. Keys are created once; existing buckets are reused by lookup.
    pub fn create_bucket(&mut self, timestamp: &str, key: &str) -> Result<()> {
        if self.has_bucket(timestamp) {
            return Err(KeyringError::BucketAlreadyExists(timestamp.to_string()));
        }
        dates::parse_canonical(timestamp)?;
        self.doc
            .date_encryption
            .insert(timestamp.to_string(), key.to_string());
        Ok(())
    }

    /// Bind an identity to an existing bucket, replacing any prior binding.
    /// Returns the previously bound timestamp, if any.
    pub fn bind_identity(
        &mut self,
        timestamp: &str,
        service: &str,
        username: &str,
    ) -> Result<Option<String>> {
        validate_identity(service, username)?;
        if !self.has_bucket(timestamp) {
            return Err(KeyringError::BucketNotFound(timestamp.to_string()));
        }
        Ok(self
            .doc
            .name_dates
            .insert(ledger_key(service, username), timestamp.to_string()))
    }

    /// Remove an identity binding and return the vacated timestamp.
    ///
    /// The bucket is dropped only when `drop_empty_bucket` is set and no other
    /// identity still points at it.
    pub fn unbind_identity(
        &mut self,
        service: &str,
        username: &str,
        drop_empty_bucket: bool,
    ) -> Result<String> {
        let timestamp = self
            .doc
            .name_dates
            .remove(&ledger_key(service, username))
            .ok_or_else(|| KeyringError::IdentityNotFound {
                service: service.to_string(),
                username: username.to_string(),
            })?;
        if drop_empty_bucket && self.members(&timestamp) == 0 {
            self.doc.date_encryption.remove(&timestamp);
        }
        Ok(timestamp)
    }

    /// Remove a bucket and detach every identity bound to it.
    pub fn remove_bucket(&mut self, timestamp: &str) -> Result<Vec<Identity>> {
        if self.doc.date_encryption.remove(timestamp).is_none() {
            return Err(KeyringError::BucketNotFound(timestamp.to_string()));
        }
        self.parsed.borrow_mut().remove(timestamp);
        let mut detached = Vec::new();
        self.doc.name_dates.retain(|key, ts| {
            if ts.as_str() != timestamp {
                return true;
            }
            if let Some(identity) = split_key(key) {
                detached.push(identity);
            }
            false
        });
        Ok(detached)
    }

    /// Move a bucket (key and members) to a new timestamp.
    pub fn rename_bucket(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.has_bucket(from) {
            return Err(KeyringError::BucketNotFound(from.to_string()));
        }
        if self.has_bucket(to) {
            return Err(KeyringError::BucketAlreadyExists(to.to_string()));
        }
        dates::parse_canonical(to)?;
        if let Some(key) = self.doc.date_encryption.remove(from) {
            self.doc.date_encryption.insert(to.to_string(), key);
        }
        self.parsed.borrow_mut().remove(from);
        for ts in self.doc.name_dates.values_mut() {
            if ts.as_str() == from {
                *ts = to.to_string();
            }
        }
        Ok(())
    }

    /// Drop every bucket and binding.
    pub fn clear(&mut self) {
        self.doc = LedgerDocument::default();
        self.parsed.borrow_mut().clear();
    }

    /// Every bound identity, including ones whose bucket timestamp is malformed.
    pub fn identities(&self) -> Vec<Identity> {
        self.doc.name_dates.keys().filter_map(|k| split_key(k)).collect()
    }

    /// Every binding, computed from current state on each call.
    pub fn associations(&self) -> impl Iterator<Item = Association> + '_ {
        self.doc.name_dates.iter().filter_map(move |(key, timestamp)| {
            let identity = split_key(key)?;
            let expires_at = self.parsed_instant(timestamp)?;
            Some(Association {
                timestamp: timestamp.clone(),
                expires_at,
                identity,
            })
        })
    }

    /// Identities to sweep at `now`: bucket instant strictly before `now`, or
    /// a bucket timestamp that does not parse at all.
    pub fn expired_identities(&self, now: NaiveDateTime) -> Vec<Identity> {
        self.doc
            .name_dates
            .iter()
            .filter(|(_, ts)| self.parsed_instant(ts).map_or(true, |at| at < now))
            .filter_map(|(key, _)| split_key(key))
            .collect()
    }

    /// Bindings whose bucket instant is strictly before `now`.
    pub fn expired(&self, now: NaiveDateTime) -> impl Iterator<Item = Association> + '_ {
        self.associations().filter(move |a| a.expires_at < now)
    }

    /// Parsed instant of a bucket timestamp, cached per distinct string.
    pub fn parsed_instant(&self, timestamp: &str) -> Option<NaiveDateTime> {
        let cached = self.parsed.borrow().get(timestamp).copied();
        if cached.is_some() {
            return cached;
        }
        match dates::parse_canonical(timestamp) {
            Ok(at) => {
                self.parsed.borrow_mut().insert(timestamp.to_string(), at);
                Some(at)
            }
            Err(_) => {
                warn!(timestamp, "skipping ledger entry with malformed timestamp");
                None
            }
        }
    }

    /// Structural problems: dangling bucket references, orphan keys,
    /// malformed keys or timestamps.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (key, ts) in &self.doc.name_dates {
            if split_key(key).is_none() {
                out.push(format!("identity key '{}' has no separator", key));
            }
            if !self.has_bucket(ts) {
                out.push(format!("identity '{}' points at missing bucket {}", key, ts));
            }
        }
        for ts in self.doc.date_encryption.keys() {
            if dates::parse_canonical(ts).is_err() {
                out.push(format!("bucket '{}' is not a canonical timestamp", ts));
            }
            if self.members(ts) == 0 {
                out.push(format!("bucket {} has no members", ts));
            }
        }
        out
    }
}
