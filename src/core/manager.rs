//! Expirable credential lifecycle over a plain secret store.
//!
//! Per identity: Unmanaged -> Active -> Expired -> Unmanaged. Expiry is
//! discovered lazily: every access first computes [`CredentialState`] and
//! evicts the whole bucket when it has passed.
//!
//! Precondition: one writer per backing store. The ledger is read once when
//! the keyring is opened and rewritten in full after every mutation, so two
//! instances racing on the same store silently overwrite each other's ledger
//! (last write wins). Nothing here locks or re-reads to detect that.

use crate::core::clock::{Clock, SystemClock};
use crate::core::codec::Codec;
use crate::core::dates::{self, Expiration};
use crate::core::ledger::{validate_identity, Association, Identity, Ledger};
use crate::core::store::SecretStore;
use crate::error::{KeyringError, Result};
use crate::models::settings::{PrunePolicy, Settings};
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Reserved names and tuning for one keyring instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringOptions {
    pub meta: Identity,
    pub secrets_service: String,
    pub kdf_iterations: u32,
    pub prune: PrunePolicy,
}

impl Default for KeyringOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for KeyringOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            meta: Identity::new(&settings.meta_service, &settings.meta_username),
            secrets_service: settings.secrets_service.clone(),
            kdf_iterations: settings.kdf_iterations,
            prune: settings.prune,
        }
    }
}

/// Where an identity currently sits in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    Unmanaged,
    Active {
        timestamp: String,
        expires_at: NaiveDateTime,
    },
    Expired {
        timestamp: String,
        expires_at: NaiveDateTime,
    },
}

pub struct ExpiringKeyring<S: SecretStore> {
    store: S,
    ledger: Ledger,
    codec: Codec,
    clock: Box<dyn Clock>,
    secrets_service: String,
}

impl<S: SecretStore> ExpiringKeyring<S> {
    /// Open against `store` using the local wall clock.
    pub fn open(store: S, options: KeyringOptions) -> Result<Self> {
        Self::with_clock(store, options, Box::new(SystemClock))
    }

    pub fn with_clock(store: S, options: KeyringOptions, clock: Box<dyn Clock>) -> Result<Self> {
        let ledger = Ledger::load(&store, options.meta)?;
        let mut keyring = Self {
            store,
            ledger,
            codec: Codec::new(options.kdf_iterations),
            clock,
            secrets_service: options.secrets_service,
        };
        if options.prune == PrunePolicy::OnStartup {
            keyring.prune_expired()?;
        }
        Ok(keyring)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn secrets_service(&self) -> &str {
        &self.secrets_service
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Tagged lifecycle check with no side effects.
    pub fn state(&self, service: &str, username: &str) -> CredentialState {
        let Some(timestamp) = self.ledger.bucket_of(service, username) else {
            return CredentialState::Unmanaged;
        };
        // an unparseable bucket can never be valid again; treat it as expired
        let expires_at = self
            .ledger
            .parsed_instant(timestamp)
            .unwrap_or(NaiveDateTime::MIN);
        let timestamp = timestamp.to_string();
        if expires_at < self.clock.now() {
            CredentialState::Expired {
                timestamp,
                expires_at,
            }
        } else {
            CredentialState::Active {
                timestamp,
                expires_at,
            }
        }
    }

    pub fn is_managed(&self, service: &str, username: &str) -> bool {
        self.ledger.has_identity(service, username)
    }

    /// Expiry check that does not evict.
    pub fn is_expired(&self, service: &str, username: &str) -> bool {
        matches!(
            self.state(service, username),
            CredentialState::Expired { .. }
        )
    }

    /// Distinct encryption keys in use.
    pub fn bucket_count(&self) -> usize {
        self.ledger.bucket_count()
    }

    /// Every managed identity with its bucket, soonest expiry first.
    pub fn entries(&self) -> Vec<Association> {
        let mut out: Vec<_> = self.ledger.associations().collect();
        out.sort_by(|a, b| {
            a.expires_at
                .cmp(&b.expires_at)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        out
    }

    /// Store `password` for `service:username`, expiring at `expiration`.
    /// Returns the canonical bucket timestamp.
    pub fn set_password(
        &mut self,
        service: &str,
        username: &str,
        password: &str,
        expiration: impl Into<Expiration>,
    ) -> Result<String> {
        self.check_identity(service, username)?;
        let expires_at = dates::resolve(&expiration.into(), self.clock.now())?;
        self.seal(service, username, password.as_bytes(), expires_at)
    }

    /// Decrypt the password for `service:username`.
    ///
    /// `Ok(None)` means the ledger knows the identity but the store holds no
    /// ciphertext for it.
    pub fn get_password(
        &mut self,
        service: &str,
        username: &str,
    ) -> Result<Option<Zeroizing<String>>> {
        match self.open_entry(service, username)? {
            None => Ok(None),
            Some(mut bytes) => String::from_utf8(std::mem::take(&mut *bytes))
                .map(|s| Some(Zeroizing::new(s)))
                .map_err(|_| KeyringError::Encoding),
        }
    }

    pub fn delete_password(&mut self, service: &str, username: &str) -> Result<()> {
        if !self.ledger.has_identity(service, username) {
            return Err(KeyringError::not_managed(service, username));
        }
        self.discard(service, username);
        self.ledger.unbind_identity(service, username, true)?;
        self.ledger.persist(&self.store)?;
        debug!(service, username, "credential deleted");
        Ok(())
    }

    /// Move `service:username` to a new expiration.
    ///
    /// A sole-member bucket is renamed in place under the same key. A shared
    /// bucket is left alone: the value is decrypted and sealed again into the
    /// target bucket, so other members never see their expiry change.
    pub fn extend_expiration(
        &mut self,
        service: &str,
        username: &str,
        expiration: impl Into<Expiration>,
    ) -> Result<String> {
        let current = match self.state(service, username) {
            CredentialState::Unmanaged => {
                return Err(KeyringError::not_managed(service, username))
            }
            CredentialState::Expired { timestamp, .. } => {
                self.evict(&timestamp)?;
                return Err(KeyringError::AlreadyExpired { timestamp });
            }
            CredentialState::Active { timestamp, .. } => timestamp,
        };

        let now = self.clock.now();
        let expires_at = dates::resolve(&expiration.into(), now)?;
        let target = dates::canonicalize(expires_at);
        if expires_at < now {
            return Err(KeyringError::AlreadyExpired { timestamp: target });
        }
        if target == current {
            return Ok(target);
        }

        // member counts assume a single writer; a concurrent instance could make this stale
        if self.ledger.members(&current) == 1 && !self.ledger.has_bucket(&target) {
            self.ledger.rename_bucket(&current, &target)?;
            self.ledger.persist(&self.store)?;
            debug!(service, username, from = %current, to = %target, "bucket renamed");
            return Ok(target);
        }

        let Some(plaintext) = self.open_entry(service, username)? else {
            // nothing recoverable to move; drop the stale binding
            self.ledger.unbind_identity(service, username, true)?;
            self.ledger.persist(&self.store)?;
            return Err(KeyringError::not_managed(service, username));
        };
        self.seal(service, username, &plaintext, expires_at)
    }

    pub fn set_secret(
        &mut self,
        name: &str,
        secret: &str,
        expiration: impl Into<Expiration>,
    ) -> Result<String> {
        let service = self.secrets_service.clone();
        self.set_password(&service, name, secret, expiration)
    }

    pub fn get_secret(&mut self, name: &str) -> Result<Option<Zeroizing<String>>> {
        let service = self.secrets_service.clone();
        self.get_password(&service, name)
    }

    pub fn delete_secret(&mut self, name: &str) -> Result<()> {
        let service = self.secrets_service.clone();
        self.delete_password(&service, name)
    }

    /// Remove every identity whose bucket has passed; one ledger write at the end.
    pub fn prune_expired(&mut self) -> Result<Vec<Identity>> {
        let now = self.clock.now();
        let pruned = self.ledger.expired_identities(now);
        for id in &pruned {
            self.ledger.unbind_identity(&id.service, &id.username, true)?;
            self.discard(&id.service, &id.username);
        }

        let stale_buckets: Vec<String> = self
            .ledger
            .document()
            .date_encryption
            .keys()
            .filter(|ts| self.ledger.members(ts) == 0)
            .filter(|ts| {
                self.ledger
                    .parsed_instant(ts)
                    .map_or(true, |at| at < now)
            })
            .cloned()
            .collect();
        for ts in &stale_buckets {
            self.ledger.remove_bucket(ts)?;
        }

        if !pruned.is_empty() || !stale_buckets.is_empty() {
            self.ledger.persist(&self.store)?;
            info!(
                identities = pruned.len(),
                buckets = stale_buckets.len(),
                "pruned expired entries"
            );
        }
        Ok(pruned)
    }

    /// Delete every managed ciphertext and reset the ledger to empty.
    pub fn purge_all(&mut self) -> Result<usize> {
        let identities = self.ledger.identities();
        for id in &identities {
            self.discard(&id.service, &id.username);
        }
        self.ledger.clear();
        self.ledger.persist(&self.store)?;
        info!(identities = identities.len(), "keyring purged");
        Ok(identities.len())
    }

    /// Ledger inconsistencies plus bound identities missing their ciphertext.
    pub fn problems(&self) -> Vec<String> {
        let mut out = self.ledger.problems();
        for assoc in self.ledger.associations() {
            let Identity { service, username } = &assoc.identity;
            if !self.store.has(service, username) {
                out.push(format!("{} has no stored ciphertext", assoc.identity));
            }
        }
        out
    }

    fn check_identity(&self, service: &str, username: &str) -> Result<()> {
        validate_identity(service, username)?;
        let meta = self.ledger.meta();
        if service == meta.service && username == meta.username {
            return Err(KeyringError::InvalidIdentity(
                "identity is reserved for the ledger".to_string(),
            ));
        }
        Ok(())
    }

    /// Encrypt into the bucket for `expires_at`, write the ciphertext, then
    /// bind and persist. Nothing in the ledger changes until the store write
    /// has succeeded.
    fn seal(
        &mut self,
        service: &str,
        username: &str,
        plaintext: &[u8],
        expires_at: NaiveDateTime,
    ) -> Result<String> {
        let timestamp = dates::canonicalize(expires_at);
        if expires_at < self.clock.now() {
            return Err(KeyringError::AlreadyExpired { timestamp });
        }

        let (token, new_key) = if self.ledger.has_bucket(&timestamp) {
            let key = self.ledger.bucket_key(&timestamp)?;
            (self.codec.encrypt(plaintext, key)?, None)
        } else {
            let (token, key) = self.codec.encrypt_with_generated_key(plaintext)?;
            (token, Some(key))
        };

        self.store.set(service, username, token.as_bytes())?;

        if let Some(key) = new_key {
            self.ledger.create_bucket(&timestamp, &key)?;
        }
        let previous = self.ledger.bind_identity(&timestamp, service, username)?;
        if let Some(prev) = previous {
            if prev != timestamp && self.ledger.members(&prev) == 0 {
                self.ledger.remove_bucket(&prev)?;
            }
        }
        self.ledger.persist(&self.store)?;
        debug!(service, username, %timestamp, "credential stored");
        Ok(timestamp)
    }

    /// State check, lazy eviction, then fetch and decrypt.
    fn open_entry(&mut self, service: &str, username: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let timestamp = match self.state(service, username) {
            CredentialState::Unmanaged => {
                return Err(KeyringError::not_managed(service, username))
            }
            CredentialState::Expired { timestamp, .. } => {
                self.evict(&timestamp)?;
                return Err(KeyringError::AlreadyExpired { timestamp });
            }
            CredentialState::Active { timestamp, .. } => timestamp,
        };

        let Some(raw) = self.store.get(service, username)? else {
            debug!(service, username, "ledger entry without stored ciphertext");
            return Ok(None);
        };
        let token = std::str::from_utf8(&raw).map_err(|_| KeyringError::AuthenticationFailure)?;
        let key = self.ledger.bucket_key(&timestamp)?;
        Codec::decrypt(token, key).map(Some)
    }

    /// Drop an expired bucket together with every member's ciphertext.
    fn evict(&mut self, timestamp: &str) -> Result<()> {
        let detached = self.ledger.remove_bucket(timestamp)?;
        for id in &detached {
            self.discard(&id.service, &id.username);
        }
        self.ledger.persist(&self.store)?;
        info!(%timestamp, identities = detached.len(), "evicted expired bucket");
        Ok(())
    }

    /// Best-effort ciphertext removal; the secret is unrecoverable either way.
    fn discard(&self, service: &str, username: &str) {
        if let Err(e) = self.store.delete(service, username) {
            warn!(service, username, error = %e, "failed to delete stored ciphertext");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::store::MemoryStore;
    use chrono::{Duration, NaiveDate};
    use std::cell::Cell;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn options() -> KeyringOptions {
        KeyringOptions {
            meta: Identity::new("EKR_META", "test"),
            secrets_service: "EKR_SECRETS".into(),
            kdf_iterations: 1_000,
            prune: PrunePolicy::OnAccess,
        }
    }

    fn keyring(store: &MemoryStore) -> (ExpiringKeyring<&MemoryStore>, ManualClock) {
        let clock = ManualClock::new(start());
        let kr = ExpiringKeyring::with_clock(store, options(), Box::new(clock.clone())).unwrap();
        (kr, clock)
    }

    #[test]
    fn test_set_then_get() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        let ts = kr.set_password("svc", "user", "hunter2", "in 1 hour").unwrap();
        assert_eq!(ts, "20300615130000");
        assert_eq!(kr.get_password("svc", "user").unwrap().unwrap().as_str(), "hunter2");
        assert!(kr.is_managed("svc", "user"));

        // stored value is a token, not the plaintext
        let raw = store.get("svc", "user").unwrap().unwrap();
        assert_ne!(raw, b"hunter2".to_vec());
    }

    #[test]
    fn test_expires_after_deadline() {
        let store = MemoryStore::new();
        let (mut kr, clock) = keyring(&store);
        kr.set_secret("test", "test12412415", "in 3 seconds").unwrap();
        assert_eq!(kr.get_secret("test").unwrap().unwrap().as_str(), "test12412415");

        clock.advance(Duration::seconds(6));
        assert!(kr.is_expired("EKR_SECRETS", "test"));
        assert!(kr.is_managed("EKR_SECRETS", "test"), "is_expired must not evict");

        assert!(matches!(
            kr.get_secret("test"),
            Err(KeyringError::AlreadyExpired { .. })
        ));
        assert!(!kr.is_managed("EKR_SECRETS", "test"));
        assert!(!store.has("EKR_SECRETS", "test"));
        assert_eq!(kr.bucket_count(), 0);
    }

    #[test]
    fn test_set_in_past_rejected() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        let yesterday = start() - Duration::days(1);
        assert!(matches!(
            kr.set_password("svc", "user", "pw", yesterday),
            Err(KeyringError::AlreadyExpired { .. })
        ));
        assert!(!kr.is_managed("svc", "user"));
        assert!(!store.has("svc", "user"));
    }

    #[test]
    fn test_bucket_sharing() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        kr.set_password("svc", "a", "1", "in 2 days").unwrap();
        kr.set_password("other", "b", "2", "in 2 days").unwrap();
        assert_eq!(kr.bucket_count(), 1);
        kr.set_password("svc", "c", "3", "in 3 days").unwrap();
        assert_eq!(kr.bucket_count(), 2);

        assert_eq!(kr.get_password("svc", "a").unwrap().unwrap().as_str(), "1");
        assert_eq!(kr.get_password("other", "b").unwrap().unwrap().as_str(), "2");
        assert_eq!(kr.get_password("svc", "c").unwrap().unwrap().as_str(), "3");
    }

    #[test]
    fn test_reset_moves_bucket_and_drops_empty_one() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        kr.set_password("svc", "a", "old", "in 2 days").unwrap();
        kr.set_password("svc", "a", "new", "in 5 days").unwrap();
        assert_eq!(kr.bucket_count(), 1);
        assert_eq!(kr.ledger().bucket_of("svc", "a"), Some("20300620000000"));
        assert_eq!(kr.get_password("svc", "a").unwrap().unwrap().as_str(), "new");

        // same expiry again reuses the bucket
        kr.set_password("svc", "a", "newer", "in 5 days").unwrap();
        assert_eq!(kr.bucket_count(), 1);
        assert_eq!(kr.get_password("svc", "a").unwrap().unwrap().as_str(), "newer");
    }

    #[test]
    fn test_separator_rejected_and_ledger_unchanged() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        kr.set_password("svc", "a", "1", "in 1 day").unwrap();
        let before = kr.ledger().document().clone();

        for (svc, user) in [("s|vc", "user"), ("svc", "us|er")] {
            assert!(matches!(
                kr.set_password(svc, user, "pw", "in 1 day"),
                Err(KeyringError::InvalidIdentity(_))
            ));
        }
        assert_eq!(kr.ledger().document(), &before);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_meta_identity_reserved() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        assert!(matches!(
            kr.set_password("EKR_META", "test", "pw", "in 1 day"),
            Err(KeyringError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_not_managed_is_distinct() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        store.set("svc", "plain", b"unmanaged value").unwrap();
        assert!(matches!(
            kr.get_password("svc", "plain"),
            Err(KeyringError::NotManaged { .. })
        ));
        assert!(matches!(
            kr.delete_password("svc", "plain"),
            Err(KeyringError::NotManaged { .. })
        ));
        assert!(matches!(
            kr.extend_expiration("svc", "plain", "in 1 day"),
            Err(KeyringError::NotManaged { .. })
        ));
        assert!(store.has("svc", "plain"), "unmanaged entries are untouched");
    }

    #[test]
    fn test_missing_ciphertext_is_soft_miss() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        kr.set_password("svc", "user", "pw", "in 1 day").unwrap();
        store.delete("svc", "user").unwrap();
        assert!(kr.get_password("svc", "user").unwrap().is_none());
        assert_eq!(kr.problems().len(), 1);
    }

    #[test]
    fn test_delete_cascades_bucket() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        kr.set_password("svc", "a", "1", "in 1 day").unwrap();
        kr.set_password("svc", "b", "2", "in 1 day").unwrap();

        kr.delete_password("svc", "a").unwrap();
        assert!(!store.has("svc", "a"));
        assert_eq!(kr.bucket_count(), 1);

        kr.delete_password("svc", "b").unwrap();
        assert_eq!(kr.bucket_count(), 0);
        assert!(matches!(
            kr.delete_password("svc", "b"),
            Err(KeyringError::NotManaged { .. })
        ));
    }

    #[test]
    fn test_extend_sole_member_renames_in_place() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        let old = kr.set_password("svc", "a", "pw", "in 1 day").unwrap();
        let key = kr.ledger().bucket_key(&old).unwrap().to_string();
        let token = store.get("svc", "a").unwrap();

        let new = kr.extend_expiration("svc", "a", "in 10 days").unwrap();
        assert_eq!(new, "20300625000000");
        assert_eq!(kr.ledger().bucket_key(&new).unwrap(), key);
        assert!(!kr.ledger().has_bucket(&old));
        assert_eq!(store.get("svc", "a").unwrap(), token, "no re-encryption");
        assert_eq!(kr.get_password("svc", "a").unwrap().unwrap().as_str(), "pw");
    }

    #[test]
    fn test_extend_shared_bucket_reencrypts() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        let shared = kr.set_password("svc", "a", "pw-a", "in 1 day").unwrap();
        kr.set_password("svc", "b", "pw-b", "in 1 day").unwrap();

        let new = kr.extend_expiration("svc", "a", "in 10 days").unwrap();
        assert_ne!(new, shared);
        assert_eq!(kr.ledger().bucket_of("svc", "b"), Some(shared.as_str()));
        assert_eq!(kr.ledger().bucket_of("svc", "a"), Some(new.as_str()));
        assert_eq!(kr.bucket_count(), 2);
        assert_ne!(
            kr.ledger().bucket_key(&new).unwrap(),
            kr.ledger().bucket_key(&shared).unwrap()
        );
        assert_eq!(kr.get_password("svc", "a").unwrap().unwrap().as_str(), "pw-a");
        assert_eq!(kr.get_password("svc", "b").unwrap().unwrap().as_str(), "pw-b");
    }

    #[test]
    fn test_extend_into_existing_bucket_joins_it() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        kr.set_password("svc", "a", "pw-a", "in 1 day").unwrap();
        let target = kr.set_password("svc", "b", "pw-b", "in 4 days").unwrap();

        kr.extend_expiration("svc", "a", "in 4 days").unwrap();
        assert_eq!(kr.bucket_count(), 1);
        assert_eq!(kr.ledger().bucket_of("svc", "a"), Some(target.as_str()));
        assert_eq!(kr.get_password("svc", "a").unwrap().unwrap().as_str(), "pw-a");
    }

    #[test]
    fn test_extend_expired_fails() {
        let store = MemoryStore::new();
        let (mut kr, clock) = keyring(&store);
        kr.set_password("svc", "a", "pw", "in 5 seconds").unwrap();
        clock.advance(Duration::seconds(10));
        assert!(matches!(
            kr.extend_expiration("svc", "a", "in 1 day"),
            Err(KeyringError::AlreadyExpired { .. })
        ));
        assert!(!kr.is_managed("svc", "a"));
    }

    #[test]
    fn test_prune_only_touches_expired() {
        let store = MemoryStore::new();
        let (mut kr, clock) = keyring(&store);
        kr.set_password("svc", "short1", "1", "in 10 seconds").unwrap();
        kr.set_password("svc", "short2", "2", "in 10 seconds").unwrap();
        kr.set_password("svc", "short3", "3", "in 1 minute").unwrap();
        kr.set_password("svc", "long", "4", "in 3 days").unwrap();
        assert_eq!(kr.bucket_count(), 3);

        clock.advance(Duration::seconds(30));
        let mut pruned = kr.prune_expired().unwrap();
        pruned.sort();
        assert_eq!(
            pruned,
            vec![Identity::new("svc", "short1"), Identity::new("svc", "short2")]
        );

        assert!(kr.ledger().expired(kr.now()).next().is_none());
        assert!(!store.has("svc", "short1"));
        assert!(!store.has("svc", "short2"));
        assert_eq!(kr.bucket_count(), 2);
        assert_eq!(kr.get_password("svc", "short3").unwrap().unwrap().as_str(), "3");
        assert_eq!(kr.get_password("svc", "long").unwrap().unwrap().as_str(), "4");

        assert!(kr.prune_expired().unwrap().is_empty());
    }

    #[test]
    fn test_prune_sweeps_members_of_malformed_bucket() {
        let store = MemoryStore::new();
        store
            .set(
                "EKR_META",
                "test",
                br#"{"date_encryption":{"garbage":"k"},"name_dates":{"svc|a":"garbage"}}"#,
            )
            .unwrap();
        store.set("svc", "a", b"token").unwrap();
        let (mut kr, _) = keyring(&store);
        assert!(kr.is_expired("svc", "a"));

        assert_eq!(kr.prune_expired().unwrap(), vec![Identity::new("svc", "a")]);
        assert!(!kr.is_managed("svc", "a"));
        assert!(!kr.is_expired("svc", "a"));
        assert!(!store.has("svc", "a"));
        assert_eq!(kr.bucket_count(), 0);
    }

    #[test]
    fn test_open_rejects_binding_to_missing_bucket() {
        let store = MemoryStore::new();
        store
            .set(
                "EKR_META",
                "test",
                br#"{"date_encryption":{},"name_dates":{"svc|a":"20310101000000"}}"#,
            )
            .unwrap();
        store.set("svc", "a", b"token").unwrap();
        let opened =
            ExpiringKeyring::with_clock(&store, options(), Box::new(ManualClock::new(start())));
        assert!(matches!(opened, Err(KeyringError::CorruptLedger(_))));
    }

    #[test]
    fn test_purge_is_idempotent() {
        let store = MemoryStore::new();
        let (mut kr, _) = keyring(&store);
        kr.set_password("svc", "a", "1", "in 1 day").unwrap();
        kr.set_secret("token", "2", "in 2 days").unwrap();
        store.set("svc", "unmanaged", b"keep").unwrap();

        assert_eq!(kr.purge_all().unwrap(), 2);
        assert!(kr.ledger().document().is_empty());
        assert_eq!(kr.purge_all().unwrap(), 0);
        assert!(kr.ledger().document().is_empty());
        assert!(!store.has("svc", "a"));
        assert!(store.has("svc", "unmanaged"));
    }

    #[test]
    fn test_prune_on_startup() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(start());
        {
            let mut kr =
                ExpiringKeyring::with_clock(&store, options(), Box::new(clock.clone())).unwrap();
            kr.set_password("svc", "a", "pw", "in 2 seconds").unwrap();
        }
        clock.advance(Duration::minutes(1));
        let opts = KeyringOptions {
            prune: PrunePolicy::OnStartup,
            ..options()
        };
        let kr = ExpiringKeyring::with_clock(&store, opts, Box::new(clock)).unwrap();
        assert!(!kr.is_managed("svc", "a"));
        assert!(!store.has("svc", "a"));
    }

    #[test]
    fn test_state_transitions() {
        let store = MemoryStore::new();
        let (mut kr, clock) = keyring(&store);
        assert_eq!(kr.state("svc", "a"), CredentialState::Unmanaged);
        kr.set_password("svc", "a", "pw", "in 1 minute").unwrap();
        assert!(matches!(kr.state("svc", "a"), CredentialState::Active { .. }));
        clock.advance(Duration::minutes(2));
        assert!(matches!(kr.state("svc", "a"), CredentialState::Expired { .. }));
        let _ = kr.get_password("svc", "a");
        assert_eq!(kr.state("svc", "a"), CredentialState::Unmanaged);
    }

    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: Cell<bool>,
    }

    impl SecretStore for FlakyStore {
        fn get(&self, service: &str, username: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(service, username)
        }

        fn set(&self, service: &str, username: &str, value: &[u8]) -> Result<()> {
            if self.fail_writes.get() {
                return Err(KeyringError::Backend("write refused".into()));
            }
            self.inner.set(service, username, value)
        }

        fn delete(&self, _service: &str, _username: &str) -> Result<()> {
            Err(KeyringError::Backend("delete refused".into()))
        }
    }

    #[test]
    fn test_failed_store_write_leaves_ledger_untouched() {
        let store = FlakyStore::default();
        let mut kr =
            ExpiringKeyring::with_clock(&store, options(), Box::new(ManualClock::new(start())))
                .unwrap();
        store.fail_writes.set(true);
        assert!(matches!(
            kr.set_password("svc", "a", "pw", "in 1 day"),
            Err(KeyringError::Backend(_))
        ));
        assert!(!kr.is_managed("svc", "a"));
        assert_eq!(kr.bucket_count(), 0);
    }

    #[test]
    fn test_delete_failures_are_swallowed() {
        let store = FlakyStore::default();
        let mut kr =
            ExpiringKeyring::with_clock(&store, options(), Box::new(ManualClock::new(start())))
                .unwrap();
        kr.set_password("svc", "a", "pw", "in 1 day").unwrap();
        kr.delete_password("svc", "a").unwrap();
        assert!(!kr.is_managed("svc", "a"));
    }
}
