//! Keyring settings file model (`ekring.toml`).

use crate::constants;
use serde::{Deserialize, Serialize};

/// When expired entries are swept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrunePolicy {
    /// Expired entries are evicted when touched or by an explicit prune.
    #[default]
    OnAccess,
    /// Additionally prune everything expired when the keyring is opened.
    OnStartup,
}

/// Where ciphertexts and the ledger are physically kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// JSON file under the keyring root.
    #[default]
    File,
    /// Platform keyring (requires the `keyring` feature).
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_meta_service")]
    pub meta_service: String,
    #[serde(default = "default_meta_username")]
    pub meta_username: String,
    #[serde(default = "default_secrets_service")]
    pub secrets_service: String,
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
    #[serde(default)]
    pub prune: PrunePolicy,
    #[serde(default)]
    pub backend: BackendKind,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            meta_service: default_meta_service(),
            meta_username: default_meta_username(),
            secrets_service: default_secrets_service(),
            kdf_iterations: default_kdf_iterations(),
            prune: PrunePolicy::default(),
            backend: BackendKind::default(),
        }
    }
}

fn default_meta_service() -> String {
    constants::DEFAULT_META_SERVICE.to_string()
}

fn default_meta_username() -> String {
    constants::DEFAULT_META_USERNAME.to_string()
}

fn default_secrets_service() -> String {
    constants::DEFAULT_SECRETS_SERVICE.to_string()
}

fn default_kdf_iterations() -> u32 {
    constants::DEFAULT_KDF_ITERATIONS
}
