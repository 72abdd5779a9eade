//! Keyring root resolution and file layout.

use crate::constants;
use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct KeyringPaths {
    pub root: PathBuf,
    pub settings: PathBuf,
    pub store: PathBuf,
    pub store_lock: PathBuf,
}

impl KeyringPaths {
    /// Resolve from `--root` (or `EKRING_ROOT`, via clap), else the user config dir.
    pub fn resolve(root_arg: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = root_arg.filter(|r| !r.as_os_str().is_empty()) {
            return Ok(Self::from_root(root));
        }
        let config_dir = dirs::config_dir().context("resolve user config directory")?;
        Ok(Self::from_root(config_dir.join(constants::ROOT_DIR_NAME)))
    }

    pub fn from_root(root: PathBuf) -> Self {
        let settings = root.join("ekring.toml");
        let store = root.join("store.json");
        let store_lock = root.join("store.lock");
        Self {
            root,
            settings,
            store,
            store_lock,
        }
    }
}

impl std::fmt::Display for KeyringPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ekring@{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_root() {
        let paths = KeyringPaths::from_root(PathBuf::from("/test"));
        assert_eq!(paths.root, PathBuf::from("/test"));
        assert_eq!(paths.settings, PathBuf::from("/test/ekring.toml"));
        assert_eq!(paths.store, PathBuf::from("/test/store.json"));
        assert_eq!(paths.store_lock, PathBuf::from("/test/store.lock"));
    }

    #[test]
    fn test_explicit_root_wins() {
        let paths = KeyringPaths::resolve(Some(PathBuf::from("/explicit"))).unwrap();
        assert_eq!(paths.root, PathBuf::from("/explicit"));
        assert_eq!(paths.to_string(), "ekring@/explicit");
    }
}
