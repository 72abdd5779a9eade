//! JSON-file secret store with atomic replace and 0600 permissions.
//!
//! Layout: `{ "<service>": { "<username>": "<base64 value>" } }`.

use crate::constants;
use crate::core::file_lock::StoreLock;
use crate::core::store::SecretStore;
use crate::error::{KeyringError, Result};
use crate::util::fs as keyring_fs;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

type Document = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_path: lock_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn read(&self) -> Result<Document> {
        if !self.path.exists() {
            return Ok(Document::new());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| backend("read", &self.path, e))?;
        if content.trim().is_empty() {
            return Ok(Document::new());
        }
        serde_json::from_str(&content).map_err(|e| backend("parse", &self.path, e))
    }

    fn write(&self, doc: &Document) -> Result<()> {
        let content =
            serde_json::to_string_pretty(doc).map_err(|e| backend("serialize", &self.path, e))?;
        keyring_fs::write_atomic(&self.path, content.as_bytes(), constants::STORE_FILE_MODE)
            .map_err(|e| backend("write", &self.path, e))
    }

    fn mutate(&self, f: impl FnOnce(&mut Document)) -> Result<()> {
        let _lock = StoreLock::acquire(&self.lock_path)?;
        let mut doc = self.read()?;
        f(&mut doc);
        self.write(&doc)
    }
}

fn backend(action: &str, path: &Path, err: impl std::fmt::Display) -> KeyringError {
    KeyringError::Backend(format!("{} {}: {}", action, path.display(), err))
}

impl SecretStore for FileStore {
    fn get(&self, service: &str, username: &str) -> Result<Option<Vec<u8>>> {
        let doc = self.read()?;
        let Some(encoded) = doc.get(service).and_then(|users| users.get(username)) else {
            return Ok(None);
        };
        STANDARD
            .decode(encoded)
            .map(Some)
            .map_err(|e| backend("decode entry in", &self.path, e))
    }

    fn set(&self, service: &str, username: &str, value: &[u8]) -> Result<()> {
        let encoded = STANDARD.encode(value);
        self.mutate(|doc| {
            doc.entry(service.to_string())
                .or_default()
                .insert(username.to_string(), encoded);
        })
    }

    fn delete(&self, service: &str, username: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.mutate(|doc| {
            if let Some(users) = doc.get_mut(service) {
                users.remove(username);
                if users.is_empty() {
                    doc.remove(service);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileStore {
        FileStore::new(dir.path().join("store.json"), dir.path().join("store.lock"))
    }

    #[test]
    fn test_set_get_delete() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert_eq!(s.get("svc", "user").unwrap(), None);

        s.set("svc", "user", b"token").unwrap();
        s.set("svc", "other", &[0, 159, 146, 150]).unwrap();
        assert_eq!(s.get("svc", "user").unwrap().as_deref(), Some(&b"token"[..]));
        assert_eq!(s.get("svc", "other").unwrap().as_deref(), Some(&[0u8, 159, 146, 150][..]));

        s.delete("svc", "user").unwrap();
        assert!(!s.has("svc", "user"));
        assert!(s.has("svc", "other"));
    }

    #[test]
    fn test_values_survive_new_instance() {
        let dir = TempDir::new().unwrap();
        store(&dir).set("a", "b", b"persisted").unwrap();
        assert_eq!(store(&dir).get("a", "b").unwrap().as_deref(), Some(&b"persisted"[..]));
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.delete("nope", "nope").unwrap();
        s.set("svc", "user", b"x").unwrap();
        s.delete("svc", "nope").unwrap();
        assert!(s.has("svc", "user"));
    }

    #[cfg(unix)]
    #[test]
    fn test_store_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.set("svc", "user", b"x").unwrap();
        let mode = fs::metadata(s.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, constants::STORE_FILE_MODE);
    }

    #[test]
    fn test_corrupt_file_is_backend_error() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::write(s.path(), "{not json").unwrap();
        assert!(matches!(s.get("svc", "user"), Err(KeyringError::Backend(_))));
    }
}
