//! Loading and saving `ekring.toml`.

use crate::constants;
use crate::models::settings::Settings;
use crate::util::fs as keyring_fs;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Load settings; a missing file yields defaults.
pub fn load(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("read settings {}", path.display()))?;
    let settings: Settings = toml::from_str(&content)
        .with_context(|| format!("parse settings {}", path.display()))?;
    validate(&settings).with_context(|| format!("invalid settings {}", path.display()))?;
    Ok(settings)
}

pub fn save(path: &Path, settings: &Settings) -> Result<()> {
    validate(settings)?;
    let content = toml::to_string_pretty(settings).context("serialize settings")?;
    keyring_fs::write_atomic(path, content.as_bytes(), constants::STORE_FILE_MODE)
        .with_context(|| format!("write settings {}", path.display()))
}

pub fn validate(settings: &Settings) -> Result<()> {
    if settings.kdf_iterations == 0 {
        bail!("kdf_iterations must be at least 1");
    }
    for (field, value) in [
        ("meta_service", &settings.meta_service),
        ("meta_username", &settings.meta_username),
        ("secrets_service", &settings.secrets_service),
    ] {
        if value.is_empty() {
            bail!("{} cannot be empty", field);
        }
        if value.contains(constants::IDENTITY_SEPARATOR) {
            bail!(
                "{} cannot contain '{}'",
                field,
                constants::IDENTITY_SEPARATOR
            );
        }
    }
    if settings.meta_service == settings.secrets_service {
        bail!("meta_service and secrets_service must differ");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::{BackendKind, PrunePolicy};
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = load(&dir.path().join("ekring.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.kdf_iterations, constants::DEFAULT_KDF_ITERATIONS);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ekring.toml");
        let settings = Settings {
            meta_username: "work".into(),
            prune: PrunePolicy::OnStartup,
            backend: BackendKind::File,
            kdf_iterations: 2_000,
            ..Settings::default()
        };
        save(&path, &settings).unwrap();
        assert_eq!(load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ekring.toml");
        fs::write(&path, "prune = \"on_startup\"\n").unwrap();
        let settings = load(&path).unwrap();
        assert_eq!(settings.prune, PrunePolicy::OnStartup);
        assert_eq!(settings.meta_service, constants::DEFAULT_META_SERVICE);
    }

    #[test]
    fn test_scheduler_prune_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ekring.toml");
        fs::write(&path, "prune = \"task_scheduler\"\n").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn test_separator_in_names_rejected() {
        let settings = Settings {
            meta_username: "a|b".into(),
            ..Settings::default()
        };
        assert!(validate(&settings).is_err());
        let settings = Settings {
            kdf_iterations: 0,
            ..Settings::default()
        };
        assert!(validate(&settings).is_err());
    }
}
