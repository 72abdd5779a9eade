//! CLI routing and command dispatch.

use crate::constants;
use crate::core::dates::Expiration;
use crate::core::file_store::FileStore;
use crate::core::manager::{ExpiringKeyring, KeyringOptions};
use crate::core::paths::KeyringPaths;
use crate::core::store::SecretStore;
use crate::core::config;
use crate::models::settings::{BackendKind, PrunePolicy, Settings};
use crate::util::fs as keyring_fs;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod credential;
pub mod doctor;
pub mod init;
pub mod secret;

pub type CliKeyring = ExpiringKeyring<Box<dyn SecretStore>>;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub paths: KeyringPaths,
    pub settings: Settings,
    pub settings_load_warning: Option<String>,
}

impl CliContext {
    /// The backing store selected by `backend` in settings.
    pub fn open_store(&self) -> Result<Box<dyn SecretStore>> {
        match self.settings.backend {
            BackendKind::File => {
                if !self.paths.root.exists() {
                    keyring_fs::ensure_dir(&self.paths.root, constants::ROOT_DIR_MODE)
                        .with_context(|| format!("create {}", self.paths.root.display()))?;
                }
                Ok(Box::new(FileStore::new(
                    &self.paths.store,
                    &self.paths.store_lock,
                )))
            }
            BackendKind::Keyring => os_keyring_store(),
        }
    }

    pub fn open_keyring(&self) -> Result<CliKeyring> {
        self.open_keyring_with(KeyringOptions::from(&self.settings))
    }

    /// Open without startup pruning, for commands that must not mutate.
    pub fn open_keyring_readonly(&self) -> Result<CliKeyring> {
        let options = KeyringOptions {
            prune: PrunePolicy::OnAccess,
            ..KeyringOptions::from(&self.settings)
        };
        self.open_keyring_with(options)
    }

    fn open_keyring_with(&self, options: KeyringOptions) -> Result<CliKeyring> {
        let store = self.open_store()?;
        let keyring = ExpiringKeyring::open(store, options)
            .with_context(|| format!("open keyring {}", self.paths))?;
        Ok(keyring)
    }
}

#[cfg(feature = "keyring")]
fn os_keyring_store() -> Result<Box<dyn SecretStore>> {
    Ok(Box::new(crate::core::keyring_store::OsKeyringStore::new()))
}

#[cfg(not(feature = "keyring"))]
fn os_keyring_store() -> Result<Box<dyn SecretStore>> {
    anyhow::bail!("backend \"keyring\" requires ekring built with the `keyring` feature")
}

/// All digits is an epoch, digits with one dot a fractional epoch, anything
/// else a date string.
pub(crate) fn parse_expiration(s: &str) -> Result<Expiration, String> {
    if s.trim().is_empty() {
        return Err("expiration cannot be empty".into());
    }
    Ok(Expiration::from_arg(s))
}

#[derive(Parser, Debug)]
#[command(
    name = "ekring",
    version,
    about = "Expiring credentials on top of a plain secret store"
)]
pub struct Cli {
    /// Keyring root (settings and file store)
    #[arg(long, global = true, env = "EKRING_ROOT", value_name = "PATH")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let paths = KeyringPaths::resolve(self.root)?;

        // doctor reports a broken settings file instead of failing on it
        let mut settings_load_warning: Option<String> = None;
        let settings = match config::load(&paths.settings) {
            Ok(settings) => settings,
            Err(e) if matches!(self.command, Commands::Doctor(_) | Commands::Init(_)) => {
                settings_load_warning = Some(format!("{:#}", e));
                Settings::default()
            }
            Err(e) => return Err(e),
        };

        let ctx = CliContext {
            paths,
            settings,
            settings_load_warning,
        };

        match self.command {
            Commands::Init(args) => init::run(&ctx, args),
            Commands::Get(args) => credential::run_get(&ctx, args),
            Commands::Set(args) => credential::run_set(&ctx, args),
            Commands::Delete(args) => credential::run_delete(&ctx, args),
            Commands::Extend(args) => credential::run_extend(&ctx, args),
            Commands::List(args) => credential::run_list(&ctx, args),
            Commands::Prune => credential::run_prune(&ctx),
            Commands::Purge(args) => credential::run_purge(&ctx, args),
            Commands::Secret { command } => secret::run(&ctx, command),
            Commands::Doctor(args) => doctor::run(&ctx, args),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write keyring settings
    Init(init::InitArgs),
    /// Decrypt and print a password
    Get(credential::GetArgs),
    /// Store a password with an expiration
    Set(credential::SetArgs),
    /// Delete a managed password
    Delete(credential::DeleteArgs),
    /// Move a password to a new expiration
    #[command(alias = "differ")]
    Extend(credential::ExtendArgs),
    /// List managed identities and their expirations
    List(credential::ListArgs),
    /// Remove every expired entry now
    Prune,
    /// Delete every managed entry and reset the ledger
    Purge(credential::PurgeArgs),
    /// Named secrets in the reserved secrets namespace
    Secret {
        #[command(subcommand)]
        command: secret::SecretCommand,
    },
    /// Check settings, store, and ledger consistency (read-only)
    Doctor(doctor::DoctorArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_differ_alias_parses_as_extend() {
        let cli = Cli::try_parse_from(["ekring", "differ", "svc", "user", "in 2 days"]).unwrap();
        assert!(matches!(cli.command, Commands::Extend(_)));
    }

    #[test]
    fn test_root_flag_parses_globally() {
        let cli = Cli::try_parse_from(["ekring", "list", "--root", "/tmp/ekr"]).unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/ekr")));
        let root = Cli::command()
            .get_arguments()
            .find(|a| a.get_id() == "root")
            .and_then(|a| a.get_env())
            .map(|e| e.to_os_string());
        assert_eq!(root, Some("EKRING_ROOT".into()));
    }

    #[test]
    fn test_parse_expiration_forms() {
        assert_eq!(parse_expiration("1700000000").unwrap(), Expiration::Timestamp(1_700_000_000));
        assert_eq!(
            parse_expiration("1700000000.5").unwrap(),
            Expiration::FractionalTimestamp(1_700_000_000.5)
        );
        assert_eq!(
            parse_expiration("in 3 days").unwrap(),
            Expiration::Text("in 3 days".into())
        );
        assert!(parse_expiration("  ").is_err());
    }
}
