use crate::cli::CliContext;
use crate::constants;
use crate::core::config;
use crate::models::settings::{BackendKind, PrunePolicy};
use crate::util::fs as keyring_fs;
use anyhow::{bail, Context, Result};
use clap::Args;

fn parse_prune(s: &str) -> Result<PrunePolicy, String> {
    match s {
        "on_access" => Ok(PrunePolicy::OnAccess),
        "on_startup" => Ok(PrunePolicy::OnStartup),
        "task_scheduler" => Err("task_scheduler is not supported (use on_startup or prune)".into()),
        other => Err(format!(
            "invalid prune policy '{}', must be one of: on_access, on_startup",
            other
        )),
    }
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    match s {
        "file" => Ok(BackendKind::File),
        "keyring" => Ok(BackendKind::Keyring),
        other => Err(format!(
            "invalid backend '{}', must be one of: file, keyring",
            other
        )),
    }
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Service name under which the ledger is stored
    #[arg(long)]
    pub meta_service: Option<String>,

    /// Username under which the ledger is stored
    #[arg(long)]
    pub meta_username: Option<String>,

    /// Service namespace for `secret` commands
    #[arg(long)]
    pub secrets_service: Option<String>,

    /// PBKDF2 iterations for newly written tokens
    #[arg(long)]
    pub kdf_iterations: Option<u32>,

    /// When expired entries are swept (on_access|on_startup)
    #[arg(long, value_parser = parse_prune)]
    pub prune: Option<PrunePolicy>,

    /// Backing store (file|keyring)
    #[arg(long, value_parser = parse_backend)]
    pub backend: Option<BackendKind>,

    /// Overwrite an unreadable settings file with defaults plus the given flags
    #[arg(long)]
    pub force: bool,
}

pub fn run(ctx: &CliContext, args: InitArgs) -> Result<()> {
    let paths = &ctx.paths;
    if let Some(w) = &ctx.settings_load_warning {
        if !args.force {
            bail!("{} (rerun with --force to overwrite)", w);
        }
    }

    // changing reserved names on a populated keyring orphans the old ledger
    let mut settings = ctx.settings.clone();
    if let Some(v) = args.meta_service {
        settings.meta_service = v;
    }
    if let Some(v) = args.meta_username {
        settings.meta_username = v;
    }
    if let Some(v) = args.secrets_service {
        settings.secrets_service = v;
    }
    if let Some(v) = args.kdf_iterations {
        settings.kdf_iterations = v;
    }
    if let Some(v) = args.prune {
        settings.prune = v;
    }
    if let Some(v) = args.backend {
        settings.backend = v;
    }

    keyring_fs::ensure_dir(&paths.root, constants::ROOT_DIR_MODE)
        .with_context(|| format!("create keyring root {}", paths.root.display()))?;
    config::save(&paths.settings, &settings)?;

    println!("keyring initialized at {}", paths.root.display());
    println!(
        "ledger: {}:{}  secrets: {}  backend: {:?}  prune: {:?}",
        settings.meta_service,
        settings.meta_username,
        settings.secrets_service,
        settings.backend,
        settings.prune
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prune() {
        assert_eq!(parse_prune("on_startup").unwrap(), PrunePolicy::OnStartup);
        assert!(parse_prune("task_scheduler").is_err());
        assert!(parse_prune("hourly").is_err());
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend("file").unwrap(), BackendKind::File);
        assert_eq!(parse_backend("keyring").unwrap(), BackendKind::Keyring);
        assert!(parse_backend("vault").is_err());
    }
}
