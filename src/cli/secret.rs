//! Named secrets: passwords under the reserved secrets service.

use crate::cli::credential::{format_instant, read_secret, write_secret};
use crate::cli::{parse_expiration, CliContext};
use crate::core::dates::{self, Expiration};
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum SecretCommand {
    /// Decrypt and print a secret
    Get(SecretNameArgs),
    /// Store a secret with an expiration
    Set(SecretSetArgs),
    /// Delete a secret
    Delete(SecretNameArgs),
}

#[derive(Args, Debug)]
pub struct SecretNameArgs {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct SecretSetArgs {
    pub name: String,

    /// Epoch seconds, `in <N> <unit>`, or a date string
    #[arg(value_parser = parse_expiration)]
    pub expiration: Expiration,

    /// Secret value (visible in process listings; prefer --from-stdin)
    #[arg(long, conflicts_with = "from_stdin")]
    pub secret: Option<String>,

    /// Read secret from stdin instead of interactive prompt
    #[arg(long)]
    pub from_stdin: bool,
}

pub fn run(ctx: &CliContext, cmd: SecretCommand) -> Result<()> {
    match cmd {
        SecretCommand::Get(args) => {
            let mut keyring = ctx.open_keyring()?;
            match keyring.get_secret(&args.name)? {
                Some(secret) => write_secret(&secret),
                None => Ok(()),
            }
        }
        SecretCommand::Set(args) => {
            let secret = read_secret(args.secret, args.from_stdin, &args.name)?;
            let mut keyring = ctx.open_keyring()?;
            let timestamp = keyring.set_secret(&args.name, &secret, args.expiration)?;
            let expires = dates::parse_canonical(&timestamp)
                .map(format_instant)
                .unwrap_or(timestamp);
            println!("secret {} expires {}", args.name, expires);
            Ok(())
        }
        SecretCommand::Delete(args) => {
            let mut keyring = ctx.open_keyring()?;
            keyring.delete_secret(&args.name)?;
            println!("Deleted secret {}", args.name);
            Ok(())
        }
    }
}
