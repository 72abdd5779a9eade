use crate::cli::{parse_expiration, CliContext};
use crate::constants;
use crate::core::dates::Expiration;
use crate::core::ledger::validate_identity;
use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, Table};
use dialoguer::Password;
use serde::Serialize;
use std::io::{Read, Write};
use zeroize::Zeroizing;

fn parse_identity_part(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("cannot be empty".into());
    }
    if s.contains(constants::IDENTITY_SEPARATOR) {
        return Err(format!("cannot contain '{}'", constants::IDENTITY_SEPARATOR));
    }
    Ok(s.to_string())
}

#[derive(Args, Debug)]
pub struct GetArgs {
    #[arg(value_parser = parse_identity_part)]
    pub service: String,
    #[arg(value_parser = parse_identity_part)]
    pub username: String,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    #[arg(value_parser = parse_identity_part)]
    pub service: String,
    #[arg(value_parser = parse_identity_part)]
    pub username: String,

    /// Epoch seconds, `in <N> <unit>`, or a date string
    #[arg(value_parser = parse_expiration)]
    pub expiration: Expiration,

    /// Password value (visible in process listings; prefer --from-stdin)
    #[arg(long, conflicts_with = "from_stdin")]
    pub password: Option<String>,

    /// Read password from stdin instead of interactive prompt
    #[arg(long)]
    pub from_stdin: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[arg(value_parser = parse_identity_part)]
    pub service: String,
    #[arg(value_parser = parse_identity_part)]
    pub username: String,
}

#[derive(Args, Debug)]
pub struct ExtendArgs {
    #[arg(value_parser = parse_identity_part)]
    pub service: String,
    #[arg(value_parser = parse_identity_part)]
    pub username: String,

    /// New expiration
    #[arg(value_parser = parse_expiration)]
    pub expiration: Expiration,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter by service name
    #[arg(long)]
    pub service: Option<String>,

    /// Output format: table|json
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Confirm deletion of every managed entry
    #[arg(long)]
    pub yes: bool,
}

#[derive(Serialize)]
struct ListItem {
    service: String,
    username: String,
    bucket: String,
    expires_at: String,
    expired: bool,
}

pub fn run_get(ctx: &CliContext, args: GetArgs) -> Result<()> {
    let mut keyring = ctx.open_keyring()?;
    match keyring.get_password(&args.service, &args.username)? {
        Some(password) => write_secret(&password),
        // managed, but nothing stored; print nothing
        None => Ok(()),
    }
}

pub fn run_set(ctx: &CliContext, args: SetArgs) -> Result<()> {
    validate_identity(&args.service, &args.username)?;
    let label = format!("{}:{}", args.service, args.username);
    let password = read_secret(args.password, args.from_stdin, &label)?;

    let mut keyring = ctx.open_keyring()?;
    let timestamp = keyring.set_password(
        &args.service,
        &args.username,
        &password,
        args.expiration,
    )?;
    println!("{} expires {}", label, display_timestamp(&keyring, &timestamp));
    Ok(())
}

pub fn run_delete(ctx: &CliContext, args: DeleteArgs) -> Result<()> {
    let mut keyring = ctx.open_keyring()?;
    keyring.delete_password(&args.service, &args.username)?;
    println!("Deleted {}:{}", args.service, args.username);
    Ok(())
}

pub fn run_extend(ctx: &CliContext, args: ExtendArgs) -> Result<()> {
    let mut keyring = ctx.open_keyring()?;
    let timestamp = keyring.extend_expiration(&args.service, &args.username, args.expiration)?;
    println!(
        "{}:{} expires {}",
        args.service,
        args.username,
        display_timestamp(&keyring, &timestamp)
    );
    Ok(())
}

pub fn run_list(ctx: &CliContext, args: ListArgs) -> Result<()> {
    if args.format != "table" && args.format != "json" {
        bail!("invalid format: {} (use table|json)", args.format);
    }

    let keyring = ctx.open_keyring_readonly()?;
    let now = keyring.now();
    let items: Vec<ListItem> = keyring
        .entries()
        .into_iter()
        .filter(|a| {
            args.service
                .as_deref()
                .map_or(true, |s| a.identity.service == s)
        })
        .map(|a| ListItem {
            service: a.identity.service,
            username: a.identity.username,
            bucket: a.timestamp,
            expires_at: format_instant(a.expires_at),
            expired: a.expires_at < now,
        })
        .collect();

    if args.format == "json" {
        let json = serde_json::to_string_pretty(&items).context("serialize list")?;
        println!("{}", json);
        return Ok(());
    }

    if items.is_empty() {
        println!("No expirable entries found");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Service").add_attribute(Attribute::Bold),
        Cell::new("Username").add_attribute(Attribute::Bold),
        Cell::new("Expires").add_attribute(Attribute::Bold),
        Cell::new("State").add_attribute(Attribute::Bold),
    ]);

    for item in items {
        let state = if item.expired {
            Cell::new("expired").fg(Color::Red)
        } else {
            Cell::new("active").fg(Color::Green)
        };
        table.add_row(vec![
            Cell::new(item.service),
            Cell::new(item.username),
            Cell::new(item.expires_at),
            state,
        ]);
    }

    println!("{}", table);
    Ok(())
}

pub fn run_prune(ctx: &CliContext) -> Result<()> {
    let mut keyring = ctx.open_keyring()?;
    let pruned = keyring.prune_expired()?;
    if pruned.is_empty() {
        println!("Nothing to prune");
        return Ok(());
    }
    for identity in &pruned {
        println!("Pruned {}", identity);
    }
    println!("{} expired entr{} removed", pruned.len(), plural_y(pruned.len()));
    Ok(())
}

pub fn run_purge(ctx: &CliContext, args: PurgeArgs) -> Result<()> {
    if !args.yes {
        bail!("refusing to purge without --yes");
    }
    let mut keyring = ctx.open_keyring()?;
    let removed = keyring.purge_all()?;
    println!("Purged {} entr{}", removed, plural_y(removed));
    Ok(())
}

fn plural_y(n: usize) -> &'static str {
    if n == 1 {
        "y"
    } else {
        "ies"
    }
}

pub(crate) fn format_instant(instant: NaiveDateTime) -> String {
    instant.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn display_timestamp(keyring: &crate::cli::CliKeyring, timestamp: &str) -> String {
    keyring
        .ledger()
        .parsed_instant(timestamp)
        .map(format_instant)
        .unwrap_or_else(|| timestamp.to_string())
}

pub(crate) fn write_secret(secret: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(secret.as_bytes())
        .context("write to stdout")?;
    stdout.write_all(b"\n").context("write to stdout")?;
    stdout.flush().context("flush stdout")?;
    Ok(())
}

/// Secret from an explicit value, stdin, or an interactive prompt.
pub(crate) fn read_secret(
    explicit: Option<String>,
    from_stdin: bool,
    label: &str,
) -> Result<Zeroizing<String>> {
    let secret = if let Some(value) = explicit {
        Zeroizing::new(value)
    } else if from_stdin {
        let mut buf = Zeroizing::new(String::new());
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read secret from stdin")?;
        Zeroizing::new(buf.trim_end_matches(['\r', '\n']).to_string())
    } else {
        Zeroizing::new(
            Password::new()
                .with_prompt(format!("Secret for {}", label))
                .allow_empty_password(false)
                .interact()
                .context("read secret from prompt")?,
        )
    };
    check_secret_size(&secret)?;
    Ok(secret)
}

fn check_secret_size(secret: &str) -> Result<()> {
    if secret.len() > constants::MAX_SECRET_SIZE {
        bail!(
            "secret exceeds maximum size ({} bytes, max {} bytes)",
            secret.len(),
            constants::MAX_SECRET_SIZE
        );
    }
    Ok(())
}
