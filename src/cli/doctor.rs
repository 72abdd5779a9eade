//! Diagnostics for settings, store files, and ledger consistency.

use crate::cli::CliContext;
use crate::constants;
use crate::core::file_lock::StoreLock;
use crate::models::settings::BackendKind;
use anyhow::{bail, Result};
use clap::Args;
use std::path::Path;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Also list every identity whose bucket has expired but was not yet evicted
    #[arg(long)]
    pub expired: bool,
}

#[derive(Default)]
struct Tally {
    ok: u32,
    warn: u32,
    fail: u32,
}

impl Tally {
    fn pass(&mut self, msg: impl AsRef<str>) {
        println!("  [PASS] {}", msg.as_ref());
        self.ok += 1;
    }

    fn warn(&mut self, msg: impl AsRef<str>) {
        println!("  [WARN] {}", msg.as_ref());
        self.warn += 1;
    }

    fn fail(&mut self, msg: impl AsRef<str>) {
        println!("  [FAIL] {}", msg.as_ref());
        self.fail += 1;
    }
}

pub fn run(ctx: &CliContext, args: DoctorArgs) -> Result<()> {
    let paths = &ctx.paths;
    let mut t = Tally::default();

    println!("Doctor: {}", paths);
    match &ctx.settings_load_warning {
        Some(w) => t.fail(format!("settings unreadable: {}", w)),
        None if paths.settings.is_file() => {
            t.pass(format!("settings ok: {}", paths.settings.display()))
        }
        None => t.warn(format!(
            "settings missing: {} (defaults in use; run: ekring init)",
            paths.settings.display()
        )),
    }

    if paths.root.is_dir() {
        t.pass(format!("keyring root exists: {}", paths.root.display()));
        check_mode(&mut t, &paths.root, constants::ROOT_DIR_MODE, "keyring root");
    } else {
        t.warn(format!("keyring root missing: {}", paths.root.display()));
    }

    if ctx.settings.backend == BackendKind::File {
        if paths.store.is_file() {
            check_mode(&mut t, &paths.store, constants::STORE_FILE_MODE, "store file");
        }
        if paths.root.is_dir() {
            match StoreLock::try_acquire(&paths.store_lock) {
                Ok(Some(_lock)) => t.pass("store lock free"),
                Ok(None) => t.warn("store lock held by another process"),
                Err(e) => t.warn(format!("cannot probe store lock: {}", e)),
            }
        }
    }

    // opening a file store would create the missing root
    if ctx.settings.backend == BackendKind::File && !paths.root.is_dir() {
        return summarize(&t);
    }

    let keyring = match ctx.open_keyring_readonly() {
        Ok(k) => k,
        Err(e) => {
            t.fail(format!("{:#}", e));
            return summarize(&t);
        }
    };
    t.pass(format!(
        "ledger readable: {} identities in {} buckets",
        keyring.ledger().identity_count(),
        keyring.bucket_count()
    ));

    let problems = keyring.problems();
    if problems.is_empty() {
        t.pass("ledger consistent with store");
    }
    for p in problems {
        t.warn(p);
    }

    let now = keyring.now();
    let expired: Vec<_> = keyring.ledger().expired(now).collect();
    if !expired.is_empty() {
        println!(
            "  [INFO] {} expired identit{} awaiting eviction (run: ekring prune)",
            expired.len(),
            if expired.len() == 1 { "y" } else { "ies" }
        );
        if args.expired {
            for a in &expired {
                println!("    - {} (bucket {})", a.identity, a.timestamp);
            }
        }
    }

    summarize(&t)
}

fn summarize(t: &Tally) -> Result<()> {
    println!();
    println!("Doctor summary: {} pass, {} warn, {} fail", t.ok, t.warn, t.fail);
    if t.fail > 0 {
        bail!("doctor found {} failure(s)", t.fail);
    }
    Ok(())
}

#[cfg(unix)]
fn check_mode(t: &mut Tally, path: &Path, expected: u32, what: &str) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode() & 0o777;
        if mode == expected {
            t.pass(format!("{} mode ok: {:04o}", what, mode));
        } else {
            t.warn(format!(
                "{} mode: {:04o} (expected {:04o})",
                what, mode, expected
            ));
        }
    }
}

#[cfg(not(unix))]
fn check_mode(_t: &mut Tally, _path: &Path, _expected: u32, _what: &str) {}
