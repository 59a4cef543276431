//! smartcache CLI - Main entry point

mod commands;

use clap::{Parser, Subcommand};
use smartcache_foundation::CacheSettings;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// smartcache - inspect and maintain the shared tool-output cache
#[derive(Parser, Debug)]
#[command(name = "smartcache")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Store file (overrides config and SMARTCACHE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Entry count, stored bytes and hits
    Stats,
    /// Most frequently hit entries
    Top {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },
    /// Entry metadata without touching its hit count
    Inspect { key: String },
    /// Print a cached value (records a hit)
    Get {
        key: String,
        /// Treat entries older than this many seconds as stale
        #[arg(long)]
        max_age: Option<u64>,
    },
    /// Remove one entry
    Remove { key: String },
    /// Remove every entry
    Clear,
    /// Remove entries created more than SECS seconds ago
    Prune {
        #[arg(long, value_name = "SECS")]
        older_than: u64,
    },
    /// Remove entries whose hard expiry has passed
    PurgeExpired,
    /// Cache and savings summary
    Report {
        /// Session to report on (defaults to SMARTCACHE_SESSION)
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Print the fingerprint of a namespace and its parts
    Key {
        namespace: String,
        parts: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let out = commands::Output { json: args.json };
    let db = args.db;
    let settings = || load_settings(db.clone());

    match args.command {
        Command::Stats => commands::stats(&settings()?, out),
        Command::Top { limit } => commands::top(&settings()?, limit, out),
        Command::Inspect { key } => commands::inspect(&settings()?, &key, out),
        Command::Get { key, max_age } => commands::get(&settings()?, &key, max_age),
        Command::Remove { key } => commands::remove(&settings()?, &key, out),
        Command::Clear => commands::clear(&settings()?, out),
        Command::Prune { older_than } => commands::prune(&settings()?, older_than, out),
        Command::PurgeExpired => commands::purge_expired(&settings()?, out),
        Command::Report { session } => commands::report(&settings()?, session, out),
        Command::Key { namespace, parts } => commands::key(&namespace, &parts, out),
    }
}

/// Config files + env, then `--db`
fn load_settings(db: Option<PathBuf>) -> anyhow::Result<CacheSettings> {
    let mut settings = CacheSettings::load()?;
    apply_db_override(&mut settings, db, &std::env::current_dir()?);
    Ok(settings)
}

/// `--db` wins; otherwise an unconfigured store lives in `./.smartcache/`
/// when the project has one
fn apply_db_override(settings: &mut CacheSettings, db: Option<PathBuf>, cwd: &Path) {
    if let Some(db) = db {
        settings.db_path = Some(db);
    } else if settings.db_path.is_none() {
        let project_db = CacheSettings::project_db_path(cwd);
        if project_db.parent().is_some_and(Path::is_dir) {
            settings.db_path = Some(project_db);
        }
    }
}
