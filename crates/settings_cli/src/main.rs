//! Command-line front end for the settings store.
//!
//! # Responsibility
//! - Act as the composition root: load configuration, open the database and
//!   build the one shared `SettingsService` for the process.
//! - Map sub-commands onto the scoped settings API and print JSON results.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use settings_core::db::open_db;
use settings_core::{
    config, core_version, default_log_level, init_logging, setting_or_default, FixedPrincipal,
    LogTarget, MemoryCache, Owner, ScopedSettings, SettingValue, SettingsService,
    SqliteEntryRepository, Trashed,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "settings", version, about = "Grouped, owner-scoped settings store")]
struct Cli {
    /// SQLite database file.
    #[arg(long, default_value = "settings.db")]
    db: PathBuf,

    /// Explicit configuration file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Active group; repeat to select several groups.
    #[arg(long = "group", short = 'g')]
    groups: Vec<String>,

    /// Scope to an owner, as `TYPE:ID`.
    #[arg(long, value_parser = parse_owner)]
    owner: Option<Owner>,

    /// Principal used by `--user` and `my`, as `TYPE:ID`.
    #[arg(long, value_parser = parse_owner)]
    principal: Option<Owner>,

    /// Scope to the principal.
    #[arg(long, conflicts_with = "owner")]
    user: bool,

    #[arg(long)]
    log_level: Option<String>,

    /// Write rotated log files here instead of stderr.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print one value, or the default when absent.
    Get {
        key: String,
        #[arg(long)]
        default: Option<String>,
    },
    /// Print one value of the principal's scope.
    My {
        key: String,
        #[arg(long)]
        default: Option<String>,
    },
    /// Write one value (JSON, or a plain string).
    Set { key: String, value: String },
    /// Write several `KEY=VALUE` pairs.
    SetMany {
        #[arg(required = true, value_parser = parse_pair)]
        pairs: Vec<(String, String)>,
    },
    /// Print every value of the scope.
    All,
    Has { key: String },
    Missing { key: String },
    /// Print the stored value if truthy, otherwise store the default.
    Remember { key: String, default: String },
    Trash { key: String },
    Restore { key: String },
    /// Permanently remove a trashed key.
    Delete { key: String },
    /// List entries with metadata.
    Entries {
        /// Include trashed entries.
        #[arg(long, conflicts_with = "only_trashed")]
        with_trashed: bool,
        #[arg(long)]
        only_trashed: bool,
    },
    Flush,
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    let target = match &cli.log_dir {
        Some(dir) => LogTarget::Directory(absolute(dir)?),
        None => LogTarget::Stderr,
    };
    init_logging(&level, target).context("failed to initialize logging")?;

    if matches!(cli.command, Command::Version) {
        println!("{}", core_version());
        return Ok(());
    }

    let config = config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let conn = open_db(&cli.db, &config.schema)
        .with_context(|| format!("failed to open database `{}`", cli.db.display()))?;
    let repo = SqliteEntryRepository::try_new(&conn, &config.schema)?;
    let cache = MemoryCache::new(config.cache.capacity);
    let service = SettingsService::new(repo, cache, config)
        .with_principal_provider(FixedPrincipal(cli.principal.clone()));

    let mut scoped = service.scope();
    if !cli.groups.is_empty() {
        scoped = scoped.groups(cli.groups.iter().cloned());
    }
    if let Some(owner) = cli.owner.clone() {
        scoped = scoped.for_owner(owner);
    }
    if cli.user {
        scoped = scoped.user();
    }

    info!(
        "event=cli_command module=cli status=start groups={} owner_scoped={}",
        scoped.scope().groups().len(),
        scoped.scope().owner().is_some()
    );
    run(&scoped, cli.command)
}

fn run(
    scoped: &ScopedSettings<'_, SqliteEntryRepository<'_>, MemoryCache>,
    command: Command,
) -> Result<()> {
    match command {
        Command::Get { key, default } => {
            let default = default.as_deref().map_or(SettingValue::Null, parse_value);
            print_json(&setting_or_default(scoped, &key, default))
        }
        Command::My { key, default } => {
            let default = default.as_deref().map_or(SettingValue::Null, parse_value);
            print_json(&scoped.my(&key, default)?)
        }
        Command::Set { key, value } => print_json(&scoped.set(&key, parse_value(&value))?),
        Command::SetMany { pairs } => {
            let pairs = pairs
                .into_iter()
                .map(|(key, value)| (key, parse_value(&value)));
            print_json(&scoped.set_many(pairs)?)
        }
        Command::All => print_json(&scoped.all()?),
        Command::Has { key } => print_json(&scoped.has(&key)?),
        Command::Missing { key } => print_json(&scoped.missing(&key)?),
        Command::Remember { key, default } => {
            print_json(&scoped.remember(&key, parse_value(&default))?)
        }
        Command::Trash { key } => print_json(&scoped.trash(&key)?),
        Command::Restore { key } => print_json(&scoped.restore(&key)?),
        Command::Delete { key } => print_json(&scoped.delete(&key)?),
        Command::Entries {
            with_trashed,
            only_trashed,
        } => {
            let trashed = if only_trashed {
                Trashed::Only
            } else if with_trashed {
                Trashed::With
            } else {
                Trashed::Without
            };
            print_json(&scoped.entries(trashed)?)
        }
        Command::Flush => print_json(&scoped.flush()?),
        Command::Version => {
            println!("{}", core_version());
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parses JSON input, treating anything that is not JSON as a plain string.
fn parse_value(raw: &str) -> SettingValue {
    serde_json::from_str(raw).unwrap_or_else(|_| SettingValue::String(raw.to_string()))
}

fn parse_owner(raw: &str) -> Result<Owner, String> {
    Owner::parse(raw).ok_or_else(|| format!("expected TYPE:ID, got `{raw}`"))
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|err| anyhow!("cannot resolve cwd: {err}"))?;
    Ok(cwd.join(path))
}
