//! gramsevak command line: manage the interception cache's stores.
//!
//! Logs go to stderr; command output goes to stdout.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gramsevak_client::fetch::resolve;
use gramsevak_client::{CacheSettings, FetchClient, FetchConfig, InterceptCache};
use gramsevak_core::{AppConfig, CacheDb, CacheStorage, RequestDescriptor};

#[derive(Parser, Debug)]
#[command(name = "gramsevak")]
#[command(about = "Offline cache for the gramsevak question-answer app")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (default: $GRAMSEVAK_CONFIG_FILE)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Fetch every manifest asset into the static store.
    Install,
    /// Delete every store that is not current.
    Activate,
    /// List stores with their entry counts.
    Stores,
    /// List the entries of one store.
    Entries { store: String },
    /// Print a stored response. Relative URLs resolve against the origin.
    Show { store: String, url: String },
    /// Delete a store.
    Delete { store: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_with_file(Some(path)),
        None => AppConfig::load(),
    }
    .context("loading configuration")?;

    let storage = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;

    let mut out = io::stdout().lock();
    match cli.command {
        Command::Install | Command::Activate => lifecycle(storage, &config, &cli.command, &mut out).await,
        command => inspect(&storage, &config, command, &mut out).await,
    }
}

/// Run an install or activate step against the real network.
async fn lifecycle(storage: CacheDb, config: &AppConfig, command: &Command, out: &mut impl Write) -> Result<()> {
    let network = FetchClient::new(FetchConfig::from(config))?;
    let cache = InterceptCache::new(storage, network, CacheSettings::from_config(config)?);

    if *command == Command::Install {
        let report = cache.install().await?;
        writeln!(out, "installed {} assets into {}", report.cached, report.store)?;
    } else {
        let report = cache.activate().await?;
        if report.deleted.is_empty() {
            writeln!(out, "no stale stores")?;
        }
        for name in report.deleted {
            writeln!(out, "deleted {name}")?;
        }
    }
    Ok(())
}

/// Read-only and maintenance commands that never touch the network.
async fn inspect<S: CacheStorage>(storage: &S, config: &AppConfig, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Stores => {
            let current = config.current_stores();
            for name in storage.list_names().await? {
                let marker = if current.contains(&name.as_str()) { "*" } else { " " };
                writeln!(out, "{marker} {name}\t{}", storage.count(&name).await?)?;
            }
        }
        Command::Entries { store } => {
            for entry in storage.entries(&store).await? {
                writeln!(
                    out,
                    "{} {} {}\t{} bytes\t{}",
                    entry.response.status,
                    entry.method,
                    entry.url,
                    entry.response.body.len(),
                    entry.stored_at
                )?;
            }
        }
        Command::Show { store, url } => {
            let url = resolve(&config.origin, &url)?;
            let request = RequestDescriptor::get(url.clone());
            let response = storage
                .get(&store, &request)
                .await?
                .with_context(|| format!("{url} is not stored in {store}"))?;
            writeln!(out, "status: {}", response.status)?;
            for (name, value) in &response.headers {
                writeln!(out, "{name}: {value}")?;
            }
            writeln!(out)?;
            writeln!(out, "{}", String::from_utf8_lossy(&response.body))?;
        }
        Command::Delete { store } => {
            if storage.delete(&store).await? {
                writeln!(out, "deleted {store}")?;
            } else {
                writeln!(out, "no store named {store}")?;
            }
        }
        Command::Install | Command::Activate => anyhow::bail!("{command:?} needs the network"),
    }
    Ok(())
}
