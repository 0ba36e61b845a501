use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tally_core::TallyConfig;

mod commands;

/// Categorize statement transactions and convert amounts between currencies.
#[derive(Parser)]
#[command(name = "tally", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(long, env = "TALLY_CONFIG", default_value = "tally.toml", global = true)]
    pub config: PathBuf,

    /// Database path, overriding `[storage] database`
    #[arg(long, env = "TALLY_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Categorize and store a JSON array of extracted transactions
    Import {
        file: PathBuf,
        #[arg(long)]
        user: i64,
        /// Currency code applied to records without their own currency
        #[arg(long)]
        currency: String,
    },
    /// Learn user merchant patterns from a JSON array of corrections
    Learn {
        file: PathBuf,
        #[arg(long)]
        user: i64,
    },
    /// Convert an amount using the rate for a given day
    Convert {
        amount: String,
        from: String,
        to: String,
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Fetch today's rates from the refresh base currency to every known currency
    RefreshRates,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = TallyConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let db_path = database_path(cli.db.as_deref(), &config)?;
    tracing::debug!(db = %db_path.display(), "Using database");

    let output = match cli.command {
        Command::Import { file, user, currency } => {
            let report = commands::cmd_import(&db_path, &config, &file, user, &currency).await?;
            serde_json::to_string_pretty(&report)?
        }
        Command::Learn { file, user } => {
            let report = commands::cmd_learn(&db_path, &config, &file, user).await?;
            serde_json::to_string_pretty(&report)?
        }
        Command::Convert { amount, from, to, date } => {
            let converted =
                commands::cmd_convert(&db_path, &config, &amount, &from, &to, date.as_deref())
                    .await?;
            serde_json::to_string_pretty(&converted)?
        }
        Command::RefreshRates => {
            let report = commands::cmd_refresh_rates(&db_path, &config).await?;
            serde_json::to_string_pretty(&report)?
        }
    };
    println!("{output}");
    Ok(())
}

/// An explicit `--db` wins. A relative configured path lands in the user data directory.
fn database_path(flag: Option<&Path>, config: &TallyConfig) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }
    let configured = &config.storage.database;
    if configured.is_absolute() {
        return Ok(configured.clone());
    }
    let project_dirs = directories::ProjectDirs::from("com", "tally", "Tally")
        .context("Failed to get app directory")?;
    let data_dir = project_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    Ok(data_dir.join(configured))
}
