//! History Store CLI
//!
//! Command-line interface over a history store root:
//! - Store and read reports
//! - Inspect the catalog
//! - Compute cached trends

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use history_store::cache::{Query, Rate, Timeserie, TrendCache};
use history_store::config::{generate_default_config, Config, LoggingConfig};
use history_store::storage::types::parse_date_str;
use history_store::storage::{HistoryStore, Report};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "history-store")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "File-backed store for timestamped JSON reports")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Storage root (overrides config and HISTORY_STORE_ROOT)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Config file (default: user config dir, /etc, ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store a report
    Put {
        /// Subject id
        subject: String,
        /// Report as a JSON object
        json: String,
    },

    /// Print the full history of a subject
    Get {
        /// Subject id
        subject: String,
    },

    /// Print reports as JSON lines, oldest first
    Stream {
        /// Subject id
        subject: String,
        /// Only reports dated at or after this date
        #[arg(short, long)]
        since: Option<String>,
    },

    /// List catalog entries
    Catalog {
        /// Subject id
        subject: String,
        /// Only entries dated at or after this date
        #[arg(short, long)]
        since: Option<String>,
    },

    /// Compute a trend series over one field
    Trend {
        /// Subject id
        subject: String,
        /// Dotted field path, e.g. status.sessionCount
        path: String,
        /// Per-second rate of change instead of raw values
        #[arg(long)]
        rate: bool,
        /// Query id, names the persisted cache file
        #[arg(long)]
        id: Option<String>,
        /// Skip the persisted cache
        #[arg(long)]
        memory: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Config written to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(root) = &cli.root {
        config.store.root = root.to_string_lossy().to_string();
    }

    init_logging(&config.logging)?;

    let history = HistoryStore::new(config.to_store_config()?)?;

    match cli.command {
        Commands::Put { subject, json } => {
            let value: serde_json::Value =
                serde_json::from_str(&json).context("Report is not valid JSON")?;
            let report = Report::from_value(value)?;
            let path = history.report(&subject)?.put(report).await?;
            println!("{}", path.display());
        }

        Commands::Get { subject } => {
            let reports = history.report(&subject)?.get().await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }

        Commands::Stream { subject, since } => {
            let since = parse_since(since.as_deref())?;
            let store = history.report(&subject)?;
            let mut reports = store.stream(since);
            while let Some(report) = reports.next().await {
                println!("{}", serde_json::to_string(&report?)?);
            }
        }

        Commands::Catalog { subject, since } => {
            let since = parse_since(since.as_deref())?;
            let view = history.report(&subject)?.catalog(since.as_ref()).await?;
            tracing::debug!(total = view.catalog.len(), start = view.start_index, "Catalog");
            println!("{}", serde_json::to_string_pretty(view.entries())?);
        }

        Commands::Trend {
            subject,
            path,
            rate,
            id,
            memory,
        } => {
            let query: Arc<dyn Query> = match (rate, id) {
                (true, Some(id)) => Arc::new(Rate::new(&path)?.with_id(id)),
                (true, None) => Arc::new(Rate::new(&path)?),
                (false, Some(id)) => Arc::new(Timeserie::new(&path)?.with_id(id)),
                (false, None) => Arc::new(Timeserie::new(&path)?),
            };

            let store = history.open(&subject)?;
            let mut cache: Box<dyn TrendCache> = if memory {
                Box::new(store.cache(query, None))
            } else {
                Box::new(store.fs_cache(query)?)
            };
            let update = cache.compute_trends().await;
            history.close(&store)?;

            let update = update?;
            tracing::info!(points = update.trends.len(), changed = update.changed, "Computed trends");
            println!("{}", serde_json::to_string_pretty(update.trends.as_ref())?);
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn parse_since(since: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    since
        .map(|s| parse_date_str(s).with_context(|| format!("Invalid date: {}", s)))
        .transpose()
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("history_store={}", config.level)));

    let writer = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .try_init()?,
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .try_init()?,
    }

    Ok(())
}
