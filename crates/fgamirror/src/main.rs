//! fgamirror: local mirror and deletion manager for an OpenFGA store.
//!
//! Subcommands:
//! - `run`: tail the change feed, reconcile deletions, optionally prune
//! - `sync-once`, `sweep`, `prune`: single passes of the background loops
//! - `list`, `types`: browse the mirror
//! - `mark`, `create`: operator mutations

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use fgamirror_api::FgaClient;
use fgamirror_store::{Filter, MirrorStore, SourceId};
use fgamirror_sync::SyncConfig;
use miette::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod daemon;

const DEFAULT_LOG_FILTER: &str = "fgamirror=info,fgamirror_sync=info";

#[derive(Parser)]
#[command(name = "fgamirror")]
#[command(about = "Mirror an OpenFGA store locally and manage tuple deletions", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "FGAMIRROR_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// OpenFGA API URL
    #[arg(long, env = "FGA_API_URL", default_value = "http://localhost:8087")]
    api_url: String,

    /// Store to mirror
    #[arg(long, env = "FGA_STORE_ID")]
    store_id: String,

    /// Bearer token for the API
    #[arg(long, env = "FGA_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Mirror database path (defaults to the platform data directory)
    #[arg(long, env = "FGAMIRROR_DB")]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the change mirror and deletion reconciler until Ctrl-C
    Run {
        /// Seconds between change feed polls
        #[arg(long, default_value = "2", value_parser = clap::value_parser!(u64).range(1..))]
        mirror_interval: u64,

        /// Changes requested per feed page
        #[arg(long, default_value = "50", value_parser = clap::value_parser!(u32).range(1..))]
        page_size: u32,

        /// Seconds between deletion sweeps
        #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
        sweep_interval: u64,

        /// Marked tuples attempted per sweep
        #[arg(long, default_value = "10", value_parser = batch_size)]
        sweep_batch: usize,

        /// Prune stale tuples every N seconds (disabled when unset)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        prune_interval: Option<u64>,
    },

    /// Fetch and apply one page of the change feed
    SyncOnce {
        /// Changes requested per feed page
        #[arg(long, default_value = "50", value_parser = clap::value_parser!(u32).range(1..))]
        page_size: u32,
    },

    /// Print one page of mirrored tuples, newest first
    List {
        /// Rows to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Substring of "user relation object" (ignored when 3 characters or fewer)
        #[arg(long)]
        search: Option<String>,

        /// Exact user type
        #[arg(long)]
        user_type: Option<String>,

        /// Exact relation
        #[arg(long)]
        relation: Option<String>,

        /// Exact object type
        #[arg(long)]
        object_type: Option<String>,
    },

    /// Print the distinct user types, relations and object types
    Types,

    /// Mark a mirrored tuple for deletion
    Mark {
        user: String,
        relation: String,
        object: String,
    },

    /// Write a tuple given as "user relation object"
    Create { tuple: String },

    /// Attempt remote deletion of marked tuples once
    Sweep {
        /// Marked tuples attempted
        #[arg(long, default_value = "10", value_parser = batch_size)]
        sweep_batch: usize,
    },

    /// Remove stale tuples from the mirror
    Prune,
}

fn batch_size(value: &str) -> std::result::Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Shared handles built from the connection arguments.
pub(crate) struct Context {
    pub client: Arc<FgaClient>,
    pub store: Arc<MirrorStore>,
    pub source: SourceId,
}

impl ConnectionArgs {
    fn connect(&self) -> Result<Context> {
        let mut client = FgaClient::new(&self.api_url, &self.store_id)
            .map_err(|e| miette::miette!("failed to create API client: {}", e))?;
        if let Some(ref token) = self.api_token {
            client = client.with_token(token);
        }

        let db_path = self.db.clone().unwrap_or_else(default_db_path);
        let store = MirrorStore::open(&db_path).map_err(|e| {
            miette::miette!("failed to open mirror at {}: {}", db_path.display(), e)
        })?;

        let source = SourceId::new(client.api_url(), client.store_id());
        info!(source = %source, db = %db_path.display(), "connected");

        Ok(Context {
            client: Arc::new(client),
            store: Arc::new(store),
            source,
        })
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fgamirror")
        .join("fga.db")
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
    );

    let (stderr_layer, file_layer) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| miette::miette!("failed to open log file {}: {}", path.display(), e))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let ctx = cli.connection.connect()?;

    match cli.command {
        Commands::Run {
            mirror_interval,
            page_size,
            sweep_interval,
            sweep_batch,
            prune_interval,
        } => {
            let config = SyncConfig {
                mirror_interval: Duration::from_secs(mirror_interval),
                mirror_error_delay: Duration::from_secs(mirror_interval),
                page_size,
                sweep_interval: Duration::from_secs(sweep_interval),
                sweep_batch,
                prune_interval: prune_interval.map(Duration::from_secs),
                ..SyncConfig::default()
            };
            daemon::run(ctx, config).await
        }

        Commands::SyncOnce { page_size } => {
            let config = SyncConfig {
                page_size,
                ..SyncConfig::default()
            };
            commands::sync_once(&ctx, config).await
        }

        Commands::List {
            offset,
            search,
            user_type,
            relation,
            object_type,
        } => {
            let filter = Filter {
                search,
                user_type,
                relation,
                object_type,
            };
            commands::list(&ctx, offset, &filter)
        }

        Commands::Types => commands::types(&ctx),

        Commands::Mark {
            user,
            relation,
            object,
        } => commands::mark(&ctx, &user, &relation, &object),

        Commands::Create { tuple } => commands::create(&ctx, &tuple).await,

        Commands::Sweep { sweep_batch } => {
            let config = SyncConfig {
                sweep_batch,
                ..SyncConfig::default()
            };
            commands::sweep(&ctx, config).await
        }

        Commands::Prune => commands::prune(&ctx),
    }
}
