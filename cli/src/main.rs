//! FlowIndex CLI.
//!
//! # Commands
//! ```text
//! flowindex convert to-monthly <native-per-second>
//! flowindex convert to-native  <monthly-amount>
//! flowindex replay  --file <events.jsonl> [--shards N] [--account <addr>]
//! flowindex streams --account <addr> [--type incoming] [--token fDAIx] [--search 0x12]
//! flowindex watch   --account <addr>
//! flowindex index   [--from-block N] [--to-block N]
//! flowindex flow    create|update|delete ...
//! flowindex balance --token fDAIx [--account <addr>]
//! flowindex info
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use flowindex_core::config::RPC_URL_ENV;
use flowindex_core::query::StreamType;
use flowindex_core::{to_monthly_rate, to_native_rate_per_second, FlowIndexConfig};

mod cmd_flow;
mod cmd_index;
mod cmd_replay;
mod cmd_streams;
mod logging;
mod stores;

#[derive(Parser)]
#[command(
    name = "flowindex",
    about = "Index money streams and manage flows from the command line",
    long_about = "
FlowIndex CLI: reconcile FlowUpdated events into stream records, list a
wallet's streams, and create, update or delete flows through the forwarder.

ENVIRONMENT VARIABLES:
  FLOWINDEX_RPC_URL   JSON-RPC endpoint (default http://localhost:8545)
  RUST_LOG            Log filter, overrides --log-level
",
    version
)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// RPC URL (overrides the config file and FLOWINDEX_RPC_URL)
    #[arg(long, global = true)]
    rpc: Option<String>,

    /// SQLite database path or URL (default: in-memory)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long, global = true)]
    log_json: bool,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert between native per-second rates and monthly amounts
    Convert {
        #[command(subcommand)]
        action: ConvertAction,
    },

    /// Reconcile a JSON-lines file of FlowUpdated events
    Replay {
        /// One FlowUpdated object per line
        #[arg(short, long)]
        file: PathBuf,
        /// Number of dispatcher shards
        #[arg(long, default_value_t = 4)]
        shards: usize,
        /// Queue capacity per shard
        #[arg(long, default_value_t = 1024)]
        capacity: usize,
        /// Print this account's streams afterwards
        #[arg(long)]
        account: Option<String>,
    },

    /// List an account's streams
    Streams {
        #[command(flatten)]
        filter: StreamFilterArgs,
        #[arg(long, default_value_t = 0)]
        skip: u32,
        /// Page size (default from config)
        #[arg(long)]
        first: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-list an account's streams every poll interval
    Watch {
        #[command(flatten)]
        filter: StreamFilterArgs,
        /// Seconds between refreshes (default from config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Follow the node's FlowUpdated logs into the store
    Index {
        #[arg(long)]
        from_block: Option<u64>,
        /// Stop after this block
        #[arg(long)]
        to_block: Option<u64>,
        /// Forget the saved checkpoint first
        #[arg(long)]
        reset: bool,
    },

    /// Create, update or delete a flow through the forwarder
    Flow {
        #[command(subcommand)]
        action: cmd_flow::FlowAction,
    },

    /// Token balance of an account
    Balance {
        /// Token symbol or address
        #[arg(long)]
        token: String,
        /// Defaults to the node's first account
        #[arg(long)]
        account: Option<String>,
    },

    /// Show configuration and defaults
    Info,
}

#[derive(Subcommand)]
enum ConvertAction {
    /// Native units per second → monthly amount
    #[command(name = "to-monthly")]
    ToMonthly { rate: String },
    /// Monthly amount → native units per second
    #[command(name = "to-native")]
    ToNative { amount: String },
}

#[derive(clap::Args)]
pub struct StreamFilterArgs {
    /// Account whose streams to list
    #[arg(long)]
    pub account: String,
    /// all | incoming | outgoing | terminated
    #[arg(long = "type", default_value = "all")]
    pub stream_type: StreamType,
    /// Token symbol or address
    #[arg(long)]
    pub token: Option<String>,
    /// Substring of sender, receiver or token
    #[arg(long)]
    pub search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_tracing(&logging::LogConfig {
        level: if cli.verbose { "debug".into() } else { cli.log_level.clone() },
        json: cli.log_json,
        ..Default::default()
    });

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Convert { action } => cmd_convert(action),

        Commands::Replay { file, shards, capacity, account } => {
            cmd_replay::run(&config, &file, shards, capacity, account.as_deref()).await
        }

        Commands::Streams { filter, skip, first, json } => {
            cmd_streams::list(&config, &filter, skip, first, json).await
        }

        Commands::Watch { filter, interval } => cmd_streams::watch(&config, &filter, interval).await,

        Commands::Index { from_block, to_block, reset } => {
            cmd_index::run(config, from_block, to_block, reset).await
        }

        Commands::Flow { action } => cmd_flow::run(&config, action).await,

        Commands::Balance { token, account } => {
            cmd_flow::balance(&config, &token, account.as_deref()).await
        }

        Commands::Info => cmd_info(&config),
    }
}

fn load_config(cli: &Cli) -> Result<FlowIndexConfig> {
    let mut config = match &cli.config {
        Some(path) => FlowIndexConfig::load(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => FlowIndexConfig::from_env(),
    };
    config.load_contracts().context("load contract addresses")?;
    if let Some(rpc) = &cli.rpc {
        config.rpc_url = rpc.clone();
    }
    if let Some(db) = &cli.db {
        config.database_url = Some(db.clone());
    }
    Ok(config)
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_convert(action: ConvertAction) -> Result<()> {
    match action {
        ConvertAction::ToMonthly { rate } => println!("{}", to_monthly_rate(&rate)),
        ConvertAction::ToNative { amount } => {
            let native = to_native_rate_per_second(&amount)
                .with_context(|| format!("convert '{amount}'"))?;
            println!("{native}");
        }
    }
    Ok(())
}

fn cmd_info(config: &FlowIndexConfig) -> Result<()> {
    println!("FlowIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  RPC URL:          {} (env {RPC_URL_ENV})", config.rpc_url);
    println!("  Forwarder:        {}", config.forwarder.as_deref().unwrap_or("-"));
    println!("  Agreement (CFA):  {}", config.cfa.as_deref().unwrap_or("-"));
    println!("  Database:         {}", config.database_url.as_deref().unwrap_or("in-memory"));
    println!("  Poll interval:    {}s", config.poll_interval().as_secs());
    println!("  Page size:        {}", config.page_size);
    println!("  Confirm timeout:  {}s", config.confirmation_timeout().as_secs());
    println!(
        "  Indexer:          id={} chain={} batch={} checkpoint every {} blocks",
        config.indexer.id,
        config.indexer.chain,
        config.indexer.batch_size,
        config.indexer.checkpoint_interval
    );
    println!("  Tokens:");
    if config.tokens.is_empty() {
        println!("    (none)");
    }
    for token in &config.tokens {
        println!("    {:<8} {}", token.symbol, token.address);
    }
    Ok(())
}
