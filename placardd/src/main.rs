// Copyright (c) 2025 Placard Foundation

//! Placard daemon CLI
//!
//! Builds and serves a queryable index of the bulletins hidden in the
//! public chain's block files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use placard_protocol::hash_to_hex;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use placardd::{author, config, run_bulk_scan, BulletinIndex, Config, JsonRpcClient, NodeRpc};

#[derive(Parser)]
#[command(name = "placardd")]
#[command(about = "Bulletin index daemon for the public chain")]
#[command(version)]
struct Cli {
    /// Path to configuration file (default: ~/.placard/placard.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Scan the node's block files and rebuild the index if it is stale
    Scan {
        /// Rebuild even if the index looks current
        #[arg(long)]
        rebuild: bool,
    },

    /// Show index status
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    let config_path = cli.config.unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Init { force } => init_config(&config_path, force),
        Commands::Scan { rebuild } => {
            let config = load_config(&config_path)?;
            run_scan(&config, rebuild)
        }
        Commands::Status => {
            let config = load_config(&config_path)?;
            show_status(&config)
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| {
        format!(
            "failed to load config from {:?} (run `placardd init` to create one)",
            path
        )
    })
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "config already exists at {:?}; pass --force to overwrite",
            path
        );
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {:?}", dir))?;
    }
    std::fs::write(path, Config::template())
        .with_context(|| format!("failed to write {:?}", path))?;

    println!("Wrote {}", path.display());
    println!();
    println!("Edit the [node] section to match your node's RPC settings, then run:");
    println!("  placardd scan");

    Ok(())
}

fn run_scan(config: &Config, rebuild: bool) -> Result<()> {
    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {:?}", dir))?;
    }
    let mut index = BulletinIndex::open(&config.db_path)
        .with_context(|| format!("failed to open index at {:?}", config.db_path))?;

    let client = JsonRpcClient::new(
        &config.node.rpc_url,
        &config.node.rpc_user,
        config.node.rpc_password.as_deref(),
    )
    .context("failed to build RPC client")?;

    let node_height = client
        .block_count()
        .with_context(|| format!("node unreachable at {}", config.node.rpc_url))?;
    let current = index.current_height()?;

    // The index trails the node during normal operation; only rebuild
    // once it has fallen further behind than the configured lag.
    if !rebuild && current + config.rebuild_lag >= node_height {
        tracing::info!(current, node_height, "index is current");
        println!(
            "Index is current at height {} (node at {}).",
            current, node_height
        );
        return Ok(());
    }

    tracing::info!(current, node_height, "index is stale, rebuilding");
    index.reset()?;

    let scripts = config.network.scripts();
    let expected = config.expected_genesis_hash()?;
    let (authors, worker) = author::spawn(Box::new(client), scripts);

    let summary = run_bulk_scan(
        &config.block_dir,
        &mut index,
        &scripts,
        &authors,
        expected.as_ref(),
    )?;

    drop(authors);
    if worker.join().is_err() {
        anyhow::bail!("author worker panicked");
    }

    println!(
        "Scanned {} blocks from {} block files.",
        summary.blocks, summary.files
    );
    println!("  Height: {}", summary.height);
    println!(
        "  Bulletins: {} stored, {} skipped",
        summary.bulletins, summary.skipped
    );
    if summary.orphans > 0 || summary.duplicates > 0 {
        println!(
            "  Excluded: {} orphans, {} duplicates",
            summary.orphans, summary.duplicates
        );
    }

    Ok(())
}

fn show_status(config: &Config) -> Result<()> {
    let index = BulletinIndex::open(&config.db_path)
        .with_context(|| format!("failed to open index at {:?}", config.db_path))?;

    let tip = index.chain_tip()?;
    let bulletins = index.bulletin_count()?;

    println!("Index: {}", config.db_path.display());
    match tip {
        Some(tip) => {
            println!("  Height: {}", tip.height);
            println!("  Tip: {}", hash_to_hex(&tip.hash));
        }
        None => println!("  Height: 0 (no blocks indexed)"),
    }
    println!("  Bulletins: {}", bulletins);

    Ok(())
}
