// Copyright (c) 2025 Placard Foundation

//! Daemon configuration.

use placard_protocol::{hash_from_hex, BlockHash, StandardScripts};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which chain the daemon indexes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// The production chain
    Mainnet,
    /// The test chain
    #[default]
    Testnet,
}

impl Network {
    /// Script decoder carrying the network's address version byte.
    pub fn scripts(&self) -> StandardScripts {
        match self {
            Network::Mainnet => StandardScripts::mainnet(),
            Network::Testnet => StandardScripts::testnet(),
        }
    }
}

/// RPC endpoint of the node the daemon sits next to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// JSON-RPC URL
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Basic-auth user
    #[serde(default)]
    pub rpc_user: String,

    /// Basic-auth password
    pub rpc_password: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            rpc_user: String::new(),
            rpc_password: None,
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the node's blk*.dat files
    #[serde(default = "default_block_dir")]
    pub block_dir: PathBuf,

    /// Path of the index database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Chain to index
    #[serde(default)]
    pub network: Network,

    /// Blocks the index may trail the node before `scan` rebuilds it
    #[serde(default = "default_rebuild_lag")]
    pub rebuild_lag: u64,

    /// Pinned genesis hash (byte-reversed hex); a mismatch after linking
    /// aborts the scan. Unset accepts whichever chain the block files carry.
    pub expected_genesis: Option<String>,

    /// Node RPC endpoint
    #[serde(default)]
    pub node: NodeConfig,
}

fn default_block_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bitcoin")
        .join("testnet3")
        .join("blocks")
}

fn default_db_path() -> PathBuf {
    data_dir().join("pubrecord.db")
}

fn default_rebuild_lag() -> u64 {
    499
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:18332".to_string()
}

/// The daemon's data directory (`~/.placard`).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".placard")
}

/// Default location of the config file (`~/.placard/placard.toml`).
pub fn default_config_path() -> PathBuf {
    data_dir().join("placard.toml")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_dir: default_block_dir(),
            db_path: default_db_path(),
            network: Network::default(),
            rebuild_lag: default_rebuild_lag(),
            expected_genesis: None,
            node: NodeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.block_dir.as_os_str().is_empty() {
            anyhow::bail!("block_dir must not be empty");
        }
        if self.db_path.as_os_str().is_empty() {
            anyhow::bail!("db_path must not be empty");
        }
        if !self.node.rpc_url.starts_with("http://") && !self.node.rpc_url.starts_with("https://") {
            anyhow::bail!(
                "node.rpc_url must be an http(s) URL, got {:?}",
                self.node.rpc_url
            );
        }
        if let Some(genesis) = &self.expected_genesis {
            hash_from_hex(genesis)
                .map_err(|e| anyhow::anyhow!("expected_genesis is not a block hash: {}", e))?;
        }
        Ok(())
    }

    /// Parsed form of `expected_genesis`.
    pub fn expected_genesis_hash(&self) -> anyhow::Result<Option<BlockHash>> {
        match &self.expected_genesis {
            Some(genesis) => {
                let hash = hash_from_hex(genesis)
                    .map_err(|e| anyhow::anyhow!("expected_genesis is not a block hash: {}", e))?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    /// A commented config file with every field at its default.
    pub fn template() -> String {
        let defaults = Config::default();
        format!(
            r#"# placardd configuration

# Directory holding the node's blk*.dat block files.
block_dir = {block_dir:?}

# Where the bulletin index lives. Dropped and rebuilt by a full scan.
db_path = {db_path:?}

# Chain to index: "mainnet" or "testnet". The block_dir above must match.
network = "testnet"

# Blocks the index may trail the node before `scan` rebuilds it.
rebuild_lag = {rebuild_lag}

# Pin the chain's genesis hash (byte-reversed hex). A mismatch after
# linking aborts the scan. Leave unset to accept whichever chain the
# block files carry.
#expected_genesis = ""

[node]
# JSON-RPC endpoint of the node, with basic-auth credentials.
rpc_url = {rpc_url:?}
rpc_user = ""
#rpc_password = ""
"#,
            block_dir = defaults.block_dir,
            db_path = defaults.db_path,
            rebuild_lag = defaults.rebuild_lag,
            rpc_url = defaults.node.rpc_url,
        )
    }
}
