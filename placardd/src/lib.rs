// Copyright (c) 2025 Placard Foundation

//! The placard daemon.
//!
//! `placardd` keeps a queryable index of every bulletin published on the
//! public chain. This library provides:
//!
//! - A bulk scan that reads a node's block files from disk, assembles the
//!   best chain and fills the index in one pass
//! - A live reconciler that keeps the index current from the node's block
//!   and transaction stream
//! - Author attribution through the node's JSON-RPC interface
//!
//! # Architecture
//!
//! The daemon never validates consensus rules itself. It trusts the node
//! it sits next to: block files and streamed blocks come from the node,
//! and funding transactions are fetched back from it over RPC when a
//! bulletin's author is resolved. The index is a SQLite database that can
//! be rebuilt from the block files at any time.

pub mod author;
pub mod config;
pub mod index;
pub mod rpc;
pub mod scan;
pub mod sync;

pub use author::{AuthorError, AuthorHandle};
pub use config::{Config, Network};
pub use index::{BulletinIndex, IndexError};
pub use rpc::{JsonRpcClient, NodeRpc, RpcError};
pub use scan::{run_bulk_scan, ScanError, ScanSummary};
pub use sync::{OutboundMessage, Reconciler};
