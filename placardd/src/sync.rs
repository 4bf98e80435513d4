// Copyright (c) 2025 Placard Foundation

//! The live path: keep the index current from the node's stream.
//!
//! The network collaborator delivers one parsed block or transaction at a
//! time; deliveries must be serialized before they reach these handlers.
//! A block whose parent is already indexed extends the chain record; a
//! block without one marks a gap (reorg or catch-up), answered with a
//! locator backfill request and a direct re-request of both blocks.
//! Nothing on this path aborts the daemon; failures are logged and the
//! stream continues.

use crate::{author::AuthorHandle, index::BulletinIndex};
use placard_protocol::{
    bulletin, hash_to_hex, BlockHash, BlockRecord, Bulletin, RawBlock, StandardScripts,
    Transaction,
};
use std::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Protocol messages the reconciler asks the network collaborator to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Ask a peer for the blocks after the locator's common point.
    GetBlocks {
        /// Sparse walk of the indexed chain, tip first.
        locator: Vec<BlockHash>,
        /// All-zero: as many blocks as the peer will give.
        stop_hash: BlockHash,
    },

    /// Re-request specific blocks directly.
    GetData {
        /// Block hashes wanted.
        blocks: Vec<BlockHash>,
    },
}

/// Unix seconds, 0 if the clock is before the epoch.
fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Applies the live block and transaction stream to the index.
pub struct Reconciler {
    index: BulletinIndex,
    scripts: StandardScripts,
    authors: AuthorHandle,
    outbound: mpsc::Sender<OutboundMessage>,
}

impl Reconciler {
    /// Build a reconciler over an index that the bulk path has finished
    /// with.
    pub fn new(
        index: BulletinIndex,
        scripts: StandardScripts,
        authors: AuthorHandle,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self {
            index,
            scripts,
            authors,
            outbound,
        }
    }

    /// Read access to the underlying index.
    pub fn index(&self) -> &BulletinIndex {
        &self.index
    }

    /// Handle one observed block.
    ///
    /// The record keeps the header timestamp; `now` is the observation
    /// time reported by the collaborator.
    pub fn on_block(&mut self, now: i64, block: &RawBlock) {
        debug!(hash = %hash_to_hex(&block.hash), now, "block observed");

        let parent = match self.index.block_record(&block.header.prev_hash) {
            Ok(parent) => parent,
            Err(e) => {
                error!(hash = %hash_to_hex(&block.hash), error = %e, "parent lookup failed");
                return;
            }
        };
        let parent = match parent {
            Some(parent) => parent,
            None => {
                self.request_backfill(block);
                return;
            }
        };

        let record = BlockRecord {
            hash: block.hash,
            prev_hash: parent.hash,
            height: parent.height + 1,
            timestamp: block.header.timestamp,
        };
        match self.index.store_block_record(&record) {
            Ok(()) => {
                info!(height = record.height, hash = %hash_to_hex(&record.hash), "stored block")
            }
            Err(e) => {
                error!(hash = %hash_to_hex(&record.hash), error = %e, "block record rejected")
            }
        }
    }

    /// Handle one observed transaction, confirmed or not.
    pub fn on_transaction(&mut self, tx: &Transaction, block: Option<BlockHash>) {
        if !bulletin::is_bulletin(tx, &self.scripts) {
            return;
        }
        let txid = tx.txid();

        let wire = match bulletin::decode_transaction(tx, &self.scripts) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(txid = %hash_to_hex(&txid), error = %e, "bulletin decode failed, skipping");
                return;
            }
        };
        let author = match self.authors.resolve_author(tx) {
            Ok(author) => author,
            Err(e) => {
                warn!(txid = %hash_to_hex(&txid), error = %e, "author resolution failed, skipping");
                return;
            }
        };

        let record = Bulletin::from_wire(txid, block, author, wire, unix_now());
        match self.index.store_bulletin(&record) {
            Ok(()) => {
                info!(
                    txid = %hash_to_hex(&txid),
                    board = %record.board,
                    confirmed = block.is_some(),
                    "stored bulletin"
                )
            }
            Err(e) => error!(txid = %hash_to_hex(&txid), error = %e, "bulletin store failed"),
        }
    }

    /// The parent is missing: ask for the gap behind a locator and
    /// re-request both the parent and the block itself. The block is not
    /// persisted; it comes back once the gap is filled.
    fn request_backfill(&self, block: &RawBlock) {
        info!(
            hash = %hash_to_hex(&block.hash),
            parent = %hash_to_hex(&block.header.prev_hash),
            "parent not indexed, requesting backfill"
        );

        let locator = match self.index.block_locator() {
            Ok(locator) => locator,
            Err(e) => {
                error!(error = %e, "locator build failed");
                return;
            }
        };

        self.send(OutboundMessage::GetBlocks {
            locator,
            stop_hash: [0u8; 32],
        });
        self.send(OutboundMessage::GetData {
            blocks: vec![block.header.prev_hash, block.hash],
        });
    }

    fn send(&self, message: OutboundMessage) {
        if self.outbound.send(message).is_err() {
            error!("outbound channel closed, message dropped");
        }
    }
}
