// Copyright (c) 2025 Placard Foundation

//! Linking scanned blocks into a single best chain.
//!
//! `ChainScan` is a per-scan session: blocks from every file feed one
//! session, and `link` consumes it to produce the fork-resolved chain.
//! Blocks live in an arena indexed by hash; parent and child relationships
//! are arena indices, so no block owns another.

use crate::{
    block::{hash_to_hex, BlockHash, BlockHeader, BlockRecord},
    transaction::Transaction,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from chain assembly.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The scan saw no blocks at all.
    #[error("no blocks were scanned; cannot link a chain")]
    Empty,

    /// The linked genesis is not the expected one.
    #[error("genesis mismatch: expected {expected}, linked {found}")]
    GenesisMismatch {
        /// Hash the chain was expected to anchor on, reversed hex.
        expected: String,
        /// Hash the scan actually anchored on, reversed hex.
        found: String,
    },
}

/// One block held by a scan session.
#[derive(Debug, Clone)]
pub struct ChainBlock {
    /// The parsed header.
    pub header: BlockHeader,

    /// The block hash, internal byte order.
    pub hash: BlockHash,

    /// Bulletin-carrying transactions observed in this block.
    pub transactions: Vec<Transaction>,

    /// Longest distance to a leaf of this block's subtree, in blocks,
    /// counting this block itself.
    depth: u64,

    /// Arena index of the child on the chosen (deepest) branch.
    chosen_child: Option<usize>,
}

/// An in-progress block-file scan.
///
/// The first block inserted becomes the genesis anchor for the whole scan;
/// every file of the scan feeds the same session.
#[derive(Debug, Default)]
pub struct ChainScan {
    arena: Vec<ChainBlock>,
    by_hash: HashMap<BlockHash, usize>,
    duplicates: u64,
}

impl ChainScan {
    /// Start an empty scan session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one scanned block. Re-encounters of an already-seen hash are
    /// counted and dropped.
    pub fn insert(&mut self, header: BlockHeader, hash: BlockHash, transactions: Vec<Transaction>) {
        if self.by_hash.contains_key(&hash) {
            self.duplicates += 1;
            return;
        }
        let index = self.arena.len();
        self.arena.push(ChainBlock {
            header,
            hash,
            transactions,
            depth: 1,
            chosen_child: None,
        });
        self.by_hash.insert(hash, index);
    }

    /// Number of distinct blocks inserted so far.
    pub fn block_count(&self) -> usize {
        self.arena.len()
    }

    /// Resolve forks and produce the best chain.
    ///
    /// Blocks are processed in reverse encounter order. Each block bids to
    /// be its parent's chosen child with `candidate = depth(block) + 1`;
    /// the bid wins only if it strictly exceeds the parent's recorded
    /// depth, so deeper branches evict shallower ones. Blocks whose parent
    /// is not in the arena are orphans and drop out of the walk.
    pub fn link(mut self) -> Result<LinkedChain, ChainError> {
        if self.arena.is_empty() {
            return Err(ChainError::Empty);
        }

        // arena[0] is the genesis anchor; it never links to a parent even
        // if its previous hash happens to be present.
        let mut orphans = 0u64;
        for i in (1..self.arena.len()).rev() {
            let prev_hash = self.arena[i].header.prev_hash;
            let candidate = self.arena[i].depth + 1;
            match self.by_hash.get(&prev_hash).copied() {
                Some(parent) => {
                    if self.arena[parent].depth < candidate {
                        self.arena[parent].depth = candidate;
                        self.arena[parent].chosen_child = Some(i);
                    }
                }
                None => orphans += 1,
            }
        }

        let mut order = vec![0];
        let mut current = 0;
        while let Some(next) = self.arena[current].chosen_child {
            order.push(next);
            current = next;
        }

        Ok(LinkedChain {
            arena: self.arena,
            order,
            orphans,
            duplicates: self.duplicates,
        })
    }
}

/// The fork-resolved result of one scan.
pub struct LinkedChain {
    arena: Vec<ChainBlock>,
    /// Arena indices of the best chain, genesis first.
    order: Vec<usize>,
    orphans: u64,
    duplicates: u64,
}

impl LinkedChain {
    /// Chain height: number of blocks above the genesis anchor.
    pub fn height(&self) -> u64 {
        (self.order.len() - 1) as u64
    }

    /// The genesis anchor block.
    pub fn genesis(&self) -> &ChainBlock {
        &self.arena[self.order[0]]
    }

    /// The tip of the best chain.
    pub fn tip(&self) -> &ChainBlock {
        &self.arena[*self.order.last().unwrap()]
    }

    /// Total distinct blocks scanned, including excluded forks.
    pub fn block_count(&self) -> usize {
        self.arena.len()
    }

    /// Blocks whose parent was never scanned.
    pub fn orphans(&self) -> u64 {
        self.orphans
    }

    /// Re-encountered blocks dropped during insertion.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Walk the best chain from genesis to tip with heights attached.
    pub fn best_chain(&self) -> impl Iterator<Item = (u64, &ChainBlock)> {
        self.order
            .iter()
            .enumerate()
            .map(|(height, &index)| (height as u64, &self.arena[index]))
    }

    /// Persistable records for the best chain, genesis first.
    pub fn records(&self) -> Vec<BlockRecord> {
        self.best_chain()
            .map(|(height, block)| BlockRecord {
                hash: block.hash,
                prev_hash: block.header.prev_hash,
                height,
                timestamp: block.header.timestamp,
            })
            .collect()
    }

    /// Check the linked genesis against a pinned hash.
    pub fn require_genesis(&self, expected: &BlockHash) -> Result<(), ChainError> {
        let found = self.genesis().hash;
        if &found != expected {
            return Err(ChainError::GenesisMismatch {
                expected: hash_to_hex(expected),
                found: hash_to_hex(&found),
            });
        }
        Ok(())
    }
}
