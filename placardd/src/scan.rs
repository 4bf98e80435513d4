// Copyright (c) 2025 Placard Foundation

//! The bulk path: rebuild the index from a directory of block files.
//!
//! Every `blk*.dat` file feeds one chain session; after linking, the best
//! chain's records land in one batch insert and its bulletin-carrying
//! transactions are decoded, attributed and stored. A malformed file or a
//! rejected index write aborts the whole scan; a bulletin that fails to
//! decode or attribute is logged and skipped.

use crate::{
    author::AuthorHandle,
    index::{BulletinIndex, IndexError},
};
use placard_protocol::{
    bulletin, hash_to_hex, BlockFileError, BlockFileReader, BlockHash, Bulletin, ChainBlock,
    ChainError, ChainScan, StandardScripts, Transaction,
};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a bulk scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The block directory held no blk*.dat files.
    #[error("no block files found in {0}")]
    NoBlockFiles(PathBuf),

    /// The block directory could not be read.
    #[error("block directory {path}: {source}")]
    BlockDir {
        /// The directory.
        path: PathBuf,
        /// Underlying failure.
        source: io::Error,
    },

    /// A block file could not be opened.
    #[error("open {path}: {source}")]
    OpenFile {
        /// The file.
        path: PathBuf,
        /// Underlying failure.
        source: io::Error,
    },

    /// A block file failed mid-record.
    #[error("scan {path}: {source}")]
    BlockFile {
        /// The file.
        path: PathBuf,
        /// Underlying failure.
        source: BlockFileError,
    },

    /// Linking produced no usable chain.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The index rejected a write.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// What one bulk scan did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    /// Block files read.
    pub files: usize,

    /// Distinct blocks scanned, forks included.
    pub blocks: usize,

    /// Best-chain height above the genesis anchor.
    pub height: u64,

    /// Blocks excluded for want of a scanned parent.
    pub orphans: u64,

    /// Re-encountered blocks dropped during insertion.
    pub duplicates: u64,

    /// Bulletins stored.
    pub bulletins: usize,

    /// Bulletin candidates skipped over decode or author failures.
    pub skipped: usize,
}

/// The blk*.dat files of `dir`, in name order.
fn block_files(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ScanError::BlockDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ScanError::BlockDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("blk") && name.ends_with(".dat") {
            files.push(entry.path());
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(ScanError::NoBlockFiles(dir.to_path_buf()));
    }
    Ok(files)
}

/// Decode, attribute and store one bulletin candidate from the best chain.
///
/// Returns whether the bulletin was stored; decode and author failures are
/// warned and reported as a skip. Index failures propagate.
fn store_block_bulletin(
    index: &BulletinIndex,
    scripts: &StandardScripts,
    authors: &AuthorHandle,
    block: &ChainBlock,
    tx: &Transaction,
) -> Result<bool, ScanError> {
    let txid = tx.txid();

    let wire = match bulletin::decode_transaction(tx, scripts) {
        Ok(wire) => wire,
        Err(e) => {
            warn!(txid = %hash_to_hex(&txid), error = %e, "bulletin decode failed, skipping");
            return Ok(false);
        }
    };

    let author = match authors.resolve_author(tx) {
        Ok(author) => author,
        Err(e) => {
            warn!(txid = %hash_to_hex(&txid), error = %e, "author resolution failed, skipping");
            return Ok(false);
        }
    };

    let record = Bulletin::from_wire(
        txid,
        Some(block.hash),
        author,
        wire,
        i64::from(block.header.timestamp),
    );
    index.store_bulletin(&record)?;
    Ok(true)
}

/// Scan every block file under `block_dir` and rebuild the index contents.
///
/// The caller is expected to hand over a freshly reset index; records are
/// inserted, never reconciled.
pub fn run_bulk_scan(
    block_dir: &Path,
    index: &mut BulletinIndex,
    scripts: &StandardScripts,
    authors: &AuthorHandle,
    expected_genesis: Option<&BlockHash>,
) -> Result<ScanSummary, ScanError> {
    let files = block_files(block_dir)?;
    info!(files = files.len(), dir = %block_dir.display(), "starting bulk scan");

    let mut chain = ChainScan::new();
    for path in &files {
        let file = File::open(path).map_err(|source| ScanError::OpenFile {
            path: path.clone(),
            source,
        })?;

        let mut records = 0usize;
        for result in BlockFileReader::new(BufReader::new(file)) {
            let raw = result.map_err(|source| ScanError::BlockFile {
                path: path.clone(),
                source,
            })?;
            let relevant: Vec<Transaction> = raw
                .transactions
                .into_iter()
                .filter(|tx| bulletin::is_bulletin(tx, scripts))
                .collect();
            chain.insert(raw.header, raw.hash, relevant);
            records += 1;
        }
        debug!(path = %path.display(), records, "block file scanned");
    }

    let linked = chain.link()?;
    if let Some(expected) = expected_genesis {
        linked.require_genesis(expected)?;
    }
    info!(
        height = linked.height(),
        blocks = linked.block_count(),
        orphans = linked.orphans(),
        duplicates = linked.duplicates(),
        tip = %hash_to_hex(&linked.tip().hash),
        "chain linked"
    );

    index.batch_insert_block_records(&linked.records())?;

    let mut bulletins = 0usize;
    let mut skipped = 0usize;
    for (height, block) in linked.best_chain() {
        // The genesis anchor seeds the walk; it is not scanned for
        // bulletins.
        if height == 0 {
            continue;
        }
        for tx in &block.transactions {
            if store_block_bulletin(index, scripts, authors, block, tx)? {
                bulletins += 1;
            } else {
                skipped += 1;
            }
        }
    }

    info!(bulletins, skipped, "bulk scan complete");
    Ok(ScanSummary {
        files: files.len(),
        blocks: linked.block_count(),
        height: linked.height(),
        orphans: linked.orphans(),
        duplicates: linked.duplicates(),
        bulletins,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        author,
        rpc::{NodeRpc, RpcError},
    };
    use placard_protocol::{
        blockfile::{write_record, TESTNET_MAGIC},
        script::p2pkh_script,
        BlockHeader, OutPoint, TxId, TxInput, TxOutput,
    };
    use std::collections::HashMap;
    use std::io::Write;

    struct MapRpc {
        transactions: HashMap<TxId, Transaction>,
    }

    impl NodeRpc for MapRpc {
        fn block_count(&self) -> Result<u64, RpcError> {
            Ok(0)
        }

        fn raw_transaction(&self, txid: &TxId) -> Result<Transaction, RpcError> {
            self.transactions.get(txid).cloned().ok_or(RpcError::Node {
                code: -5,
                message: "No such transaction".to_string(),
            })
        }
    }

    fn header(prev: BlockHash, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: prev,
            merkle_root: [0u8; 32],
            timestamp: 1_296_688_602 + nonce,
            bits: 0x1d00_ffff,
            nonce,
        }
    }

    fn write_chain(path: &Path, blocks: &[(BlockHeader, Vec<Transaction>)]) {
        let mut file = File::create(path).unwrap();
        for (header, txs) in blocks {
            write_record(&mut file, TESTNET_MAGIC, header, txs).unwrap();
        }
    }

    /// A transaction funded by `funding` output 0 whose outputs hide a
    /// bulletin payload.
    fn bulletin_tx(funding: &Transaction, topic: &str, message: &str) -> Transaction {
        let payload = bulletin::encode(topic, message).unwrap();
        let outputs = bulletin::chunk_payload(&payload)
            .into_iter()
            .map(|c| TxOutput {
                value: 5678,
                script_pubkey: p2pkh_script(&c),
            })
            .collect();
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint {
                    txid: funding.txid(),
                    index: 0,
                },
                script_sig: Vec::new(),
                sequence: u32::MAX,
            }],
            outputs,
            lock_time: 0,
        }
    }

    fn funding_tx(pubkey_hash: [u8; 20]) -> Transaction {
        Transaction {
            version: 1,
            inputs: Vec::new(),
            outputs: vec![TxOutput {
                value: 100_000,
                script_pubkey: p2pkh_script(&pubkey_hash),
            }],
            lock_time: 0,
        }
    }

    fn spawn_authors(
        transactions: Vec<Transaction>,
    ) -> (AuthorHandle, std::thread::JoinHandle<()>) {
        let map = transactions.into_iter().map(|tx| (tx.txid(), tx)).collect();
        author::spawn(
            Box::new(MapRpc { transactions: map }),
            StandardScripts::testnet(),
        )
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = BulletinIndex::open_in_memory().unwrap();
        let (authors, worker) = spawn_authors(Vec::new());

        let missing = dir.path().join("nope");
        assert!(matches!(
            run_bulk_scan(
                &missing,
                &mut index,
                &StandardScripts::testnet(),
                &authors,
                None
            ),
            Err(ScanError::BlockDir { .. })
        ));

        drop(authors);
        worker.join().unwrap();
    }

    #[test]
    fn test_directory_without_block_files_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("peers.dat"), b"not a block file").unwrap();
        let mut index = BulletinIndex::open_in_memory().unwrap();
        let (authors, worker) = spawn_authors(Vec::new());

        assert!(matches!(
            run_bulk_scan(
                dir.path(),
                &mut index,
                &StandardScripts::testnet(),
                &authors,
                None
            ),
            Err(ScanError::NoBlockFiles(_))
        ));

        drop(authors);
        worker.join().unwrap();
    }

    #[test]
    fn test_plain_chain_loads_records() {
        let dir = tempfile::tempdir().unwrap();
        let genesis = header([0; 32], 0);
        let block1 = header(genesis.hash(), 1);
        let block2 = header(block1.hash(), 2);
        write_chain(
            &dir.path().join("blk00000.dat"),
            &[
                (genesis, Vec::new()),
                (block1, Vec::new()),
                (block2, Vec::new()),
            ],
        );

        let mut index = BulletinIndex::open_in_memory().unwrap();
        let (authors, worker) = spawn_authors(Vec::new());
        let summary = run_bulk_scan(
            dir.path(),
            &mut index,
            &StandardScripts::testnet(),
            &authors,
            None,
        )
        .unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(summary.blocks, 3);
        assert_eq!(summary.height, 2);
        assert_eq!(summary.orphans, 0);
        assert_eq!(summary.bulletins, 0);
        assert_eq!(index.current_height().unwrap(), 2);
        assert_eq!(index.chain_tip().unwrap().unwrap().hash, block2.hash());

        drop(authors);
        worker.join().unwrap();
    }

    #[test]
    fn test_truncated_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let genesis = header([0; 32], 0);
        let path = dir.path().join("blk00000.dat");
        write_chain(&path, &[(genesis, Vec::new())]);
        // A record start with no envelope behind it.
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&TESTNET_MAGIC).unwrap();

        let mut index = BulletinIndex::open_in_memory().unwrap();
        let (authors, worker) = spawn_authors(Vec::new());
        assert!(matches!(
            run_bulk_scan(
                dir.path(),
                &mut index,
                &StandardScripts::testnet(),
                &authors,
                None
            ),
            Err(ScanError::BlockFile { .. })
        ));

        drop(authors);
        worker.join().unwrap();
    }

    #[test]
    fn test_genesis_pin_mismatch_aborts_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let genesis = header([0; 32], 0);
        write_chain(&dir.path().join("blk00000.dat"), &[(genesis, Vec::new())]);

        let mut index = BulletinIndex::open_in_memory().unwrap();
        let (authors, worker) = spawn_authors(Vec::new());
        let pinned = [9u8; 32];
        assert!(matches!(
            run_bulk_scan(
                dir.path(),
                &mut index,
                &StandardScripts::testnet(),
                &authors,
                Some(&pinned)
            ),
            Err(ScanError::Chain(ChainError::GenesisMismatch { .. }))
        ));
        assert_eq!(index.current_height().unwrap(), 0);

        drop(authors);
        worker.join().unwrap();
    }

    #[test]
    fn test_bulletin_stored_with_author_and_block() {
        let dir = tempfile::tempdir().unwrap();
        let funding = funding_tx([7u8; 20]);
        let carrier = bulletin_tx(&funding, "rust", "hello from the chain");

        let genesis = header([0; 32], 0);
        let block1 = header(genesis.hash(), 1);
        write_chain(
            &dir.path().join("blk00000.dat"),
            &[(genesis, Vec::new()), (block1, vec![carrier.clone()])],
        );

        let mut index = BulletinIndex::open_in_memory().unwrap();
        let (authors, worker) = spawn_authors(vec![funding]);
        let summary = run_bulk_scan(
            dir.path(),
            &mut index,
            &StandardScripts::testnet(),
            &authors,
            None,
        )
        .unwrap();

        assert_eq!(summary.bulletins, 1);
        assert_eq!(summary.skipped, 0);

        let stored = index.bulletins_for_board("rust").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].txid, carrier.txid());
        assert_eq!(stored[0].block, Some(block1.hash()));
        assert_eq!(stored[0].message, "hello from the chain");
        assert_eq!(
            stored[0].author,
            StandardScripts::testnet().p2pkh_address(&[7u8; 20])
        );
        assert_eq!(stored[0].timestamp, i64::from(block1.timestamp));

        drop(authors);
        worker.join().unwrap();
    }

    #[test]
    fn test_unresolvable_author_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let funding = funding_tx([7u8; 20]);
        let carrier = bulletin_tx(&funding, "rust", "orphaned funding");

        let genesis = header([0; 32], 0);
        let block1 = header(genesis.hash(), 1);
        write_chain(
            &dir.path().join("blk00000.dat"),
            &[(genesis, Vec::new()), (block1, vec![carrier])],
        );

        let mut index = BulletinIndex::open_in_memory().unwrap();
        // The worker knows no transactions, so attribution fails.
        let (authors, worker) = spawn_authors(Vec::new());
        let summary = run_bulk_scan(
            dir.path(),
            &mut index,
            &StandardScripts::testnet(),
            &authors,
            None,
        )
        .unwrap();

        assert_eq!(summary.bulletins, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(index.bulletin_count().unwrap(), 0);
        assert_eq!(index.current_height().unwrap(), 1);

        drop(authors);
        worker.join().unwrap();
    }
}
