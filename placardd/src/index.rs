// Copyright (c) 2025 Placard Foundation

//! The persisted bulletin index over SQLite.
//!
//! Two tables: `blocks` is an insert-only record of every accepted
//! best-chain block, `bulletins` is the public record keyed by transaction
//! id. Hashes are stored as reversed-hex TEXT so rows join directly
//! against node RPC output.

use placard_protocol::{
    hash_from_hex, hash_to_hex, BlockHash, BlockRecord, Bulletin, HashParseError,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

/// Errors from index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An insert-only block record was written twice.
    #[error("block record already stored")]
    DuplicateBlock,

    /// A persisted hash column failed to parse.
    #[error("corrupt hash column: {0}")]
    Corrupt(#[from] HashParseError),

    /// Any other database failure.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Map a constraint violation on the blocks table to the duplicate error.
fn duplicate_or_sqlite(err: rusqlite::Error) -> IndexError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            IndexError::DuplicateBlock
        }
        _ => IndexError::Sqlite(err),
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    hash      TEXT PRIMARY KEY,
    prevhash  TEXT NOT NULL,
    height    INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blocks_height ON blocks(height);

CREATE TABLE IF NOT EXISTS bulletins (
    txid      TEXT PRIMARY KEY,
    block     TEXT,
    author    TEXT NOT NULL,
    board     TEXT NOT NULL,
    message   TEXT NOT NULL,
    version   INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bulletins_board ON bulletins(board);
"#;

type RecordColumns = (String, String, i64, i64);

fn record_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn record_from_columns(
    (hash, prevhash, height, timestamp): RecordColumns,
) -> Result<BlockRecord, IndexError> {
    Ok(BlockRecord {
        hash: hash_from_hex(&hash)?,
        prev_hash: hash_from_hex(&prevhash)?,
        height: height as u64,
        timestamp: timestamp as u32,
    })
}

type BulletinColumns = (String, Option<String>, String, String, String, i64, i64);

fn bulletin_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<BulletinColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn bulletin_from_columns(
    (txid, block, author, board, message, version, timestamp): BulletinColumns,
) -> Result<Bulletin, IndexError> {
    Ok(Bulletin {
        txid: hash_from_hex(&txid)?,
        block: block.as_deref().map(hash_from_hex).transpose()?,
        author,
        board,
        message,
        version: version as u32,
        timestamp,
    })
}

/// Handle over the index database.
pub struct BulletinIndex {
    conn: Connection,
}

impl BulletinIndex {
    /// Open the index at `path`, creating the schema if missing.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Open an in-memory index (for testing).
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Drop both tables and recreate them empty.
    pub fn reset(&mut self) -> Result<(), IndexError> {
        self.conn.execute_batch(
            r#"
            DROP TABLE IF EXISTS blocks;
            DROP TABLE IF EXISTS bulletins;
            "#,
        )?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Record an accepted block. Records are insert-only; writing the same
    /// hash twice is [`IndexError::DuplicateBlock`].
    pub fn store_block_record(&self, record: &BlockRecord) -> Result<(), IndexError> {
        self.conn
            .execute(
                "INSERT INTO blocks (hash, prevhash, height, timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![
                    hash_to_hex(&record.hash),
                    hash_to_hex(&record.prev_hash),
                    record.height as i64,
                    record.timestamp as i64,
                ],
            )
            .map_err(duplicate_or_sqlite)?;
        Ok(())
    }

    /// Insert a batch of block records in one transaction; any failure
    /// rolls the whole batch back.
    pub fn batch_insert_block_records(
        &mut self,
        records: &[BlockRecord],
    ) -> Result<(), IndexError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO blocks (hash, prevhash, height, timestamp) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in records {
                stmt.execute(params![
                    hash_to_hex(&record.hash),
                    hash_to_hex(&record.prev_hash),
                    record.height as i64,
                    record.timestamp as i64,
                ])
                .map_err(duplicate_or_sqlite)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Look up a block record by hash.
    pub fn block_record(&self, hash: &BlockHash) -> Result<Option<BlockRecord>, IndexError> {
        let row = self
            .conn
            .query_row(
                "SELECT hash, prevhash, height, timestamp FROM blocks WHERE hash = ?1",
                params![hash_to_hex(hash)],
                record_columns,
            )
            .optional()?;
        row.map(record_from_columns).transpose()
    }

    /// The highest block record, if any.
    pub fn chain_tip(&self) -> Result<Option<BlockRecord>, IndexError> {
        let row = self
            .conn
            .query_row(
                "SELECT hash, prevhash, height, timestamp FROM blocks \
                 ORDER BY height DESC LIMIT 1",
                [],
                record_columns,
            )
            .optional()?;
        row.map(record_from_columns).transpose()
    }

    /// A block record at `height`. The blocks table is insert-only, so a
    /// live fork can leave competing records at one height; which of them
    /// comes back is unspecified.
    pub fn record_at_height(&self, height: u64) -> Result<Option<BlockRecord>, IndexError> {
        let row = self
            .conn
            .query_row(
                "SELECT hash, prevhash, height, timestamp FROM blocks \
                 WHERE height = ?1 LIMIT 1",
                params![height as i64],
                record_columns,
            )
            .optional()?;
        row.map(record_from_columns).transpose()
    }

    /// Height of the highest record, 0 for an empty index.
    pub fn current_height(&self) -> Result<u64, IndexError> {
        let height: Option<i64> =
            self.conn
                .query_row("SELECT MAX(height) FROM blocks", [], |row| row.get(0))?;
        Ok(height.unwrap_or(0) as u64)
    }

    /// Insert or replace a bulletin keyed by its transaction id.
    pub fn store_bulletin(&self, bulletin: &Bulletin) -> Result<(), IndexError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO bulletins \
             (txid, block, author, board, message, version, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                hash_to_hex(&bulletin.txid),
                bulletin.block.as_ref().map(hash_to_hex),
                bulletin.author,
                bulletin.board,
                bulletin.message,
                bulletin.version as i64,
                bulletin.timestamp,
            ],
        )?;
        Ok(())
    }

    /// All bulletins posted to a board, newest first.
    pub fn bulletins_for_board(&self, board: &str) -> Result<Vec<Bulletin>, IndexError> {
        let mut stmt = self.conn.prepare(
            "SELECT txid, block, author, board, message, version, timestamp \
             FROM bulletins WHERE board = ?1 \
             ORDER BY timestamp DESC",
        )?;
        let rows = stmt
            .query_map(params![board], bulletin_columns)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(bulletin_from_columns).collect()
    }

    /// Number of stored bulletins.
    pub fn bulletin_count(&self) -> Result<u64, IndexError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM bulletins", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Sparse locator for a backfill request: the most recent ten heights
    /// at step one, the step doubling from there down, genesis last.
    pub fn block_locator(&self) -> Result<Vec<BlockHash>, IndexError> {
        let tip = match self.chain_tip()? {
            Some(record) => record,
            None => return Ok(Vec::new()),
        };

        let mut locator = Vec::new();
        let mut height = tip.height;
        let mut step = 1u64;
        while height > 0 {
            if let Some(record) = self.record_at_height(height)? {
                locator.push(record.hash);
            }
            if locator.len() >= 10 {
                step *= 2;
            }
            height = height.saturating_sub(step);
        }
        if let Some(genesis) = self.record_at_height(0)? {
            locator.push(genesis.hash);
        }
        Ok(locator)
    }
}
