// Copyright (c) 2025 Placard Foundation

//! Scanner for on-disk block files.
//!
//! A block file is a sequence of records, each `network magic (4 bytes) |
//! record length (u32 LE) | 80-byte header | varint tx count | transactions`,
//! with runs of zero bytes padding the gaps between records. The scanner
//! walks a byte stream in 4-byte steps until it finds a non-zero
//! discriminant, which marks the start of a record.
//!
//! End-of-stream while searching for a record, or while reading the
//! transaction list, ends the file cleanly; a record whose envelope or
//! header cannot be read in full is corruption and fails the scan.

use crate::{
    block::{BlockHash, BlockHeader},
    transaction::{read_varint, write_varint, Transaction},
};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Network magic for the production chain.
pub const MAINNET_MAGIC: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

/// Network magic for the test chain.
pub const TESTNET_MAGIC: [u8; 4] = [0x0b, 0x11, 0x09, 0x07];

/// Errors from scanning a block file.
#[derive(Debug, Error)]
pub enum BlockFileError {
    /// A record started but its envelope or header ended early.
    #[error("block record truncated mid-header: {0}")]
    TruncatedRecord(#[source] io::Error),

    /// A transaction inside a record failed to parse.
    #[error("malformed transaction {index} in block {hash}: {source}")]
    BadTransaction {
        /// Position of the transaction within the record.
        index: usize,
        /// Hash of the containing block, reversed hex.
        hash: String,
        /// Underlying parse failure.
        source: io::Error,
    },

    /// Any other read failure.
    #[error("block file read failed: {0}")]
    Io(#[from] io::Error),
}

/// One record parsed out of a block file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// The block header.
    pub header: BlockHeader,

    /// SHA-256d of the serialized header.
    pub hash: BlockHash,

    /// Every transaction in the block, in consensus order.
    pub transactions: Vec<Transaction>,
}

/// Lazy iterator over the records of one block file.
///
/// Yields `Err` at most once; iteration ends after the first error.
pub struct BlockFileReader<R> {
    reader: R,
    finished: bool,
}

impl<R: Read> BlockFileReader<R> {
    /// Scan records from `reader`, which must be positioned at the start
    /// of a block file.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
        }
    }

    /// Advance past zero padding to the next record discriminant.
    ///
    /// Returns `None` on clean end-of-stream.
    fn find_discriminant(&mut self) -> io::Result<Option<[u8; 4]>> {
        let mut chunk = [0u8; 4];
        loop {
            match self.reader.read_exact(&mut chunk) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e),
            }
            if chunk != [0u8; 4] {
                return Ok(Some(chunk));
            }
        }
    }

    fn next_record(&mut self) -> Result<Option<RawBlock>, BlockFileError> {
        if self.find_discriminant()?.is_none() {
            return Ok(None);
        }

        // Envelope length; transactions are parsed directly, so the value
        // itself is not needed to advance.
        let mut length = [0u8; 4];
        self.reader
            .read_exact(&mut length)
            .map_err(BlockFileError::TruncatedRecord)?;

        let header =
            BlockHeader::read_from(&mut self.reader).map_err(BlockFileError::TruncatedRecord)?;
        let hash = header.hash();

        let tx_count = match read_varint(&mut self.reader) {
            Ok(count) => count,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut transactions = Vec::new();
        for index in 0..tx_count {
            match Transaction::read_from(&mut self.reader) {
                Ok(tx) => transactions.push(tx),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => {
                    return Err(BlockFileError::BadTransaction {
                        index: index as usize,
                        hash: crate::block::hash_to_hex(&hash),
                        source: e,
                    })
                }
            }
        }

        Ok(Some(RawBlock {
            header,
            hash,
            transactions,
        }))
    }
}

impl<R: Read> Iterator for BlockFileReader<R> {
    type Item = Result<RawBlock, BlockFileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Append one block record (magic, length envelope, header, transactions)
/// to `writer`. Used to build fixtures and sample files.
pub fn write_record<W: Write>(
    writer: &mut W,
    magic: [u8; 4],
    header: &BlockHeader,
    transactions: &[Transaction],
) -> io::Result<()> {
    let mut body = Vec::new();
    header.write_to(&mut body)?;
    write_varint(&mut body, transactions.len() as u64)?;
    for tx in transactions {
        tx.write_to(&mut body)?;
    }

    writer.write_all(&magic)?;
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(&body)
}
