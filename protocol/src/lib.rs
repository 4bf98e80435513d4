// Copyright (c) 2025 Placard Foundation

//! Wire formats and chain assembly for the placard bulletin index.
//!
//! This crate holds everything that can be computed without a database or a
//! network connection:
//!
//! - The on-disk block record codec (`blockfile`) and the consensus
//!   serialization of headers and transactions (`block`, `transaction`)
//! - The chain builder that links scanned blocks into a best chain (`chain`)
//! - The bulletin payload codec: magic framing, 20-byte push reassembly and
//!   the protobuf wire message (`bulletin`)
//! - The script decoding seam used to pull pushed data and author addresses
//!   out of output scripts (`script`)

pub mod block;
pub mod blockfile;
pub mod bulletin;
pub mod chain;
pub mod script;
pub mod transaction;

pub use block::{
    hash_from_hex, hash_to_hex, sha256d, BlockHash, BlockHeader, BlockRecord, HashParseError,
};
pub use blockfile::{BlockFileError, BlockFileReader, RawBlock};
pub use bulletin::{
    Bulletin, BulletinError, WireBulletin, MAX_MESSAGE_LEN, MAX_TOPIC_LEN, PAYLOAD_MAGIC,
    PROTOCOL_VERSION, PUSH_CHUNK_LEN,
};
pub use chain::{ChainBlock, ChainError, ChainScan, LinkedChain};
pub use script::{ScriptClass, ScriptDecoder, ScriptError, StandardScripts};
pub use transaction::{OutPoint, Transaction, TxId, TxInput, TxOutput};
