// Copyright (c) 2025 Placard Foundation

//! Block headers, block hashing and the persisted block record shape.

use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};
use thiserror::Error;

/// A block hash (SHA-256d of the serialized header), in internal byte order.
pub type BlockHash = [u8; 32];

/// Serialized length of a block header.
pub const HEADER_LEN: usize = 80;

/// Double SHA-256, the host chain's hash for headers and transactions.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Render a hash in the reversed-hex convention used by node RPC interfaces
/// and block explorers.
pub fn hash_to_hex(hash: &BlockHash) -> String {
    let mut bytes = *hash;
    bytes.reverse();
    hex::encode(bytes)
}

/// Parse a reversed-hex hash back into internal byte order.
pub fn hash_from_hex(s: &str) -> Result<BlockHash, HashParseError> {
    let bytes = hex::decode(s)?;
    let mut hash: BlockHash = bytes
        .try_into()
        .map_err(|b: Vec<u8>| HashParseError::Length(b.len()))?;
    hash.reverse();
    Ok(hash)
}

/// Failure to parse a hex-encoded hash.
#[derive(Debug, Error)]
pub enum HashParseError {
    /// Not valid hex.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Wrong number of bytes.
    #[error("expected 32 hash bytes, got {0}")]
    Length(usize),
}

/// The fixed eighty-byte on-chain block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block format version.
    pub version: i32,

    /// Hash of the previous block, internal byte order.
    pub prev_hash: BlockHash,

    /// Merkle root of the block's transactions, internal byte order.
    pub merkle_root: [u8; 32],

    /// Block timestamp (unix seconds).
    pub timestamp: u32,

    /// Compact difficulty target.
    pub bits: u32,

    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialize to the consensus little-endian layout.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&self.version.to_le_bytes());
        buf[4..36].copy_from_slice(&self.prev_hash);
        buf[36..68].copy_from_slice(&self.merkle_root);
        buf[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[72..76].copy_from_slice(&self.bits.to_le_bytes());
        buf[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        buf
    }

    /// Deserialize from the consensus little-endian layout.
    pub fn from_bytes(buf: &[u8; HEADER_LEN]) -> Self {
        let mut prev_hash = [0u8; 32];
        prev_hash.copy_from_slice(&buf[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&buf[36..68]);
        Self {
            version: i32::from_le_bytes(buf[0..4].try_into().unwrap()),
            prev_hash,
            merkle_root,
            timestamp: u32::from_le_bytes(buf[68..72].try_into().unwrap()),
            bits: u32::from_le_bytes(buf[72..76].try_into().unwrap()),
            nonce: u32::from_le_bytes(buf[76..80].try_into().unwrap()),
        }
    }

    /// Read exactly one header from a stream.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; HEADER_LEN];
        reader.read_exact(&mut buf)?;
        Ok(Self::from_bytes(&buf))
    }

    /// Write the serialized header to a stream.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// The block hash: SHA-256d over the serialized header.
    pub fn hash(&self) -> BlockHash {
        sha256d(&self.to_bytes())
    }
}

/// A block accepted onto the indexed chain, as persisted.
///
/// Created once per block, by the bulk loader or by the live reconciler,
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    /// Block hash, internal byte order.
    pub hash: BlockHash,

    /// Previous block hash, internal byte order.
    pub prev_hash: BlockHash,

    /// Height above the scan's genesis anchor.
    pub height: u64,

    /// Header timestamp (unix seconds).
    pub timestamp: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The host chain's genesis header, consensus serialization.
    const GENESIS_HEADER_HEX: &str = "01000000000000000000000000000000000000000000000000000000000000000000000\
         03ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";

    fn genesis_header() -> BlockHeader {
        let bytes: [u8; HEADER_LEN] = hex::decode(GENESIS_HEADER_HEX)
            .unwrap()
            .try_into()
            .unwrap();
        BlockHeader::from_bytes(&bytes)
    }

    #[test]
    fn test_genesis_header_fields() {
        let header = genesis_header();
        assert_eq!(header.version, 1);
        assert_eq!(header.prev_hash, [0u8; 32]);
        assert_eq!(header.timestamp, 1231006505);
        assert_eq!(header.bits, 0x1d00ffff);
        assert_eq!(header.nonce, 2083236893);
    }

    #[test]
    fn test_genesis_header_hash() {
        let header = genesis_header();
        assert_eq!(
            hash_to_hex(&header.hash()),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
    }

    #[test]
    fn test_header_roundtrip() {
        let header = BlockHeader {
            version: 2,
            prev_hash: [0xaa; 32],
            merkle_root: [0xbb; 32],
            timestamp: 1_400_000_000,
            bits: 0x1d00ffff,
            nonce: 42,
        };
        let parsed = BlockHeader::from_bytes(&header.to_bytes());
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_hash_changes_with_nonce() {
        let mut header = genesis_header();
        let before = header.hash();
        header.nonce += 1;
        assert_ne!(before, header.hash());
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let hash = genesis_header().hash();
        let hex = hash_to_hex(&hash);
        assert_eq!(hash_from_hex(&hex).unwrap(), hash);
    }

    #[test]
    fn test_hash_from_hex_rejects_short_input() {
        assert!(matches!(
            hash_from_hex("abcd"),
            Err(HashParseError::Length(2))
        ));
    }
}
