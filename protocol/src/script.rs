// Copyright (c) 2025 Placard Foundation

//! Output script decoding.
//!
//! The rest of the crate only needs two things from scripts: the raw data
//! elements a script pushes (where bulletin payload bytes hide) and
//! whether a script pays to a public key hash (bulletin authors are the
//! address behind the funding output). `ScriptDecoder` is the seam;
//! `StandardScripts` covers the standard encodings.

use crate::block::sha256d;
use thiserror::Error;

/// OP_PUSHDATA1: next byte is the push length.
pub const OP_PUSHDATA1: u8 = 0x4c;
/// OP_PUSHDATA2: next two bytes (LE) are the push length.
pub const OP_PUSHDATA2: u8 = 0x4d;
/// OP_PUSHDATA4: next four bytes (LE) are the push length.
pub const OP_PUSHDATA4: u8 = 0x4e;
/// OP_DUP.
pub const OP_DUP: u8 = 0x76;
/// OP_EQUALVERIFY.
pub const OP_EQUALVERIFY: u8 = 0x88;
/// OP_HASH160.
pub const OP_HASH160: u8 = 0xa9;
/// OP_CHECKSIG.
pub const OP_CHECKSIG: u8 = 0xac;

/// Address version byte for production-chain pay-to-pubkey-hash.
pub const MAINNET_ADDRESS_VERSION: u8 = 0x00;

/// Address version byte for test-chain pay-to-pubkey-hash.
pub const TESTNET_ADDRESS_VERSION: u8 = 0x6f;

/// Errors from walking a script.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// A push opcode promised more bytes than the script holds.
    #[error("push at offset {offset} overruns the script")]
    TruncatedPush {
        /// Offset of the push opcode.
        offset: usize,
    },

    /// A pushdata length prefix itself is cut short.
    #[error("pushdata length prefix at offset {offset} is truncated")]
    TruncatedLength {
        /// Offset of the pushdata opcode.
        offset: usize,
    },
}

/// Recognized script shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptClass {
    /// Standard pay-to-pubkey-hash.
    PubKeyHash,

    /// Anything else.
    NonStandard,
}

/// Decodes output scripts for the codec and for author resolution.
pub trait ScriptDecoder {
    /// All data elements the script pushes, in script order.
    fn extract_pushed_data(&self, script: &[u8]) -> Result<Vec<Vec<u8>>, ScriptError>;

    /// Classify the script and derive the addresses it commits to.
    fn classify(&self, script: &[u8]) -> (ScriptClass, Vec<String>);
}

/// `ScriptDecoder` for the standard script templates, parameterized by the
/// network's address version byte.
#[derive(Debug, Clone, Copy)]
pub struct StandardScripts {
    address_version: u8,
}

impl StandardScripts {
    /// Decoder for the given address version byte.
    pub fn new(address_version: u8) -> Self {
        Self { address_version }
    }

    /// Decoder for production-chain addresses.
    pub fn mainnet() -> Self {
        Self::new(MAINNET_ADDRESS_VERSION)
    }

    /// Decoder for test-chain addresses.
    pub fn testnet() -> Self {
        Self::new(TESTNET_ADDRESS_VERSION)
    }

    /// Base58check address for a 20-byte pubkey hash.
    pub fn p2pkh_address(&self, pubkey_hash: &[u8]) -> String {
        let mut payload = Vec::with_capacity(25);
        payload.push(self.address_version);
        payload.extend_from_slice(pubkey_hash);
        let checksum = sha256d(&payload);
        payload.extend_from_slice(&checksum[..4]);
        bs58::encode(payload).into_string()
    }
}

/// The 20-byte hash of a pay-to-pubkey-hash script, if the script matches
/// the template exactly.
fn pubkey_hash(script: &[u8]) -> Option<&[u8]> {
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        Some(&script[3..23])
    } else {
        None
    }
}

impl ScriptDecoder for StandardScripts {
    fn extract_pushed_data(&self, script: &[u8]) -> Result<Vec<Vec<u8>>, ScriptError> {
        let mut pushes = Vec::new();
        let mut i = 0usize;
        while i < script.len() {
            let at = i;
            let opcode = script[i];
            i += 1;
            let len = match opcode {
                1..=75 => opcode as usize,
                OP_PUSHDATA1 => {
                    if script.len() - i < 1 {
                        return Err(ScriptError::TruncatedLength { offset: at });
                    }
                    let len = script[i] as usize;
                    i += 1;
                    len
                }
                OP_PUSHDATA2 => {
                    if script.len() - i < 2 {
                        return Err(ScriptError::TruncatedLength { offset: at });
                    }
                    let len = u16::from_le_bytes(script[i..i + 2].try_into().unwrap()) as usize;
                    i += 2;
                    len
                }
                OP_PUSHDATA4 => {
                    if script.len() - i < 4 {
                        return Err(ScriptError::TruncatedLength { offset: at });
                    }
                    let len = u32::from_le_bytes(script[i..i + 4].try_into().unwrap()) as usize;
                    i += 4;
                    len
                }
                // Not a data push; no operand bytes to skip.
                _ => continue,
            };
            if script.len() - i < len {
                return Err(ScriptError::TruncatedPush { offset: at });
            }
            pushes.push(script[i..i + len].to_vec());
            i += len;
        }
        Ok(pushes)
    }

    fn classify(&self, script: &[u8]) -> (ScriptClass, Vec<String>) {
        match pubkey_hash(script) {
            Some(hash) => (ScriptClass::PubKeyHash, vec![self.p2pkh_address(hash)]),
            None => (ScriptClass::NonStandard, Vec::new()),
        }
    }
}

/// Build the pay-to-pubkey-hash script for a 20-byte hash.
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}
