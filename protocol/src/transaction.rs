// Copyright (c) 2025 Placard Foundation

//! Consensus serialization of transactions.
//!
//! Only the legacy layout is implemented; the bulletin era predates any
//! extended serialization formats. Parsing uses `std::io` errors so the
//! block-file scanner can distinguish a clean end-of-stream from
//! corruption.

use crate::block::sha256d;
use std::io::{self, Read, Write};

/// A transaction id (SHA-256d of the serialized transaction), internal
/// byte order.
pub type TxId = [u8; 32];

/// Sanity cap on a single length-prefixed element (script bytes).
const MAX_ELEMENT_LEN: u64 = 1 << 20;

/// Sanity cap on input/output counts.
const MAX_LIST_LEN: u64 = 1 << 20;

/// Read a compact-size variable-length integer.
///
/// A leading byte below `0xfd` is the value itself; `0xfd` introduces a
/// little-endian u16, `0xfe` a u32 and `0xff` a u64.
pub fn read_varint<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut first = [0u8; 1];
    reader.read_exact(&mut first)?;
    match first[0] {
        0xfd => {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
            Ok(u16::from_le_bytes(buf) as u64)
        }
        0xfe => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            Ok(u32::from_le_bytes(buf) as u64)
        }
        0xff => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            Ok(u64::from_le_bytes(buf))
        }
        value => Ok(value as u64),
    }
}

/// Write a compact-size variable-length integer.
pub fn write_varint<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    if value < 0xfd {
        writer.write_all(&[value as u8])
    } else if value <= 0xffff {
        writer.write_all(&[0xfd])?;
        writer.write_all(&(value as u16).to_le_bytes())
    } else if value <= 0xffff_ffff {
        writer.write_all(&[0xfe])?;
        writer.write_all(&(value as u32).to_le_bytes())
    } else {
        writer.write_all(&[0xff])?;
        writer.write_all(&value.to_le_bytes())
    }
}

fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_le<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_hash<R: Read>(reader: &mut R) -> io::Result<[u8; 32]> {
    let mut buf = [0u8; 32];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_script<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_varint(reader)?;
    if len > MAX_ELEMENT_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("script length {len} exceeds sanity cap"),
        ));
    }
    let mut script = vec![0u8; len as usize];
    reader.read_exact(&mut script)?;
    Ok(script)
}

fn check_list_len(len: u64, what: &str) -> io::Result<()> {
    if len > MAX_LIST_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{what} count {len} exceeds sanity cap"),
        ));
    }
    Ok(())
}

/// Reference to the output a transaction input spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    /// Id of the funding transaction, internal byte order.
    pub txid: TxId,

    /// Output index within the funding transaction.
    pub index: u32,
}

impl OutPoint {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            txid: read_hash(reader)?,
            index: read_u32_le(reader)?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.txid)?;
        writer.write_all(&self.index.to_le_bytes())
    }
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// The outpoint being spent.
    pub previous_output: OutPoint,

    /// Unlocking script.
    pub script_sig: Vec<u8>,

    /// Sequence number.
    pub sequence: u32,
}

impl TxInput {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            previous_output: OutPoint::read_from(reader)?,
            script_sig: read_script(reader)?,
            sequence: read_u32_le(reader)?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.previous_output.write_to(writer)?;
        write_varint(writer, self.script_sig.len() as u64)?;
        writer.write_all(&self.script_sig)?;
        writer.write_all(&self.sequence.to_le_bytes())
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Amount in base units.
    pub value: u64,

    /// Locking script; for bulletins this is where payload chunks hide.
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            value: read_u64_le(reader)?,
            script_pubkey: read_script(reader)?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.value.to_le_bytes())?;
        write_varint(writer, self.script_pubkey.len() as u64)?;
        writer.write_all(&self.script_pubkey)
    }
}

/// A parsed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction format version.
    pub version: i32,

    /// Inputs; the first input's outpoint funds the transaction and
    /// identifies the bulletin author.
    pub inputs: Vec<TxInput>,

    /// Outputs, in consensus order.
    pub outputs: Vec<TxOutput>,

    /// Lock time.
    pub lock_time: u32,
}

impl Transaction {
    /// Read one serialized transaction from a stream.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let version = read_u32_le(reader)? as i32;

        let input_count = read_varint(reader)?;
        check_list_len(input_count, "input")?;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            inputs.push(TxInput::read_from(reader)?);
        }

        let output_count = read_varint(reader)?;
        check_list_len(output_count, "output")?;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            outputs.push(TxOutput::read_from(reader)?);
        }

        let lock_time = read_u32_le(reader)?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Write the consensus serialization to a stream.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&(self.version as u32).to_le_bytes())?;
        write_varint(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.write_to(writer)?;
        }
        write_varint(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.write_to(writer)?;
        }
        writer.write_all(&self.lock_time.to_le_bytes())
    }

    /// The consensus serialization as a byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)
            .expect("writing to a Vec cannot fail");
        buf
    }

    /// The transaction id: SHA-256d over the serialized transaction.
    pub fn txid(&self) -> TxId {
        sha256d(&self.to_bytes())
    }
}
