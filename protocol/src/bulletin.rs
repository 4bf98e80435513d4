// Copyright (c) 2025 Placard Foundation

//! The bulletin payload codec.
//!
//! A bulletin rides inside a transaction's output scripts: the framed
//! payload (an 8-byte magic followed by a protobuf message) is cut into
//! 20-byte chunks, and each chunk is pushed by an output script as if it
//! were an address hash. Decoding is the reverse: collect every pushed
//! element across the outputs in order, demand that each is exactly 20
//! bytes, reassemble, check the magic, then decode the protobuf body.

use crate::{
    block::BlockHash,
    script::ScriptDecoder,
    transaction::{Transaction, TxId},
};
use prost::Message;
use thiserror::Error;

/// Magic prefix of every bulletin payload (ASCII "BRETHREN").
pub const PAYLOAD_MAGIC: [u8; 8] = [0x42, 0x52, 0x45, 0x54, 0x48, 0x52, 0x45, 0x4e];

/// Version written into newly encoded bulletins.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum topic length in bytes.
pub const MAX_TOPIC_LEN: usize = 30;

/// Maximum message length in bytes.
pub const MAX_MESSAGE_LEN: usize = 500;

/// Every pushed payload chunk must be exactly this long.
pub const PUSH_CHUNK_LEN: usize = 20;

/// Errors from encoding or decoding bulletin payloads.
#[derive(Debug, Error)]
pub enum BulletinError {
    /// A pushed element had the wrong length for a payload chunk.
    #[error("push element {index} is {len} bytes; payload chunks are {PUSH_CHUNK_LEN}")]
    ChunkLength {
        /// Position of the element across the transaction's outputs.
        index: usize,
        /// Its actual length.
        len: usize,
    },

    /// The reassembled payload does not start with the bulletin magic.
    #[error("payload does not begin with the bulletin magic")]
    MagicMismatch,

    /// Topic over the wire limit.
    #[error("topic is {0} bytes; the limit is {MAX_TOPIC_LEN}")]
    TopicTooLong(usize),

    /// Message over the wire limit.
    #[error("message is {0} bytes; the limit is {MAX_MESSAGE_LEN}")]
    MessageTooLong(usize),

    /// The protobuf body failed to decode.
    #[error("payload fields failed to decode: {0}")]
    Decode(#[from] prost::DecodeError),

    /// An output script could not be walked for pushed data.
    #[error(transparent)]
    Script(#[from] crate::script::ScriptError),
}

/// The wire form of a bulletin, as embedded in transaction outputs.
#[derive(Clone, Eq, Message, PartialEq)]
pub struct WireBulletin {
    /// Bulletin protocol version.
    #[prost(uint32, required, tag = 1)]
    pub version: u32,

    /// Board the bulletin is posted to.
    #[prost(string, optional, tag = 2)]
    pub topic: Option<String>,

    /// Free-form message body.
    #[prost(string, optional, tag = 3)]
    pub message: Option<String>,
}

/// Produce the framed payload (magic + encoded fields) for a new bulletin.
///
/// Cut the result with [`chunk_payload`] and build the carrying
/// transaction around the pushes.
pub fn encode(topic: &str, message: &str) -> Result<Vec<u8>, BulletinError> {
    if topic.len() > MAX_TOPIC_LEN {
        return Err(BulletinError::TopicTooLong(topic.len()));
    }
    if message.len() > MAX_MESSAGE_LEN {
        return Err(BulletinError::MessageTooLong(message.len()));
    }

    let wire = WireBulletin {
        version: PROTOCOL_VERSION,
        topic: Some(topic.to_owned()),
        message: Some(message.to_owned()),
    };
    let mut payload = Vec::with_capacity(PAYLOAD_MAGIC.len() + wire.encoded_len());
    payload.extend_from_slice(&PAYLOAD_MAGIC);
    payload.extend_from_slice(&wire.encode_to_vec());
    Ok(payload)
}

/// Cut a framed payload into the address-sized pushes that carry it.
///
/// The final chunk is zero padded out to [`PUSH_CHUNK_LEN`] bytes;
/// [`decode_body`] strips the padding again on the way out.
pub fn chunk_payload(payload: &[u8]) -> Vec<[u8; PUSH_CHUNK_LEN]> {
    payload
        .chunks(PUSH_CHUNK_LEN)
        .map(|piece| {
            let mut chunk = [0u8; PUSH_CHUNK_LEN];
            chunk[..piece.len()].copy_from_slice(piece);
            chunk
        })
        .collect()
}

/// Reassemble pushed chunks into the protobuf body.
///
/// Every chunk must be exactly [`PUSH_CHUNK_LEN`] bytes and the
/// concatenation must begin with [`PAYLOAD_MAGIC`]; the returned body has
/// the magic stripped.
pub fn reassemble_chunks(chunks: &[Vec<u8>]) -> Result<Vec<u8>, BulletinError> {
    let mut payload = Vec::with_capacity(chunks.len() * PUSH_CHUNK_LEN);
    for (index, chunk) in chunks.iter().enumerate() {
        if chunk.len() != PUSH_CHUNK_LEN {
            return Err(BulletinError::ChunkLength {
                index,
                len: chunk.len(),
            });
        }
        payload.extend_from_slice(chunk);
    }
    if payload.len() < PAYLOAD_MAGIC.len() || payload[..PAYLOAD_MAGIC.len()] != PAYLOAD_MAGIC {
        return Err(BulletinError::MagicMismatch);
    }
    Ok(payload.split_off(PAYLOAD_MAGIC.len()))
}

/// Decode the protobuf body of a payload and enforce the field limits.
///
/// The final chunk of a payload is zero padded, and zero is never a valid
/// field key, so trailing zero bytes are stripped before decoding.
pub fn decode_body(body: &[u8]) -> Result<WireBulletin, BulletinError> {
    let end = body.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let wire = WireBulletin::decode(&body[..end])?;
    if let Some(topic) = &wire.topic {
        if topic.len() > MAX_TOPIC_LEN {
            return Err(BulletinError::TopicTooLong(topic.len()));
        }
    }
    if let Some(message) = &wire.message {
        if message.len() > MAX_MESSAGE_LEN {
            return Err(BulletinError::MessageTooLong(message.len()));
        }
    }
    Ok(wire)
}

/// Collect the pushed data of every output, in order, and reassemble the
/// framed payload body.
pub fn extract_payload<D: ScriptDecoder + ?Sized>(
    tx: &Transaction,
    scripts: &D,
) -> Result<Vec<u8>, BulletinError> {
    let mut chunks = Vec::new();
    for output in &tx.outputs {
        chunks.extend(scripts.extract_pushed_data(&output.script_pubkey)?);
    }
    reassemble_chunks(&chunks)
}

/// Decode the bulletin carried by a transaction.
pub fn decode_transaction<D: ScriptDecoder + ?Sized>(
    tx: &Transaction,
    scripts: &D,
) -> Result<WireBulletin, BulletinError> {
    let body = extract_payload(tx, scripts)?;
    decode_body(&body)
}

/// Whether a transaction's outputs carry a bulletin-framed payload.
///
/// Cheaper than a full decode; used to recognize bulletins in the live
/// transaction stream.
pub fn is_bulletin<D: ScriptDecoder + ?Sized>(tx: &Transaction, scripts: &D) -> bool {
    extract_payload(tx, scripts).is_ok()
}

/// A bulletin as persisted in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bulletin {
    /// Id of the carrying transaction.
    pub txid: TxId,

    /// Containing block, `None` while unconfirmed.
    pub block: Option<BlockHash>,

    /// Address that funded the carrying transaction.
    pub author: String,

    /// Board the bulletin is posted to.
    pub board: String,

    /// Message body.
    pub message: String,

    /// Wire protocol version the bulletin was encoded with.
    pub version: u32,

    /// Block time on the bulk path, observation time on the live path
    /// (unix seconds).
    pub timestamp: i64,
}

impl Bulletin {
    /// Build the persisted form from a decoded wire bulletin.
    pub fn from_wire(
        txid: TxId,
        block: Option<BlockHash>,
        author: String,
        wire: WireBulletin,
        timestamp: i64,
    ) -> Self {
        Self {
            txid,
            block,
            author,
            board: wire.topic.unwrap_or_default(),
            message: wire.message.unwrap_or_default(),
            version: wire.version,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        script::{p2pkh_script, StandardScripts},
        transaction::{OutPoint, TxInput, TxOutput},
    };

    /// A transaction whose outputs hide `payload` in address-shaped pushes.
    fn tx_carrying(payload: &[u8]) -> Transaction {
        let outputs = chunk_payload(payload)
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
                    txid: [0x55; 32],
                    index: 0,
                },
                script_sig: Vec::new(),
                sequence: u32::MAX,
            }],
            outputs,
            lock_time: 0,
        }
    }

    #[test]
    fn test_wire_encoding_bytes() {
        let wire = WireBulletin {
            version: 1,
            topic: Some("garden".to_string()),
            message: Some("hello world".to_string()),
        };
        let mut expected = vec![0x08, 0x01];
        expected.extend_from_slice(&[0x12, 6]);
        expected.extend_from_slice(b"garden");
        expected.extend_from_slice(&[0x1a, 11]);
        expected.extend_from_slice(b"hello world");
        assert_eq!(wire.encode_to_vec(), expected);
    }

    #[test]
    fn test_roundtrip_through_chunked_outputs() {
        // 8 magic + 2 version + 6 topic + 24 message = 40 bytes, two chunks.
        let payload = encode("rust", "a message of 22 bytes.").unwrap();
        assert_eq!(payload.len(), 40);

        let tx = tx_carrying(&payload);
        let wire = decode_transaction(&tx, &StandardScripts::testnet()).unwrap();
        assert_eq!(wire.version, PROTOCOL_VERSION);
        assert_eq!(wire.topic.as_deref(), Some("rust"));
        assert_eq!(wire.message.as_deref(), Some("a message of 22 bytes."));
    }

    #[test]
    fn test_padded_final_chunk_roundtrips() {
        // 8 magic + 2 version + 6 topic + 9 message = 25 bytes: the second
        // chunk carries 5 payload bytes and 15 bytes of zero padding.
        let payload = encode("rust", "seven b").unwrap();
        assert_eq!(payload.len(), 25);

        let tx = tx_carrying(&payload);
        let wire = decode_transaction(&tx, &StandardScripts::testnet()).unwrap();
        assert_eq!(wire.topic.as_deref(), Some("rust"));
        assert_eq!(wire.message.as_deref(), Some("seven b"));
    }

    #[test]
    fn test_topic_length_boundary() {
        let exact = "t".repeat(MAX_TOPIC_LEN);
        assert!(encode(&exact, "ok").is_ok());

        let over = "t".repeat(MAX_TOPIC_LEN + 1);
        assert!(matches!(
            encode(&over, "ok"),
            Err(BulletinError::TopicTooLong(31))
        ));
    }

    #[test]
    fn test_message_length_boundary() {
        let exact = "m".repeat(MAX_MESSAGE_LEN);
        let payload = encode("board", &exact).unwrap();
        let wire = decode_body(&payload[PAYLOAD_MAGIC.len()..]).unwrap();
        assert_eq!(wire.message.as_deref(), Some(exact.as_str()));

        let over = "m".repeat(MAX_MESSAGE_LEN + 1);
        assert!(matches!(
            encode("board", &over),
            Err(BulletinError::MessageTooLong(501))
        ));
    }

    #[test]
    fn test_decode_enforces_limits() {
        // encode() refuses oversized fields, so build the body directly.
        let wire = WireBulletin {
            version: 1,
            topic: Some("t".repeat(MAX_TOPIC_LEN + 1)),
            message: None,
        };
        assert!(matches!(
            decode_body(&wire.encode_to_vec()),
            Err(BulletinError::TopicTooLong(31))
        ));
    }

    #[test]
    fn test_wrong_chunk_length_fails() {
        let payload = encode("rust", "a message of 22 bytes.").unwrap();
        let mut chunks: Vec<Vec<u8>> = chunk_payload(&payload)
            .iter()
            .map(|c| c.to_vec())
            .collect();
        chunks[1].truncate(19);
        assert!(matches!(
            reassemble_chunks(&chunks),
            Err(BulletinError::ChunkLength { index: 1, len: 19 })
        ));
    }

    #[test]
    fn test_magic_mismatch() {
        let chunks = vec![vec![0xabu8; PUSH_CHUNK_LEN]; 2];
        assert!(matches!(
            reassemble_chunks(&chunks),
            Err(BulletinError::MagicMismatch)
        ));
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let mut body = WireBulletin {
            version: 1,
            topic: Some("rust".to_string()),
            message: Some("hi".to_string()),
        }
        .encode_to_vec();
        // Field 4, varint 42: unknown to this decoder.
        body.extend_from_slice(&[0x20, 0x2a]);

        let wire = decode_body(&body).unwrap();
        assert_eq!(wire.topic.as_deref(), Some("rust"));
    }

    #[test]
    fn test_ordinary_transaction_is_not_a_bulletin() {
        let tx = Transaction {
            version: 1,
            inputs: Vec::new(),
            outputs: vec![TxOutput {
                value: 1000,
                script_pubkey: p2pkh_script(&[9u8; 20]),
            }],
            lock_time: 0,
        };
        assert!(!is_bulletin(&tx, &StandardScripts::testnet()));
    }

    #[test]
    fn test_bulletin_recognized() {
        let payload = encode("rust", "a message of 22 bytes.").unwrap();
        assert!(is_bulletin(&tx_carrying(&payload), &StandardScripts::testnet()));
    }

    #[test]
    fn test_from_wire_defaults_empty_fields() {
        let bulletin = Bulletin::from_wire(
            [1u8; 32],
            None,
            "author".to_string(),
            WireBulletin {
                version: 1,
                topic: None,
                message: None,
            },
            1_300_000_000,
        );
        assert_eq!(bulletin.board, "");
        assert_eq!(bulletin.message, "");
        assert!(bulletin.block.is_none());
    }
}
