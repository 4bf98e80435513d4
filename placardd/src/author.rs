// Copyright (c) 2025 Placard Foundation

//! Author resolution.
//!
//! A bulletin's author is the address paid by its first input's funding
//! output. Fetching that output means a round trip to the node, so a
//! single long-lived worker owns the RPC client and drains a FIFO queue
//! of queries. Callers block on a private reply channel only; a slow
//! fetch never stalls the submission of unrelated queries.

use crate::rpc::{NodeRpc, RpcError};
use placard_protocol::{OutPoint, ScriptClass, ScriptDecoder, StandardScripts, Transaction};
use std::sync::mpsc;
use std::thread;
use thiserror::Error;
use tracing::debug;

/// Errors from author resolution.
#[derive(Debug, Error)]
pub enum AuthorError {
    /// The funding transaction could not be fetched.
    #[error("funding transaction fetch: {0}")]
    Rpc(#[from] RpcError),

    /// The funding transaction has no output at the spent index.
    #[error("funding transaction has no output {0}")]
    MissingOutput(u32),

    /// The funding output is not pay-to-pubkey-hash.
    #[error("funding output is not pay-to-pubkey-hash")]
    NotPayToPubKeyHash,

    /// The carrying transaction has no inputs.
    #[error("transaction has no inputs")]
    NoInputs,

    /// The worker thread has exited.
    #[error("author worker is gone")]
    WorkerGone,
}

/// One queued resolution request.
struct AuthorQuery {
    outpoint: OutPoint,
    reply: mpsc::Sender<Result<String, AuthorError>>,
}

/// Submits author queries to the worker. Cheap to clone.
#[derive(Clone)]
pub struct AuthorHandle {
    queries: mpsc::Sender<AuthorQuery>,
}

impl AuthorHandle {
    /// Resolve the address paid by `outpoint`. Blocks until the worker
    /// answers this query.
    pub fn resolve(&self, outpoint: OutPoint) -> Result<String, AuthorError> {
        let (reply, response) = mpsc::channel();
        self.queries
            .send(AuthorQuery { outpoint, reply })
            .map_err(|_| AuthorError::WorkerGone)?;
        response.recv().map_err(|_| AuthorError::WorkerGone)?
    }

    /// Resolve the author of a carrying transaction: the address behind
    /// its first input's funding output.
    pub fn resolve_author(&self, tx: &Transaction) -> Result<String, AuthorError> {
        let input = tx.inputs.first().ok_or(AuthorError::NoInputs)?;
        self.resolve(input.previous_output)
    }
}

/// Start the resolution worker. It owns the RPC client and runs until
/// every [`AuthorHandle`] is dropped; each queued query receives exactly
/// one result.
pub fn spawn(
    rpc: Box<dyn NodeRpc>,
    scripts: StandardScripts,
) -> (AuthorHandle, thread::JoinHandle<()>) {
    let (sender, queries) = mpsc::channel::<AuthorQuery>();
    let worker = thread::spawn(move || {
        for query in queries {
            let result = resolve_outpoint(rpc.as_ref(), &scripts, &query.outpoint);
            // The caller may have given up on its reply channel.
            let _ = query.reply.send(result);
        }
        debug!("author worker drained, exiting");
    });
    (AuthorHandle { queries: sender }, worker)
}

fn resolve_outpoint(
    rpc: &dyn NodeRpc,
    scripts: &StandardScripts,
    outpoint: &OutPoint,
) -> Result<String, AuthorError> {
    let funding = rpc.raw_transaction(&outpoint.txid)?;
    let output = funding
        .outputs
        .get(outpoint.index as usize)
        .ok_or(AuthorError::MissingOutput(outpoint.index))?;

    let (class, addresses) = scripts.classify(&output.script_pubkey);
    if class != ScriptClass::PubKeyHash {
        return Err(AuthorError::NotPayToPubKeyHash);
    }
    addresses
        .into_iter()
        .next()
        .ok_or(AuthorError::NotPayToPubKeyHash)
}
