// Copyright (c) 2025 Placard Foundation

//! Node JSON-RPC access.

use placard_protocol::{hash_to_hex, Transaction, TxId};
use serde::Deserialize;
use thiserror::Error;

/// Errors from node RPC calls.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Transport failure.
    #[error("rpc transport: {0}")]
    Http(#[from] reqwest::Error),

    /// The node answered with an error object.
    #[error("node error {code}: {message}")]
    Node {
        /// Node error code.
        code: i64,
        /// Node error text.
        message: String,
    },

    /// The response carried neither a result nor an error.
    #[error("response carried no result")]
    MissingResult,

    /// The result was not shaped as expected.
    #[error("unexpected result: {0}")]
    BadResult(&'static str),

    /// A hex-encoded result failed to decode.
    #[error("result hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// A raw transaction failed to deserialize.
    #[error("raw transaction: {0}")]
    Transaction(#[from] std::io::Error),
}

/// The node operations the daemon needs.
///
/// One implementation speaks JSON-RPC to a real node; tests substitute
/// their own.
pub trait NodeRpc: Send {
    /// Best-chain height reported by the node.
    fn block_count(&self) -> Result<u64, RpcError>;

    /// Fetch a raw transaction by id.
    fn raw_transaction(&self, txid: &TxId) -> Result<Transaction, RpcError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Response {
    result: Option<serde_json::Value>,
    error: Option<ErrorBody>,
}

/// Blocking JSON-RPC client for a node endpoint.
pub struct JsonRpcClient {
    client: reqwest::blocking::Client,
    url: String,
    user: String,
    password: Option<String>,
}

impl JsonRpcClient {
    /// Build a client against `url` with basic-auth credentials.
    pub fn new(url: &str, user: &str, password: Option<&str>) -> Result<Self, RpcError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            user: user.to_string(),
            password: password.map(str::to_string),
        })
    }

    fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        let mut request = self.client.post(&self.url).json(&serde_json::json!({
            "jsonrpc": "1.0",
            "id": "placardd",
            "method": method,
            "params": params,
        }));
        if !self.user.is_empty() || self.password.is_some() {
            request = request.basic_auth(&self.user, self.password.as_deref());
        }

        let response: Response = request.send()?.json()?;
        if let Some(error) = response.error {
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }
        response.result.ok_or(RpcError::MissingResult)
    }
}

impl NodeRpc for JsonRpcClient {
    fn block_count(&self) -> Result<u64, RpcError> {
        self.call("getblockcount", serde_json::json!([]))?
            .as_u64()
            .ok_or(RpcError::BadResult("getblockcount is not an integer"))
    }

    fn raw_transaction(&self, txid: &TxId) -> Result<Transaction, RpcError> {
        let result = self.call("getrawtransaction", serde_json::json!([hash_to_hex(txid)]))?;
        let tx_hex = result
            .as_str()
            .ok_or(RpcError::BadResult("getrawtransaction is not a string"))?;
        let raw = hex::decode(tx_hex)?;
        Ok(Transaction::read_from(&mut raw.as_slice())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_takes_precedence() {
        let parsed: Response = serde_json::from_str(
            r#"{"result": null, "error": {"code": -5, "message": "No such transaction"}, "id": "placardd"}"#,
        )
        .unwrap();
        assert!(parsed.result.is_none());
        let error = parsed.error.unwrap();
        assert_eq!(error.code, -5);
        assert_eq!(error.message, "No such transaction");
    }

    #[test]
    fn test_result_parses() {
        let parsed: Response =
            serde_json::from_str(r#"{"result": 812345, "error": null, "id": "placardd"}"#).unwrap();
        assert!(parsed.error.is_none());
        assert_eq!(parsed.result.unwrap().as_u64(), Some(812_345));
    }
}
