//! Chain RPC backends.
//!
//! Supports pluggable lookup backends via the [`ChainRpc`] trait. Includes
//! [`HttpRpc`] for real Ethereum JSON-RPC endpoints and [`MockChain`] for
//! testing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use murmur_core::{Address, TxHash};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain RPC transport error: {0}")]
    Transport(String),
    #[error("chain RPC request timed out")]
    Timeout,
    #[error("chain RPC error: {0}")]
    Rpc(String),
    #[error("malformed chain RPC response: {0}")]
    Decode(String),
}

/// A transaction as returned by `eth_getTransactionByHash` (subset).
///
/// Wire values are raw hex strings; they are parsed into domain types only
/// during verification. Unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    /// Target contract; absent for contract-creation transactions.
    pub to: Option<String>,
}

/// An execution receipt as returned by `eth_getTransactionReceipt` (subset).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    /// `"0x1"` on success, `"0x0"` on revert.
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl TransactionReceipt {
    /// Whether the receipt reports successful execution.
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("0x1")
    }
}

/// An emitted event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Emitting contract address.
    pub address: String,
    /// Indexed topics; `topics[0]` is the event signature.
    pub topics: Vec<String>,
    /// ABI-encoded unindexed fields.
    pub data: String,
}

/// Trait for reading transactions and receipts from an external ledger.
///
/// Implementations are pure reads with no side effects; every call is safe
/// to retry.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Look up a transaction by hash. `None` if the ledger has not indexed it.
    async fn transaction_by_hash(&self, hash: &TxHash) -> Result<Option<Transaction>, ChainError>;

    /// Look up the execution receipt for a transaction. `None` while pending.
    async fn transaction_receipt(
        &self,
        hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError>;
}

// ---------------------------------------------------------------------------
// HTTP JSON-RPC backend
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JsonRpcReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// Ethereum JSON-RPC client over HTTP with a bounded request timeout.
pub struct HttpRpc {
    client: reqwest::Client,
    url: String,
}

impl HttpRpc {
    /// Build a client for the given endpoint. `timeout` bounds every request;
    /// a timed-out lookup surfaces as [`ChainError::Timeout`].
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, ChainError> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        debug!(method, url = %self.url, "chain RPC call");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let reply: JsonRpcReply = response.json().await.map_err(map_reqwest_error)?;

        if let Some(err) = reply.error {
            return Err(ChainError::Rpc(format!("{} (code {})", err.message, err.code)));
        }

        match reply.result {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v)
                .map(Some)
                .map_err(|e| ChainError::Decode(e.to_string())),
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ChainError {
    if e.is_timeout() {
        ChainError::Timeout
    } else {
        ChainError::Transport(e.to_string())
    }
}

#[async_trait]
impl ChainRpc for HttpRpc {
    async fn transaction_by_hash(&self, hash: &TxHash) -> Result<Option<Transaction>, ChainError> {
        self.call("eth_getTransactionByHash", json!([hash.as_str()]))
            .await
    }

    async fn transaction_receipt(
        &self,
        hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        self.call("eth_getTransactionReceipt", json!([hash.as_str()]))
            .await
    }
}

// ---------------------------------------------------------------------------
// Mock backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    transactions: HashMap<String, Transaction>,
    receipts: HashMap<String, TransactionReceipt>,
}

/// In-memory chain double for tests. Seed it with transactions and receipts,
/// or use [`MockChain::seed_transfer`] to stage a complete successful
/// ERC-20 transfer in one call.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_transaction(&self, tx: Transaction) {
        let mut state = self.state.lock().unwrap();
        state.transactions.insert(tx.hash.clone(), tx);
    }

    pub fn insert_receipt(&self, receipt: TransactionReceipt) {
        let mut state = self.state.lock().unwrap();
        state
            .receipts
            .insert(receipt.transaction_hash.clone(), receipt);
    }

    /// Stage a confirmed `asset` transfer of `micro_amount` from `sender` to
    /// `recipient`, retrievable under `hash`.
    pub fn seed_transfer(
        &self,
        hash: &TxHash,
        asset: &Address,
        sender: &Address,
        recipient: &Address,
        micro_amount: u64,
    ) {
        self.insert_transaction(Transaction {
            hash: hash.as_str().to_string(),
            from: sender.as_str().to_string(),
            to: Some(asset.as_str().to_string()),
        });
        self.insert_receipt(TransactionReceipt {
            transaction_hash: hash.as_str().to_string(),
            status: Some("0x1".to_string()),
            logs: vec![LogEntry {
                address: asset.as_str().to_string(),
                topics: vec![
                    crate::verify::TRANSFER_EVENT_TOPIC.to_string(),
                    address_topic(sender),
                    address_topic(recipient),
                ],
                data: format!("0x{:064x}", micro_amount),
            }],
        });
    }
}

/// Encode an address as a 32-byte indexed topic (left-padded with zeros).
pub fn address_topic(address: &Address) -> String {
    format!("0x000000000000000000000000{}", &address.as_str()[2..])
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn transaction_by_hash(&self, hash: &TxHash) -> Result<Option<Transaction>, ChainError> {
        let state = self.state.lock().unwrap();
        Ok(state.transactions.get(hash.as_str()).cloned())
    }

    async fn transaction_receipt(
        &self,
        hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let state = self.state.lock().unwrap();
        Ok(state.receipts.get(hash.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(fill: char) -> Address {
        Address::parse(&format!("0x{}", fill.to_string().repeat(40))).unwrap()
    }

    fn tx_hash(fill: char) -> TxHash {
        TxHash::parse(&format!("0x{}", fill.to_string().repeat(64))).unwrap()
    }

    #[tokio::test]
    async fn mock_returns_seeded_transfer() {
        let chain = MockChain::new();
        let hash = tx_hash('1');
        chain.seed_transfer(&hash, &addr('a'), &addr('b'), &addr('c'), 50_000);

        let tx = chain.transaction_by_hash(&hash).await.unwrap().unwrap();
        assert_eq!(tx.from, addr('b').as_str());
        assert_eq!(tx.to.as_deref(), Some(addr('a').as_str()));

        let receipt = chain.transaction_receipt(&hash).await.unwrap().unwrap();
        assert!(receipt.is_success());
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].data, format!("0x{:064x}", 50_000));
    }

    #[tokio::test]
    async fn mock_returns_none_for_unknown_hash() {
        let chain = MockChain::new();
        let hash = tx_hash('9');
        assert!(chain.transaction_by_hash(&hash).await.unwrap().is_none());
        assert!(chain.transaction_receipt(&hash).await.unwrap().is_none());
    }

    #[test]
    fn address_topic_is_padded_to_32_bytes() {
        let topic = address_topic(&addr('a'));
        assert_eq!(topic.len(), 66);
        assert!(topic.starts_with("0x000000000000000000000000a"));
    }

    #[test]
    fn receipt_status_parsing() {
        let mut receipt = TransactionReceipt {
            transaction_hash: tx_hash('1').as_str().to_string(),
            status: Some("0x1".to_string()),
            logs: vec![],
        };
        assert!(receipt.is_success());
        receipt.status = Some("0x0".to_string());
        assert!(!receipt.is_success());
        receipt.status = None;
        assert!(!receipt.is_success());
    }

    #[test]
    fn receipt_deserializes_wire_shape() {
        let json = r#"{
            "transactionHash": "0xabc",
            "status": "0x1",
            "logs": [{"address": "0xdef", "topics": ["0x01"], "data": "0x00"}],
            "blockNumber": "0x10"
        }"#;
        let receipt: TransactionReceipt = serde_json::from_str(json).unwrap();
        assert!(receipt.is_success());
        assert_eq!(receipt.logs[0].address, "0xdef");
    }
}
