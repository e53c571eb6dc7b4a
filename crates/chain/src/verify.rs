//! Payment verification against the external ledger.
//!
//! Establishes ground truth for a claimed payment: the transaction must
//! exist, have executed successfully, target the expected asset contract,
//! and carry a well-formed Transfer event emitted by that contract. The
//! sender and amount are taken from the decoded event, never from the
//! caller.

use thiserror::Error;
use tracing::debug;

use murmur_core::{Address, TxHash};

use crate::rpc::{ChainError, ChainRpc, LogEntry};

/// keccak256 of `Transfer(address,address,uint256)`.
pub const TRANSFER_EVENT_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Why a claimed payment could not be verified.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("transaction not found on chain")]
    NotFound,
    #[error("transaction not confirmed")]
    NotConfirmed,
    #[error("transaction target is not the payment asset")]
    WrongDestination,
    #[error("no transfer event from the payment asset")]
    NoTransferFound,
    #[error("malformed transfer event: {0}")]
    DecodeError(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Ground truth extracted from a verified payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    /// The account that actually sent the funds.
    pub sender: Address,
    /// The account the funds went to (informational; not policy-checked).
    pub recipient: Address,
    /// Transferred amount in micro-units (the asset's 6-decimal raw value).
    pub amount: u64,
}

/// Verify a claimed payment reference against the chain.
///
/// A pure read: no side effects, safe to retry with the same reference.
pub async fn verify_payment(
    rpc: &dyn ChainRpc,
    reference: &TxHash,
    expected_asset: &Address,
) -> Result<VerifiedPayment, VerifyError> {
    let tx = rpc
        .transaction_by_hash(reference)
        .await?
        .ok_or(VerifyError::NotFound)?;

    let receipt = rpc
        .transaction_receipt(reference)
        .await?
        .ok_or(VerifyError::NotConfirmed)?;
    if !receipt.is_success() {
        return Err(VerifyError::NotConfirmed);
    }

    // Target check. `to` is absent for contract creations, which can never
    // be a payment to the asset contract.
    let to = tx.to.as_deref().ok_or(VerifyError::WrongDestination)?;
    if !to.eq_ignore_ascii_case(expected_asset.as_str()) {
        return Err(VerifyError::WrongDestination);
    }

    let log = receipt
        .logs
        .iter()
        .find(|log| {
            log.address.eq_ignore_ascii_case(expected_asset.as_str())
                && log
                    .topics
                    .first()
                    .is_some_and(|t| t.eq_ignore_ascii_case(TRANSFER_EVENT_TOPIC))
        })
        .ok_or(VerifyError::NoTransferFound)?;

    let (sender, recipient, amount) = decode_transfer_log(log)?;

    debug!(
        reference = %reference,
        sender = %sender,
        amount,
        "payment verified on chain"
    );

    Ok(VerifiedPayment {
        sender,
        recipient,
        amount,
    })
}

/// Decode a Transfer event: indexed `from` and `to` topics plus a single
/// uint256 amount word in the data field.
fn decode_transfer_log(log: &LogEntry) -> Result<(Address, Address, u64), VerifyError> {
    if log.topics.len() != 3 {
        return Err(VerifyError::DecodeError(format!(
            "expected 3 topics, got {}",
            log.topics.len()
        )));
    }

    let sender = address_from_topic(&log.topics[1])?;
    let recipient = address_from_topic(&log.topics[2])?;
    let amount = amount_from_data(&log.data)?;

    Ok((sender, recipient, amount))
}

/// Extract an address from a 32-byte indexed topic. The high 12 bytes are
/// zero padding.
fn address_from_topic(topic: &str) -> Result<Address, VerifyError> {
    let hex_part = topic
        .strip_prefix("0x")
        .ok_or_else(|| VerifyError::DecodeError("topic missing 0x prefix".into()))?;

    let bytes = hex::decode(hex_part)
        .map_err(|e| VerifyError::DecodeError(format!("bad topic hex: {}", e)))?;
    if bytes.len() != 32 {
        return Err(VerifyError::DecodeError(format!(
            "topic is {} bytes, expected 32",
            bytes.len()
        )));
    }
    if bytes[..12].iter().any(|&b| b != 0) {
        return Err(VerifyError::DecodeError("non-zero address padding".into()));
    }

    Address::parse(&format!("0x{}", hex::encode(&bytes[12..])))
        .map_err(|e| VerifyError::DecodeError(e.to_string()))
}

/// Extract the uint256 amount word. The asset uses 6 decimals, so the raw
/// integer is already in micro-units; it must fit in u64.
fn amount_from_data(data: &str) -> Result<u64, VerifyError> {
    let hex_part = data
        .strip_prefix("0x")
        .ok_or_else(|| VerifyError::DecodeError("data missing 0x prefix".into()))?;

    let bytes = hex::decode(hex_part)
        .map_err(|e| VerifyError::DecodeError(format!("bad data hex: {}", e)))?;
    if bytes.len() != 32 {
        return Err(VerifyError::DecodeError(format!(
            "data is {} bytes, expected 32",
            bytes.len()
        )));
    }
    if bytes[..24].iter().any(|&b| b != 0) {
        return Err(VerifyError::DecodeError("amount exceeds u64 range".into()));
    }

    let word: [u8; 8] = bytes[24..].try_into().expect("8-byte slice");
    Ok(u64::from_be_bytes(word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{address_topic, MockChain, Transaction, TransactionReceipt};

    fn addr(fill: char) -> Address {
        Address::parse(&format!("0x{}", fill.to_string().repeat(40))).unwrap()
    }

    fn tx_hash(fill: char) -> TxHash {
        TxHash::parse(&format!("0x{}", fill.to_string().repeat(64))).unwrap()
    }

    fn transfer_log(asset: &Address, from: &Address, to: &Address, amount: u64) -> LogEntry {
        LogEntry {
            address: asset.as_str().to_string(),
            topics: vec![
                TRANSFER_EVENT_TOPIC.to_string(),
                address_topic(from),
                address_topic(to),
            ],
            data: format!("0x{:064x}", amount),
        }
    }

    #[tokio::test]
    async fn verifies_seeded_transfer() {
        let chain = MockChain::new();
        let hash = tx_hash('1');
        let (asset, payer, treasury) = (addr('a'), addr('b'), addr('c'));
        chain.seed_transfer(&hash, &asset, &payer, &treasury, 50_000);

        let payment = verify_payment(&chain, &hash, &asset).await.unwrap();
        assert_eq!(payment.sender, payer);
        assert_eq!(payment.recipient, treasury);
        assert_eq!(payment.amount, 50_000);
    }

    #[tokio::test]
    async fn missing_transaction_is_not_found() {
        let chain = MockChain::new();
        let result = verify_payment(&chain, &tx_hash('1'), &addr('a')).await;
        assert!(matches!(result, Err(VerifyError::NotFound)));
    }

    #[tokio::test]
    async fn missing_receipt_is_not_confirmed() {
        let chain = MockChain::new();
        let hash = tx_hash('1');
        chain.insert_transaction(Transaction {
            hash: hash.as_str().to_string(),
            from: addr('b').as_str().to_string(),
            to: Some(addr('a').as_str().to_string()),
        });

        let result = verify_payment(&chain, &hash, &addr('a')).await;
        assert!(matches!(result, Err(VerifyError::NotConfirmed)));
    }

    #[tokio::test]
    async fn reverted_transaction_is_not_confirmed() {
        let chain = MockChain::new();
        let hash = tx_hash('1');
        let (asset, payer, treasury) = (addr('a'), addr('b'), addr('c'));
        chain.seed_transfer(&hash, &asset, &payer, &treasury, 50_000);
        chain.insert_receipt(TransactionReceipt {
            transaction_hash: hash.as_str().to_string(),
            status: Some("0x0".to_string()),
            logs: vec![],
        });

        let result = verify_payment(&chain, &hash, &asset).await;
        assert!(matches!(result, Err(VerifyError::NotConfirmed)));
    }

    #[tokio::test]
    async fn wrong_target_contract_is_rejected() {
        let chain = MockChain::new();
        let hash = tx_hash('1');
        let other_contract = addr('d');
        chain.seed_transfer(&hash, &other_contract, &addr('b'), &addr('c'), 50_000);

        let result = verify_payment(&chain, &hash, &addr('a')).await;
        assert!(matches!(result, Err(VerifyError::WrongDestination)));
    }

    #[tokio::test]
    async fn asset_match_ignores_case() {
        let chain = MockChain::new();
        let hash = tx_hash('1');
        let asset = Address::parse("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap();
        chain.seed_transfer(&hash, &asset, &addr('b'), &addr('c'), 50_000);

        // Same contract, different case on the expected side.
        let expected = Address::parse("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let payment = verify_payment(&chain, &hash, &expected).await.unwrap();
        assert_eq!(payment.amount, 50_000);
    }

    #[tokio::test]
    async fn receipt_without_transfer_event_is_rejected() {
        let chain = MockChain::new();
        let hash = tx_hash('1');
        let asset = addr('a');
        chain.insert_transaction(Transaction {
            hash: hash.as_str().to_string(),
            from: addr('b').as_str().to_string(),
            to: Some(asset.as_str().to_string()),
        });
        // Success receipt whose only log is from an unrelated contract.
        chain.insert_receipt(TransactionReceipt {
            transaction_hash: hash.as_str().to_string(),
            status: Some("0x1".to_string()),
            logs: vec![transfer_log(&addr('d'), &addr('b'), &addr('c'), 50_000)],
        });

        let result = verify_payment(&chain, &hash, &asset).await;
        assert!(matches!(result, Err(VerifyError::NoTransferFound)));
    }

    #[tokio::test]
    async fn malformed_event_data_is_decode_error() {
        let chain = MockChain::new();
        let hash = tx_hash('1');
        let asset = addr('a');
        chain.insert_transaction(Transaction {
            hash: hash.as_str().to_string(),
            from: addr('b').as_str().to_string(),
            to: Some(asset.as_str().to_string()),
        });
        let mut log = transfer_log(&asset, &addr('b'), &addr('c'), 50_000);
        log.data = "0xdeadbeef".to_string(); // not a 32-byte word
        chain.insert_receipt(TransactionReceipt {
            transaction_hash: hash.as_str().to_string(),
            status: Some("0x1".to_string()),
            logs: vec![log],
        });

        let result = verify_payment(&chain, &hash, &asset).await;
        assert!(matches!(result, Err(VerifyError::DecodeError(_))));
    }

    #[tokio::test]
    async fn oversized_amount_is_decode_error() {
        let chain = MockChain::new();
        let hash = tx_hash('1');
        let asset = addr('a');
        chain.insert_transaction(Transaction {
            hash: hash.as_str().to_string(),
            from: addr('b').as_str().to_string(),
            to: Some(asset.as_str().to_string()),
        });
        let mut log = transfer_log(&asset, &addr('b'), &addr('c'), 1);
        log.data = format!("0x{}", "ff".repeat(32)); // u256::MAX
        chain.insert_receipt(TransactionReceipt {
            transaction_hash: hash.as_str().to_string(),
            status: Some("0x1".to_string()),
            logs: vec![log],
        });

        let result = verify_payment(&chain, &hash, &asset).await;
        assert!(matches!(result, Err(VerifyError::DecodeError(_))));
    }

    #[test]
    fn amount_decoding_boundaries() {
        assert_eq!(amount_from_data(&format!("0x{:064x}", 0u64)).unwrap(), 0);
        assert_eq!(
            amount_from_data(&format!("0x{:064x}", u64::MAX as u128)).unwrap(),
            u64::MAX
        );
        assert!(amount_from_data("0x").is_err());
        assert!(amount_from_data(&format!("0x{:063x}", 0)).is_err());
    }

    #[test]
    fn topic_decoding_rejects_bad_padding() {
        let mut topic = address_topic(&addr('b'));
        // Corrupt a padding nibble.
        topic.replace_range(2..3, "1");
        assert!(address_from_topic(&topic).is_err());
    }
}
