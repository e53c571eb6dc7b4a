//! Murmur Chain
//!
//! Independent verification of claimed on-chain payments. Given a transaction
//! reference, the verifier re-derives ground truth from the external ledger:
//! sender, destination contract, and transferred amount, without trusting
//! anything the client claimed.
//!
//! The RPC backend is pluggable: [`HttpRpc`] speaks Ethereum JSON-RPC over
//! HTTP, [`MockChain`] is a seedable in-memory double for tests.

pub mod rpc;
pub mod verify;

pub use rpc::{ChainError, ChainRpc, HttpRpc, LogEntry, MockChain, Transaction, TransactionReceipt};
pub use verify::{verify_payment, VerifiedPayment, VerifyError, TRANSFER_EVENT_TOPIC};
