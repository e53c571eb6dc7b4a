//! Stored record types.

use serde::{Deserialize, Serialize};

use murmur_core::{format_usdc, Address, TxHash};

/// A confession row, including the private owner address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confession {
    pub id: String,
    /// Author's address. Used for self-tip rejection and payout routing;
    /// never serialized into responses.
    pub owner_address: Address,
    pub body: String,
    pub category: String,
    pub flagged: bool,
    /// Sum of all tip amounts, micro-USDC.
    pub total_tips: u64,
    pub tip_count: u64,
    pub created_at: i64,
}

impl Confession {
    /// The externally visible view: no owner address, amount formatted.
    pub fn snapshot(&self) -> ConfessionSnapshot {
        ConfessionSnapshot {
            id: self.id.clone(),
            body: self.body.clone(),
            category: self.category.clone(),
            flagged: self.flagged,
            total_tips: format_usdc(self.total_tips),
            tip_count: self.tip_count,
            created_at: self.created_at,
        }
    }
}

/// Public confession view returned over IPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfessionSnapshot {
    pub id: String,
    pub body: String,
    pub category: String,
    pub flagged: bool,
    /// Decimal USDC string ("0.050000").
    pub total_tips: String,
    pub tip_count: u64,
    pub created_at: i64,
}

/// Per-address statistics, created lazily on first reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub address: Address,
    /// Micro-USDC this address has tipped out.
    pub total_tips_given: u64,
    /// Micro-USDC received across this address's confessions.
    pub total_tips_received: u64,
    pub referral_code: String,
    pub created_at: i64,
}

/// One verified payment event. Append-only; never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipRecord {
    pub id: String,
    pub confession_id: String,
    /// The chain-verified sender of the funds.
    pub payer_address: Address,
    /// Micro-USDC.
    pub amount: u64,
    /// Unique payment reference; the idempotency key.
    pub tx_hash: TxHash,
    pub created_at: i64,
}
