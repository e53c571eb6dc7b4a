//! Tip admission pipeline.
//!
//! The single authoritative path from a claimed payment to a recorded,
//! aggregated tip. Local checks run first and fail closed with a typed
//! reason; the chain lookup is the only suspension point; the ledger
//! insert's unique constraint serializes concurrent duplicate submissions.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use murmur_chain::{verify_payment, ChainRpc, VerifyError};
use murmur_core::{format_usdc, Address, TxHash};
use murmur_store::{ConfessionSnapshot, StoreError, TipRecord, TipStore};

use crate::config::TipConfig;
use crate::ratelimit::{RateDecision, RateLimiter};

/// Rate-limit action key for tip admission.
pub const TIP_ACTION: &str = "tip";

/// Why a tip request was not admitted.
///
/// These are expected outcomes, not faults: every variant except
/// `Internal` describes the caller's request. `Duplicate` means the tip is
/// already on the ledger and should read as success-adjacent: the payment
/// was counted exactly once.
#[derive(Debug, Error)]
pub enum TipRejection {
    #[error("{0}")]
    InvalidInput(String),
    #[error("tip already recorded for this transaction")]
    Duplicate,
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("confession not found")]
    SubjectNotFound,
    #[error("Cannot tip your own confession")]
    SelfTip,
    #[error("payment not verified: {0}")]
    NotVerified(#[source] VerifyError),
    #[error("payment sender does not match claimed payer")]
    SenderMismatch,
    #[error("tip amount {} is outside the allowed range", fmt_amount(.0))]
    AmountOutOfRange(u64),
    /// Unexpected storage failure. The caller may retry with the same
    /// reference; the idempotency gate makes the retry safe.
    #[error("service temporarily unavailable, try again")]
    Internal(#[source] StoreError),
}

impl TipRejection {
    /// HTTP-equivalent status class, carried as the IPC error code.
    pub fn status(&self) -> i32 {
        match self {
            Self::InvalidInput(_)
            | Self::SelfTip
            | Self::NotVerified(_)
            | Self::SenderMismatch
            | Self::AmountOutOfRange(_) => 400,
            Self::SubjectNotFound => 404,
            Self::Duplicate => 409,
            Self::RateLimited { .. } => 429,
            Self::Internal(_) => 500,
        }
    }
}

/// A successfully admitted tip: the new ledger record plus the subject's
/// updated public counters.
#[derive(Debug, Clone)]
pub struct AdmittedTip {
    pub record: TipRecord,
    pub subject: ConfessionSnapshot,
}

/// The tip admission pipeline.
pub struct TipPipeline {
    store: Arc<TipStore>,
    chain: Arc<dyn ChainRpc>,
    limiter: Arc<dyn RateLimiter>,
    config: TipConfig,
}

impl TipPipeline {
    pub fn new(
        store: Arc<TipStore>,
        chain: Arc<dyn ChainRpc>,
        limiter: Arc<dyn RateLimiter>,
        config: TipConfig,
    ) -> Self {
        Self {
            store,
            chain,
            limiter,
            config,
        }
    }

    /// Admit a claimed payment as a tip on `subject_id`.
    ///
    /// The claimed payer is used for the early self-tip check and as the
    /// rate-limit key, then re-derived from the chain: the verified sender
    /// must match the claim before anything is written.
    pub async fn admit_tip(
        &self,
        subject_id: &str,
        claimed_payer: &str,
        reference: &str,
    ) -> Result<AdmittedTip, TipRejection> {
        // Input validation.
        let subject_id = subject_id.trim();
        if subject_id.is_empty() {
            return Err(TipRejection::InvalidInput("missing subject id".into()));
        }
        let payer = Address::parse(claimed_payer).map_err(|_| {
            TipRejection::InvalidInput(
                "payer must be a 0x-prefixed 40-hex account address".into(),
            )
        })?;
        let reference = TxHash::parse(reference).map_err(|_| {
            TipRejection::InvalidInput(
                "reference must be a 0x-prefixed 64-hex transaction hash".into(),
            )
        })?;

        // Idempotency: an already-processed reference short-circuits before
        // it can burn rate budget or trigger another chain lookup.
        if self
            .store
            .find_tip_by_reference(&reference)
            .map_err(internal)?
            .is_some()
        {
            debug!(reference = %reference, "duplicate tip reference");
            return Err(TipRejection::Duplicate);
        }

        // Rate check, keyed by the claimed payer.
        if let RateDecision::Rejected { retry_after_secs } =
            self.limiter
                .check(payer.as_str(), TIP_ACTION, &self.config.rate_policy)
        {
            return Err(TipRejection::RateLimited { retry_after_secs });
        }

        // Subject resolution.
        let subject = self
            .store
            .confession(subject_id)
            .map_err(internal)?
            .ok_or(TipRejection::SubjectNotFound)?;

        // Fast-fail self-tips on the claim; the verified sender is checked
        // below, so a spoofed claim cannot slip through here.
        if subject.owner_address == payer {
            debug!(subject = %subject.id, payer = %payer, "self-tip rejected");
            return Err(TipRejection::SelfTip);
        }

        // Chain verification: ground truth for sender and amount.
        let payment = verify_payment(self.chain.as_ref(), &reference, &self.config.asset_address)
            .await
            .map_err(|e| {
                debug!(reference = %reference, error = %e, "payment verification failed");
                TipRejection::NotVerified(e)
            })?;

        // The verified sender must be the claimed payer.
        if payment.sender != payer {
            warn!(
                claimed = %payer,
                verified = %payment.sender,
                reference = %reference,
                "verified sender does not match claimed payer"
            );
            return Err(TipRejection::SenderMismatch);
        }

        // Amount bounds, inclusive on both ends.
        if payment.amount < self.config.min_tip_micro
            || payment.amount > self.config.max_tip_micro
        {
            return Err(TipRejection::AmountOutOfRange(payment.amount));
        }

        // Both actor rows must exist before the increments below.
        self.store.get_or_create_user(&payer).map_err(internal)?;
        self.store
            .get_or_create_user(&subject.owner_address)
            .map_err(internal)?;

        // Record on the ledger. Losing an insert race against a concurrent
        // identical request folds into the duplicate outcome.
        let record = match self
            .store
            .insert_tip(&subject.id, &payer, payment.amount, &reference)
        {
            Ok(record) => record,
            Err(StoreError::DuplicateReference) => {
                debug!(reference = %reference, "lost insert race, folding to duplicate");
                return Err(TipRejection::Duplicate);
            }
            Err(e) => {
                error!(
                    subject = %subject.id,
                    payer = %payer,
                    reference = %reference,
                    amount = payment.amount,
                    error = %e,
                    "ledger insert failed"
                );
                return Err(TipRejection::Internal(e));
            }
        };

        // Aggregate increments. Past the ledger insert, a failure leaves the
        // ledger ahead of the counters: logged at error and surfaced as
        // retriable, with the reconciler as the repair path. Never reported
        // as success.
        if let Err(e) = self.apply_increments(&subject.id, &subject.owner_address, &payer, payment.amount) {
            error!(
                subject = %subject.id,
                payer = %payer,
                reference = %reference,
                amount = payment.amount,
                error = %e,
                "aggregate update failed after ledger insert"
            );
            return Err(TipRejection::Internal(e));
        }

        let updated = self
            .store
            .confession(&subject.id)
            .map_err(internal)?
            .ok_or_else(|| {
                internal(StoreError::MissingRow(format!("confession {}", subject.id)))
            })?;

        info!(
            reference = %reference,
            subject = %subject.id,
            payer = %payer,
            amount = payment.amount,
            "tip admitted"
        );

        Ok(AdmittedTip {
            record,
            subject: updated.snapshot(),
        })
    }

    fn apply_increments(
        &self,
        subject_id: &str,
        owner: &Address,
        payer: &Address,
        amount: u64,
    ) -> Result<(), StoreError> {
        self.store.increment_confession_tips(subject_id, amount)?;
        self.store.increment_user_tips_given(payer, amount)?;
        self.store.increment_user_tips_received(owner, amount)?;
        Ok(())
    }
}

fn internal(e: StoreError) -> TipRejection {
    error!(error = %e, "unexpected storage failure in tip pipeline");
    TipRejection::Internal(e)
}

fn fmt_amount(micro: &u64) -> String {
    format_usdc(*micro)
}
