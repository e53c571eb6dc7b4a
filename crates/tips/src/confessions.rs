//! Confession intake and read surfaces.
//!
//! Posting runs: validate → rate-check the author → classify → store. The
//! classifier is an external collaborator behind a trait; if it is
//! unreachable the confession is stored flagged rather than dropped, so a
//! moderation outage never loses content or publishes unreviewed posts.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use murmur_core::{format_usdc, Address};
use murmur_store::{ConfessionSnapshot, StoreError, TipStore};

use crate::ratelimit::{RateDecision, RateLimiter, RatePolicy};

/// Rate-limit action key for posting confessions.
pub const CONFESS_ACTION: &str = "confess";

/// Maximum confession length in characters.
pub const MAX_CONFESSION_CHARS: usize = 280;

/// Default posting allowance: 10 confessions per author per 24 hours.
pub const DEFAULT_POST_POLICY: RatePolicy = RatePolicy {
    max_per_window: 10,
    window_ms: 24 * 60 * 60 * 1000,
};

/// Classification result for a confession body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Moderation {
    pub flagged: bool,
    pub category: String,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// Black-box content classifier. The production model runs behind an
/// external service; tests and single-node setups plug in local impls.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, body: &str) -> Result<Moderation, ClassifierError>;
}

/// Classifier that flags nothing and files everything under `"general"`.
#[derive(Default)]
pub struct PermissiveClassifier;

#[async_trait]
impl Classifier for PermissiveClassifier {
    async fn classify(&self, _body: &str) -> Result<Moderation, ClassifierError> {
        Ok(Moderation {
            flagged: false,
            category: "general".to_string(),
        })
    }
}

/// Why a confession request failed.
#[derive(Debug, Error)]
pub enum ConfessionError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("service temporarily unavailable, try again")]
    Internal(#[source] StoreError),
}

impl ConfessionError {
    /// HTTP-equivalent status class, carried as the IPC error code.
    pub fn status(&self) -> i32 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::RateLimited { .. } => 429,
            Self::Internal(_) => 500,
        }
    }
}

/// Public per-address profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub address: Address,
    /// Decimal USDC string.
    pub total_tips_given: String,
    /// Decimal USDC string.
    pub total_tips_received: String,
    pub referral_code: String,
}

/// Confession intake and reads.
pub struct ConfessionService {
    store: Arc<TipStore>,
    classifier: Arc<dyn Classifier>,
    limiter: Arc<dyn RateLimiter>,
    post_policy: RatePolicy,
}

impl ConfessionService {
    pub fn new(
        store: Arc<TipStore>,
        classifier: Arc<dyn Classifier>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            store,
            classifier,
            limiter,
            post_policy: DEFAULT_POST_POLICY,
        }
    }

    pub fn with_post_policy(mut self, policy: RatePolicy) -> Self {
        self.post_policy = policy;
        self
    }

    /// Post a new confession. Returns the public snapshot; the owner
    /// address never leaves the store.
    pub async fn submit(
        &self,
        owner: &str,
        body: &str,
    ) -> Result<ConfessionSnapshot, ConfessionError> {
        let owner = Address::parse(owner).map_err(|_| {
            ConfessionError::InvalidInput(
                "owner must be a 0x-prefixed 40-hex account address".into(),
            )
        })?;

        let body = body.trim();
        if body.is_empty() {
            return Err(ConfessionError::InvalidInput("confession is empty".into()));
        }
        if body.chars().count() > MAX_CONFESSION_CHARS {
            return Err(ConfessionError::InvalidInput(format!(
                "confession is longer than {} characters",
                MAX_CONFESSION_CHARS
            )));
        }

        if let RateDecision::Rejected { retry_after_secs } =
            self.limiter
                .check(owner.as_str(), CONFESS_ACTION, &self.post_policy)
        {
            return Err(ConfessionError::RateLimited { retry_after_secs });
        }

        // Fail closed on classifier outages: store flagged, never publish
        // unreviewed content.
        let moderation = match self.classifier.classify(body).await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "classifier unavailable, storing flagged");
                Moderation {
                    flagged: true,
                    category: "unreviewed".to_string(),
                }
            }
        };

        self.store
            .get_or_create_user(&owner)
            .map_err(ConfessionError::Internal)?;
        let confession = self
            .store
            .insert_confession(&owner, body, &moderation.category, moderation.flagged)
            .map_err(ConfessionError::Internal)?;

        info!(
            confession = %confession.id,
            category = %confession.category,
            flagged = confession.flagged,
            "confession posted"
        );
        Ok(confession.snapshot())
    }

    /// Public view of one confession.
    pub fn get(&self, id: &str) -> Result<Option<ConfessionSnapshot>, ConfessionError> {
        let confession = self
            .store
            .confession(id)
            .map_err(ConfessionError::Internal)?;
        Ok(confession.map(|c| c.snapshot()))
    }

    /// The most-tipped confessions.
    pub fn top(&self, limit: u32) -> Result<Vec<ConfessionSnapshot>, ConfessionError> {
        let confessions = self
            .store
            .top_confessions(limit)
            .map_err(ConfessionError::Internal)?;
        debug!(count = confessions.len(), "top confessions loaded");
        Ok(confessions.iter().map(|c| c.snapshot()).collect())
    }

    /// Public profile for an address.
    pub fn user_profile(&self, address: &str) -> Result<Option<UserProfile>, ConfessionError> {
        let address = Address::parse(address).map_err(|_| {
            ConfessionError::InvalidInput(
                "address must be a 0x-prefixed 40-hex account address".into(),
            )
        })?;
        let user = self.store.user(&address).map_err(ConfessionError::Internal)?;
        Ok(user.map(|u| UserProfile {
            address: u.address,
            total_tips_given: format_usdc(u.total_tips_given),
            total_tips_received: format_usdc(u.total_tips_received),
            referral_code: u.referral_code,
        }))
    }
}
