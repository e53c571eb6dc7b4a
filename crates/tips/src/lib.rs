//! Murmur Tips
//!
//! The admission pipeline that turns a claimed on-chain payment into a
//! recorded, aggregated tip: validate the request, dedupe against the
//! ledger, rate-limit the payer, verify the payment on chain, enforce
//! business rules, append to the ledger, and bump the derived counters.
//!
//! Also home to the fixed-window rate limiter, the confession-intake
//! service, and the job that reconciles aggregates against the ledger.

pub mod admission;
pub mod config;
pub mod confessions;
pub mod ratelimit;
pub mod reconcile;

pub use admission::{AdmittedTip, TipPipeline, TipRejection};
pub use config::TipConfig;
pub use confessions::{
    Classifier, ClassifierError, ConfessionError, ConfessionService, Moderation,
    PermissiveClassifier, UserProfile,
};
pub use ratelimit::{MemoryRateLimiter, RateDecision, RateLimiter, RatePolicy};
pub use reconcile::{reconcile_once, run_reconciler};
