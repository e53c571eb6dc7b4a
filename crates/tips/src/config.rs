//! Pipeline configuration.

use murmur_core::{Address, USDC_ONE};

use crate::ratelimit::RatePolicy;

/// USDC contract on Base, the default payment asset.
pub const DEFAULT_ASSET_ADDRESS: &str = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";

/// Smallest accepted tip: 0.001 USDC. Keeps dust spam off the ledger.
pub const MIN_TIP_MICRO: u64 = 1_000;

/// Largest accepted tip: 1 USDC. Keeps one whale tip from dominating
/// leaderboard ranking.
pub const MAX_TIP_MICRO: u64 = USDC_ONE;

/// Default tip allowance per payer per window.
pub const DEFAULT_MAX_TIPS_PER_WINDOW: u32 = 50;

/// Default rate window: 24 hours.
pub const DEFAULT_RATE_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

/// Configuration for the tip admission pipeline.
#[derive(Debug, Clone)]
pub struct TipConfig {
    /// The asset contract expected to have moved funds.
    pub asset_address: Address,
    /// Inclusive lower bound on verified amounts, micro-USDC.
    pub min_tip_micro: u64,
    /// Inclusive upper bound on verified amounts, micro-USDC.
    pub max_tip_micro: u64,
    /// Per-payer admission policy.
    pub rate_policy: RatePolicy,
    /// How often the reconciler recomputes aggregates from the ledger.
    pub reconcile_interval_secs: u64,
}

impl Default for TipConfig {
    fn default() -> Self {
        Self {
            asset_address: Address::parse(DEFAULT_ASSET_ADDRESS).expect("valid asset constant"),
            min_tip_micro: MIN_TIP_MICRO,
            max_tip_micro: MAX_TIP_MICRO,
            rate_policy: RatePolicy {
                max_per_window: DEFAULT_MAX_TIPS_PER_WINDOW,
                window_ms: DEFAULT_RATE_WINDOW_MS,
            },
            reconcile_interval_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = TipConfig::default();
        assert_eq!(cfg.asset_address.as_str(), DEFAULT_ASSET_ADDRESS);
        assert_eq!(cfg.min_tip_micro, 1_000);
        assert_eq!(cfg.max_tip_micro, 1_000_000);
        assert_eq!(cfg.rate_policy.max_per_window, 50);
        assert_eq!(cfg.rate_policy.window_ms, 86_400_000);
    }
}
