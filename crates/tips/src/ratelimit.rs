//! Per-actor admission control.
//!
//! A fixed-window counter keyed by `(actor, action)`. The window does not
//! slide: a burst straddling a window boundary can admit up to twice the
//! limit across the edge. That tradeoff is intentional: the counter is one
//! map entry per key and one comparison per check.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Admission policy for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicy {
    /// Requests admitted per window.
    pub max_per_window: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admitted,
    Rejected { retry_after_secs: u64 },
}

/// Per-actor admission control behind a trait, so a shared counter store
/// can replace the in-process map in multi-instance deployments.
pub trait RateLimiter: Send + Sync {
    fn check(&self, actor: &str, action: &str, policy: &RatePolicy) -> RateDecision;
}

struct Window {
    count: u32,
    reset_at_ms: u64,
}

/// In-process fixed-window limiter. State lives in a process-wide map and
/// does not survive restarts.
#[derive(Default)]
pub struct MemoryRateLimiter {
    windows: Mutex<HashMap<(String, String), Window>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check against an explicit clock. Tests drive this directly; `check`
    /// supplies the wall clock.
    pub fn check_at(
        &self,
        actor: &str,
        action: &str,
        policy: &RatePolicy,
        now_ms: u64,
    ) -> RateDecision {
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry((actor.to_string(), action.to_string()))
            .or_insert(Window {
                count: 0,
                reset_at_ms: now_ms + policy.window_ms,
            });

        if now_ms >= window.reset_at_ms {
            window.count = 0;
            window.reset_at_ms = now_ms + policy.window_ms;
        }

        if window.count >= policy.max_per_window {
            let retry_after_secs = (window.reset_at_ms - now_ms).div_ceil(1000);
            debug!(actor, action, retry_after_secs, "rate limit exceeded");
            return RateDecision::Rejected { retry_after_secs };
        }

        window.count += 1;
        RateDecision::Admitted
    }
}

impl RateLimiter for MemoryRateLimiter {
    fn check(&self, actor: &str, action: &str, policy: &RatePolicy) -> RateDecision {
        self.check_at(actor, action, policy, now_ms())
    }
}

/// Current unix timestamp in milliseconds.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
