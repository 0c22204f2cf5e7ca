//! Runtime configuration for every subsystem.
//!
//! All knobs deserialize from the caller's config source (JSON, TOML via
//! serde value, whatever the orchestration layer prefers) and carry
//! conservative defaults. Per-domain override maps let one engine instance
//! treat hostile domains more gently than friendly ones. Scoring weights are
//! runtime data, never hardcoded, so campaigns can bias business vs.
//! personal outreach without a rebuild.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Bounds for one scroll-acquisition call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Hard iteration ceiling; the strategy is consulted at most this many
    /// times plus one.
    pub max_iterations: u32,
    /// Consecutive iterations with an unchanged container height that mean
    /// "no more content".
    pub stable_height_count: u32,
    /// Wall-clock budget for the whole call.
    pub timeout_secs: u64,
    /// Viewport height in px, used by the chunk strategy for jump sizing.
    pub viewport_height: u32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            stable_height_count: 3,
            timeout_secs: 90,
            viewport_height: 900,
        }
    }
}

impl ScrollConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Weights for the combined contact score. Clipped to [0,1] after summing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub quality: f64,
    pub business: f64,
    pub personal: f64,
    /// Combined score at or above this (plus syntactic validity) marks a
    /// contact actionable.
    pub actionable_threshold: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            quality: 0.5,
            business: 0.35,
            personal: 0.15,
            actionable_threshold: 0.45,
        }
    }
}

/// Explicit retry policy threaded through the work queue's fail path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts including the first. Beyond this a retryable failure becomes
    /// terminal.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for the given (1-based) attempt number.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .base_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Sliding-window ceiling for one rate-limit group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 10,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Inclusive jitter range in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }
}

/// Per-domain pacing parameters handed out with a session lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StealthParams {
    pub navigate_delay: DelayRange,
    pub scroll_delay: DelayRange,
    pub read_delay: DelayRange,
    pub probe_delay: DelayRange,
}

impl Default for StealthParams {
    fn default() -> Self {
        Self {
            navigate_delay: DelayRange::new(1_200, 3_500),
            scroll_delay: DelayRange::new(600, 1_800),
            read_delay: DelayRange::new(150, 450),
            probe_delay: DelayRange::new(4_000, 9_000),
        }
    }
}

/// Circuit breaker and lease limits for the session supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Rolling outcome window per domain.
    pub window_size: usize,
    /// Failure rate over the window that opens the circuit. Requires at
    /// least `window_size` recorded outcomes before it can trip.
    pub failure_threshold: f64,
    /// Initial open-state cooldown.
    pub cooldown_secs: u64,
    /// Cap for the doubled cooldown after repeated probe failures.
    pub cooldown_cap_secs: u64,
    /// Concurrent leases per domain (K).
    pub max_leases_per_domain: usize,
    /// How long `authorize` waits for a lease before giving up.
    pub lease_timeout_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            failure_threshold: 0.5,
            cooldown_secs: 30,
            cooldown_cap_secs: 480,
            max_leases_per_domain: 2,
            lease_timeout_secs: 30,
        }
    }
}

/// Read-only per-domain overrides supplied by the configuration source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainOverrides {
    pub stealth: Option<StealthParams>,
    /// Per-domain request ceiling, enforced by the session supervisor at
    /// authorization time.
    pub rate_limit: Option<RateLimitConfig>,
    pub scoring: Option<ScoringWeights>,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scroll: ScrollConfig,
    pub scoring: ScoringWeights,
    pub retry: RetryPolicy,
    pub supervisor: SupervisorConfig,
    /// Ceilings keyed by rate-limit group name (one per search engine).
    pub rate_limits: HashMap<String, RateLimitConfig>,
    pub domain_overrides: HashMap<String, DomainOverrides>,
    /// Bounded page set for a site hunt; navigation stops here regardless of
    /// what the planner still wants to visit.
    pub max_pages_per_site: u32,
}

impl EngineConfig {
    /// Scoring weights for a domain, falling back to the campaign defaults.
    pub fn weights_for(&self, domain: &str) -> ScoringWeights {
        self.domain_overrides
            .get(domain)
            .and_then(|o| o.scoring)
            .unwrap_or(self.scoring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_backoff_ms: 1_000,
            max_backoff_ms: 5_000,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(3), Duration::from_millis(4_000));
        assert_eq!(policy.backoff(4), Duration::from_millis(5_000));
        assert_eq!(policy.backoff(10), Duration::from_millis(5_000));
    }

    #[test]
    fn domain_override_wins_over_default() {
        let mut config = EngineConfig::default();
        config.domain_overrides.insert(
            "slow.example".into(),
            DomainOverrides {
                scoring: Some(ScoringWeights {
                    actionable_threshold: 0.9,
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        assert_eq!(config.weights_for("slow.example").actionable_threshold, 0.9);
        assert_eq!(
            config.weights_for("other.example").actionable_threshold,
            ScoringWeights::default().actionable_threshold
        );
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scroll.max_iterations, config.scroll.max_iterations);
        assert_eq!(back.retry.max_attempts, config.retry.max_attempts);
    }
}
