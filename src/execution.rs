//! Execution Service (spec §4.12): the retry scheduler guarding against
//! hammering the same position after a failed attempt. Grounded on
//! `circuit_breaker::CircuitBreaker`'s `Arc<RwLock<...>>`-guarded shared
//! state for the per-key map, with exponential backoff plus jitter borrowed
//! from the wider example pack's retry conventions (`rand` is the same
//! crate `dawsh2-Torq` reaches for).

use crate::types::RetryState;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

pub struct ExecutionService {
    retry_states: RwLock<HashMap<String, RetryState>>,
    success_cooldowns: RwLock<HashMap<String, DateTime<Utc>>>,
    max_retries: u32,
    base_retry_delay_ms: u64,
    max_retry_delay_ms: u64,
    success_cooldown_ms: u64,
}

impl ExecutionService {
    pub fn new(max_retries: u32, base_retry_delay_ms: u64, max_retry_delay_ms: u64, success_cooldown_ms: u64) -> Self {
        Self {
            retry_states: RwLock::new(HashMap::new()),
            success_cooldowns: RwLock::new(HashMap::new()),
            max_retries,
            base_retry_delay_ms,
            max_retry_delay_ms,
            success_cooldown_ms,
        }
    }

    /// True while `key` is within its post-success refractory period.
    pub fn is_in_cooldown(&self, key: &str) -> bool {
        self.success_cooldowns
            .read()
            .unwrap()
            .get(key)
            .map(|until| Utc::now() < *until)
            .unwrap_or(false)
    }

    /// True when `key` has a scheduled retry that hasn't come due yet.
    pub fn is_backing_off(&self, key: &str) -> bool {
        self.retry_states
            .read()
            .unwrap()
            .get(key)
            .map(|state| Utc::now() < state.next_retry_at)
            .unwrap_or(false)
    }

    /// Bumps the retry counter for `key`. Returns `true` if another attempt
    /// was scheduled, `false` if `max_retries` was exceeded and the key was
    /// dropped (giving up on this position until something else re-triggers it).
    pub fn schedule_retry(&self, key: &str, reason: &str) -> bool {
        let mut states = self.retry_states.write().unwrap();
        let retry_count = states.get(key).map(|s| s.retry_count).unwrap_or(0) + 1;

        if retry_count > self.max_retries {
            states.remove(key);
            info!(key, retry_count, "giving up after exceeding max retries");
            return false;
        }

        let base_delay = self
            .base_retry_delay_ms
            .saturating_mul(1u64 << (retry_count - 1).min(32))
            .min(self.max_retry_delay_ms);
        let jitter_fraction: f64 = rand::thread_rng().gen_range(0.0..0.20);
        let jittered_delay = (base_delay as f64 * (1.0 + jitter_fraction)) as i64;

        let next_retry_at = Utc::now() + ChronoDuration::milliseconds(jittered_delay);
        debug!(key, retry_count, jittered_delay, %reason, "scheduling retry");

        states.insert(
            key.to_string(),
            RetryState {
                retry_count,
                next_retry_at,
                last_error: reason.to_string(),
            },
        );
        true
    }

    /// Clears any retry bookkeeping for `key` and enters its success cooldown.
    pub fn record_success(&self, key: &str) {
        self.retry_states.write().unwrap().remove(key);
        self.success_cooldowns.write().unwrap().insert(
            key.to_string(),
            Utc::now() + ChronoDuration::milliseconds(self.success_cooldown_ms as i64),
        );
    }

    pub fn retry_count(&self, key: &str) -> u32 {
        self.retry_states.read().unwrap().get(key).map(|s| s.retry_count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_retry_gives_up_after_max_retries() {
        let service = ExecutionService::new(2, 100, 10_000, 5_000);
        assert!(service.schedule_retry("k", "timeout"));
        assert!(service.schedule_retry("k", "timeout"));
        assert!(!service.schedule_retry("k", "timeout"));
        assert_eq!(service.retry_count("k"), 0);
    }

    #[test]
    fn success_clears_retry_state_and_enters_cooldown() {
        let service = ExecutionService::new(5, 100, 10_000, 60_000);
        service.schedule_retry("k", "reverted");
        assert!(service.retry_count("k") > 0);
        service.record_success("k");
        assert_eq!(service.retry_count("k"), 0);
        assert!(service.is_in_cooldown("k"));
    }

    #[test]
    fn backoff_delay_is_capped_at_max() {
        let service = ExecutionService::new(20, 1_000, 5_000, 1_000);
        for _ in 0..10 {
            service.schedule_retry("k", "x");
        }
        let states = service.retry_states.read().unwrap();
        let state = states.get("k").unwrap();
        let delay = (state.next_retry_at - Utc::now()).num_milliseconds();
        assert!(delay <= 6_000); // max delay plus jitter headroom
    }
}
