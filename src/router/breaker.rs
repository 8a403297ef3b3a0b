//! A deliberately minimal circuit breaker: a counter and a threshold.
//!
//! No half-open state, no sliding window, no time-based reset — this is
//! "after N consecutive failures, bypass replicas once to unstick the
//! caller," not replica quarantine. See `DESIGN.md` for why the richer
//! state machine in the pack's `tower-resilience-circuitbreaker` crate
//! was not adopted here: it would violate the "any success resets to
//! zero" invariant this router is specified to uphold.

use std::sync::atomic::{AtomicU32, Ordering};

pub struct CircuitBreaker {
    failures: AtomicU32,
    threshold: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: AtomicU32::new(0),
            threshold,
        }
    }

    /// Reset the counter to zero on any successful execution.
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
    }

    /// Record a failure and return whether the threshold has now been
    /// reached (meaning the caller should retry once against primary).
    pub fn record_failure(&self) -> bool {
        let previous = self.failures.fetch_add(1, Ordering::AcqRel);
        previous + 1 >= self.threshold
    }

    #[cfg(test)]
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }
}
