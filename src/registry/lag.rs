//! The replica lag vector and the pure replica-selection algorithm.
//!
//! Kept separate from [`super::EndpointRegistry`] so the selection
//! arithmetic can be property-tested without a database, and so the
//! throttling logic is exercised by its own focused unit tests.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Sentinel lag value meaning "unavailable" (heartbeat read failed, or no
/// refresh has ever run).
pub const UNAVAILABLE_LAG_MS: u64 = 999_999;

/// Per-replica lag, plus a lock-free throttle on `refresh_lag` itself.
pub struct LagVector {
    slots: Vec<AtomicU64>,
    /// Epoch-ms of the last *claimed* refresh attempt. A refresh claims
    /// this slot via `compare_exchange` before doing any I/O, so two
    /// concurrent callers within the interval never both proceed.
    last_claim_epoch_ms: AtomicI64,
    interval_ms: i64,
}

impl LagVector {
    pub fn new(replica_count: usize, interval: std::time::Duration) -> Self {
        let slots = (0..replica_count)
            .map(|_| AtomicU64::new(UNAVAILABLE_LAG_MS))
            .collect();
        Self {
            slots,
            last_claim_epoch_ms: AtomicI64::new(i64::MIN / 2),
            interval_ms: i64::try_from(interval.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn set(&self, index: usize, lag_ms: u64) {
        if let Some(slot) = self.slots.get(index) {
            slot.store(lag_ms, Ordering::Release);
        }
    }

    pub fn mark_unavailable(&self, index: usize) {
        self.set(index, UNAVAILABLE_LAG_MS);
    }

    /// A consistent-enough snapshot of all slots for selection purposes.
    /// Each individual read is atomic; the vector as a whole is not
    /// locked: a slightly stale read is acceptable for a soft lag SLO.
    pub fn snapshot(&self) -> Vec<u64> {
        self.slots.iter().map(|s| s.load(Ordering::Acquire)).collect()
    }

    /// Attempt to claim the right to run a refresh right now. Returns
    /// `true` (and atomically records `now_epoch_ms` as the new claim)
    /// only if at least `interval_ms` has elapsed since the last claim.
    pub fn try_claim_refresh(&self, now_epoch_ms: i64) -> bool {
        let mut current = self.last_claim_epoch_ms.load(Ordering::Acquire);
        loop {
            if now_epoch_ms.saturating_sub(current) < self.interval_ms {
                return false;
            }
            match self.last_claim_epoch_ms.compare_exchange(
                current,
                now_epoch_ms,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}

/// The outcome of picking a replica under a lag bound: either a replica
/// index and its observed lag, or "none qualify, use primary".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Replica { index: usize, lag_ms: u64 },
    Primary,
}

/// Pure selection algorithm, property-testable in isolation: among
/// replicas whose lag is `<= max_lag_ms`, pick the minimum; ties break to
/// the lowest index. Empty qualifying set means "use primary".
pub fn select_replica(lags: &[u64], max_lag_ms: u64) -> Selection {
    let mut best: Option<(usize, u64)> = None;
    for (index, &lag_ms) in lags.iter().enumerate() {
        if lag_ms > max_lag_ms {
            continue;
        }
        match best {
            Some((_, best_lag)) if lag_ms >= best_lag => {}
            _ => best = Some((index, lag_ms)),
        }
    }
    match best {
        Some((index, lag_ms)) => Selection::Replica { index, lag_ms },
        None => Selection::Primary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_lags_fall_back_to_primary() {
        assert_eq!(select_replica(&[], 3000), Selection::Primary);
    }

    #[test]
    fn all_lagging_falls_back_to_primary() {
        assert_eq!(select_replica(&[4000, 4000], 3000), Selection::Primary);
    }

    #[test]
    fn picks_minimum_lag_within_bound() {
        assert_eq!(
            select_replica(&[500, 100, 2500], 3000),
            Selection::Replica { index: 1, lag_ms: 100 }
        );
    }

    #[test]
    fn ties_break_to_lowest_index() {
        assert_eq!(
            select_replica(&[200, 200, 50], 3000),
            Selection::Replica { index: 0, lag_ms: 200 }
        );
    }

    #[test]
    fn throttle_blocks_second_call_within_interval() {
        let lag = LagVector::new(1, Duration::from_secs(10));
        assert!(lag.try_claim_refresh(1_000));
        assert!(!lag.try_claim_refresh(1_500));
        assert!(!lag.try_claim_refresh(10_999));
        assert!(lag.try_claim_refresh(11_000));
    }

    #[test]
    fn mark_unavailable_sets_sentinel() {
        let lag = LagVector::new(2, Duration::from_secs(10));
        lag.set(0, 50);
        lag.set(1, 80);
        lag.mark_unavailable(0);
        assert_eq!(lag.snapshot(), vec![UNAVAILABLE_LAG_MS, 80]);
    }
}
