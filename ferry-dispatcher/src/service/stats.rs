//! Outcome counters shared by the workers and the health endpoint

use ferry_core::domain::outcome::DeliveryOutcome;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals since startup
#[derive(Debug, Default)]
pub struct DispatchStats {
    acknowledged: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    batches: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub acknowledged: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub batches: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, outcome: &DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Acknowledged { .. } => &self.acknowledged,
            DeliveryOutcome::Retry { .. } => &self.retried,
            DeliveryOutcome::DeadLettered { .. } => &self.dead_lettered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let stats = DispatchStats::new();
        stats.record_batch();
        stats.record(&DeliveryOutcome::Acknowledged {
            task_id: "t1".to_string(),
        });
        stats.record(&DeliveryOutcome::Retry {
            reason: "capacity".to_string(),
        });
        stats.record(&DeliveryOutcome::Retry {
            reason: "capacity".to_string(),
        });

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                acknowledged: 1,
                retried: 2,
                dead_lettered: 0,
                batches: 1,
            }
        );
    }
}
