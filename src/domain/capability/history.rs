//! Bounded per-capability execution history and the stats derived from it.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::domain::foundation::Timestamp;

/// Default number of records kept per capability.
pub const DEFAULT_HISTORY_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub succeeded: bool,
    pub duration_ms: u64,
    /// `CapabilityError::kind` of a failure.
    pub error_kind: Option<&'static str>,
    pub fallback_depth: usize,
    pub at: Timestamp,
}

/// Ring buffer of the most recent execution records.
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    capacity: usize,
    records: VecDeque<ExecutionRecord>,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a record, evicting the oldest once full.
    pub fn push(&mut self, record: ExecutionRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> CapabilityStats {
        let total = self.records.len();
        if total == 0 {
            return CapabilityStats::default();
        }
        let successes = self.records.iter().filter(|r| r.succeeded).count();
        let duration_sum: u64 = self.records.iter().map(|r| r.duration_ms).sum();
        let success_rate = successes as f64 / total as f64;
        CapabilityStats {
            executions: total,
            success_rate,
            error_rate: 1.0 - success_rate,
            avg_duration_ms: duration_sum as f64 / total as f64,
            last_execution: self.records.back().map(|r| r.at),
        }
    }
}

/// Aggregates over the retained history window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityStats {
    pub executions: usize,
    pub success_rate: f64,
    pub error_rate: f64,
    pub avg_duration_ms: f64,
    pub last_execution: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(succeeded: bool, duration_ms: u64) -> ExecutionRecord {
        ExecutionRecord {
            succeeded,
            duration_ms,
            error_kind: if succeeded { None } else { Some("handler_failed") },
            fallback_depth: 0,
            at: Timestamp::now(),
        }
    }

    #[test]
    fn empty_history_has_zero_stats() {
        let stats = ExecutionHistory::new(10).stats();
        assert_eq!(stats.executions, 0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[test]
    fn stats_reflect_records() {
        let mut history = ExecutionHistory::new(10);
        history.push(record(true, 10));
        history.push(record(true, 20));
        history.push(record(false, 30));
        history.push(record(true, 40));

        let stats = history.stats();
        assert_eq!(stats.executions, 4);
        assert!((stats.success_rate - 0.75).abs() < f64::EPSILON);
        assert!((stats.error_rate - 0.25).abs() < f64::EPSILON);
        assert!((stats.avg_duration_ms - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn history_is_bounded() {
        let mut history = ExecutionHistory::new(3);
        for i in 0..5 {
            history.push(record(i >= 2, 1));
        }
        assert_eq!(history.len(), 3);
        // the two failures were evicted
        assert_eq!(history.stats().success_rate, 1.0);
    }
}
