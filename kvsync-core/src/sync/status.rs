//! Pass results, engine status and the bounded error log

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Entries kept in the error log
pub const ERROR_LOG_CAPACITY: usize = 10;

/// Outcome of one sync pass
///
/// `success + failed` equals the number of pending items when the pass
/// started. `exhausted` counts the failed items that were skipped because
/// their retries were already used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: usize,
    pub failed: usize,
    pub conflicts: usize,
    pub exhausted: usize,
    pub duration_ms: u64,
}

impl SyncResult {
    /// Items the pass accounted for
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

/// One uncaught pass failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub message: String,
}

/// Ring buffer of the most recent errors, newest first
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: VecDeque<ErrorEntry>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self { entries: VecDeque::with_capacity(ERROR_LOG_CAPACITY) }
    }

    pub fn push(&mut self, message: impl Into<String>, timestamp: i64) {
        self.entries.push_front(ErrorEntry { timestamp, message: message.into() });
        self.entries.truncate(ERROR_LOG_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ErrorEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Snapshot of an engine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Items currently waiting for the remote
    pub pending_count: usize,
    /// Items confirmed since the engine was created
    pub synced_count: usize,
    /// Failed items recorded since the engine was created
    pub failed_count: usize,
    pub last_sync_at: Option<i64>,
    pub is_syncing: bool,
    /// Newest first, at most [`ERROR_LOG_CAPACITY`]
    pub error_log: Vec<ErrorEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_error_log_keeps_newest_first() {
        let mut log = ErrorLog::new();
        for i in 0..15 {
            log.push(format!("failure {}", i), i);
        }

        let entries = log.to_vec();
        assert_eq!(entries.len(), ERROR_LOG_CAPACITY);
        assert_eq!(entries[0].message, "failure 14");
        assert_eq!(entries[9].message, "failure 5");
    }

    #[test]
    fn test_result_wire_shape() {
        let result = SyncResult { success: 2, failed: 1, conflicts: 1, exhausted: 0, duration_ms: 5 };
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["durationMs"], serde_json::json!(5));
        assert_eq!(result.total(), 3);
    }

    proptest! {
        #[test]
        fn prop_error_log_bounded(count in 0usize..64) {
            let mut log = ErrorLog::new();
            for i in 0..count {
                log.push(i.to_string(), i as i64);
            }
            prop_assert_eq!(log.len(), count.min(ERROR_LOG_CAPACITY));
            let timestamps: Vec<i64> = log.to_vec().iter().map(|e| e.timestamp).collect();
            prop_assert!(timestamps.windows(2).all(|w| w[0] > w[1]));
        }
    }
}
