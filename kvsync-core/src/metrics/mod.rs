//! Metrics for sync passes, migrations and cross-tab traffic
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const SYNC_PASSES: &str = "sync.passes";
pub const SYNC_ITEMS_SUCCESS: &str = "sync.items.success";
pub const SYNC_ITEMS_FAILED: &str = "sync.items.failed";
pub const SYNC_CONFLICTS: &str = "sync.conflicts";
pub const SYNC_PASS_DURATION: &str = "sync.pass.duration_ms";
pub const MIGRATION_RUNS: &str = "migration.runs";
pub const MIGRATION_ITEMS: &str = "migration.items";
pub const MIGRATION_DURATION: &str = "migration.duration_ms";
pub const TAB_MESSAGES_SENT: &str = "tab.messages.sent";
pub const TAB_MESSAGES_DISPATCHED: &str = "tab.messages.dispatched";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(SYNC_PASSES, "Completed sync passes");
    describe_counter!(SYNC_ITEMS_SUCCESS, "Items acknowledged by the remote");
    describe_counter!(SYNC_ITEMS_FAILED, "Items that failed or were skipped as exhausted");
    describe_counter!(SYNC_CONFLICTS, "Version conflicts routed to the resolver");
    describe_histogram!(SYNC_PASS_DURATION, "Sync pass duration in milliseconds");

    describe_counter!(MIGRATION_RUNS, "Completed migrate() calls that changed the version");
    describe_counter!(MIGRATION_ITEMS, "Items passed through a migration chain");
    describe_histogram!(MIGRATION_DURATION, "Migration duration in milliseconds");

    describe_counter!(TAB_MESSAGES_SENT, "Cross-tab messages published");
    describe_counter!(TAB_MESSAGES_DISPATCHED, "Cross-tab messages delivered to handlers");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a histogram metric
pub fn record_histogram(name: &'static str, value: f64) {
    histogram!(name).record(value);
}

/// Record the outcome of one sync pass
pub fn record_sync_pass(success: usize, failed: usize, conflicts: usize, duration_ms: u64) {
    record_counter(SYNC_PASSES, 1);
    record_counter(SYNC_ITEMS_SUCCESS, success as u64);
    record_counter(SYNC_ITEMS_FAILED, failed as u64);
    record_counter(SYNC_CONFLICTS, conflicts as u64);
    record_histogram(SYNC_PASS_DURATION, duration_ms as f64);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    /// Create a new timer
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) -> f64 {
        let millis = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.name).record(millis);
        millis
    }
}
