//! Span helpers for sync passes, migration runs and cross-tab traffic

use std::time::Instant;
use tracing::{span, Level, Span};

/// Traced operation wrapper
pub struct TracedOperation {
    span: Span,
    start: Instant,
}

impl TracedOperation {
    /// Start a new traced operation
    pub fn new(operation_name: &str) -> Self {
        let span = span!(Level::DEBUG, "operation", name = operation_name);

        Self { span, start: Instant::now() }
    }

    /// Record an event in the trace
    pub fn record_event(&self, event: &str) {
        tracing::debug!(parent: &self.span, event = event);
    }

    /// Record an error in the trace
    pub fn record_error(&self, error: &str) {
        tracing::error!(parent: &self.span, error = error);
    }

    /// Milliseconds since the operation started
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Complete the operation and record duration
    pub fn complete(self) -> u64 {
        let duration_ms = self.elapsed_ms();
        tracing::debug!(parent: &self.span, duration_ms, "operation completed");
        duration_ms
    }
}

/// Trace sync passes
pub mod sync {
    use super::*;

    pub fn trace_pass(storage_key: &str, strategy: &str, pending: usize) -> TracedOperation {
        let op = TracedOperation::new("sync_pass");
        tracing::debug!(parent: &op.span, storage_key, strategy, pending);
        op
    }
}

/// Trace migration runs
pub mod migration {
    use super::*;

    pub fn trace_migrate(from_version: u32, to_version: u32, items: usize) -> TracedOperation {
        let op = TracedOperation::new("migrate");
        tracing::debug!(parent: &op.span, from_version, to_version, items);
        op
    }
}
