//! Migration history entries

use serde::{Deserialize, Serialize};

/// One completed `migrate()` call, however many steps it ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub from_version: u32,
    pub to_version: u32,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub item_count: usize,
    pub duration_ms: u64,
}
