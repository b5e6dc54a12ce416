//! Command implementations, kept apart from argument parsing so they can be
//! driven directly against any backing store.

use anyhow::{Context, Result};
use kvsync_core::migration::MigrationEngine;
use kvsync_core::storage::{BackingStore, StoredPayload};
use kvsync_core::sync::item::{NEEDS_SYNC, SYNC_FAILED};
use kvsync_core::sync::{reset_failed_items, Connectivity, SyncEngine, SyncResult};
use kvsync_core::Config;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// What `inspect` reports about one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySummary {
    pub key: String,
    pub present: bool,
    pub versioned: bool,
    pub schema_version: u32,
    pub item_count: usize,
    pub pending: usize,
    pub failed: usize,
    pub migrations_recorded: usize,
    pub needs_migration: bool,
}

fn flag(item: &Value, name: &str) -> bool {
    item.get(name).and_then(Value::as_bool).unwrap_or(false)
}

pub async fn inspect(store: &dyn BackingStore, key: &str, config: &Config) -> Result<KeySummary> {
    let bytes = store.retrieve(key).await?;
    let present = bytes.is_some();
    let payload = StoredPayload::decode(bytes.as_deref())
        .with_context(|| format!("key '{}' does not hold a collection", key))?;

    let items = payload.items();
    let migrations_recorded = match &payload {
        StoredPayload::Versioned(collection) => collection.migration_history.len(),
        StoredPayload::Legacy(_) => 0,
    };
    let engine = MigrationEngine::from_config(&config.migration);

    Ok(KeySummary {
        key: key.to_string(),
        present,
        versioned: payload.is_versioned(),
        schema_version: payload.version(),
        item_count: items.len(),
        pending: items.iter().filter(|item| flag(item, NEEDS_SYNC)).count(),
        failed: items.iter().filter(|item| flag(item, SYNC_FAILED)).count(),
        migrations_recorded,
        needs_migration: present && engine.needs_migration(&payload),
    })
}

/// One sync pass against the configured endpoint
pub async fn sync_once(store: Arc<dyn BackingStore>, key: &str, config: &Config) -> Result<SyncResult> {
    let engine = SyncEngine::from_config(key, store, &config.sync, Connectivity::online())
        .context("sync endpoint is not usable")?;
    info!(key, strategy = %engine.strategy_kind(), "Running sync pass");
    let result = engine.sync().await?;
    debug!(?result, "Sync pass finished");
    Ok(result)
}

/// Clear failure state so exhausted items are retried on the next pass
pub async fn reset_failed(store: &dyn BackingStore, key: &str) -> Result<usize> {
    Ok(reset_failed_items(store, key).await?)
}

pub fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save_to_file(path)?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}

pub fn config_render(config: &Config) -> Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvsync_core::storage::{FileStore, VersionedCollection};
    use serde_json::json;
    use tempfile::tempdir;

    async fn store_with(key: &str, value: Value) -> (tempfile::TempDir, Arc<FileStore>) {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
        store.save(key, &serde_json::to_vec(&value).unwrap()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_inspect_legacy_collection() {
        let items = json!([
            {"id": 1, "needsSync": true},
            {"id": 2, "needsSync": true, "syncFailed": true, "syncAttempts": 3},
            {"id": 3}
        ]);
        let (_dir, store) = store_with("todos", items).await;

        let mut config = Config::default();
        config.migration.version = 2;
        let summary = inspect(store.as_ref(), "todos", &config).await.unwrap();

        assert!(summary.present);
        assert!(!summary.versioned);
        assert_eq!(summary.schema_version, 1);
        assert_eq!(summary.item_count, 3);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.needs_migration);
    }

    #[tokio::test]
    async fn test_inspect_versioned_and_missing() {
        let collection = VersionedCollection::new(3, vec![json!({"id": 1})]);
        let (_dir, store) = store_with("todos", serde_json::to_value(&collection).unwrap()).await;

        let mut config = Config::default();
        config.migration.version = 3;
        let summary = inspect(store.as_ref(), "todos", &config).await.unwrap();
        assert!(summary.versioned);
        assert_eq!(summary.schema_version, 3);
        assert!(!summary.needs_migration);

        let missing = inspect(store.as_ref(), "notes", &config).await.unwrap();
        assert!(!missing.present);
        assert_eq!(missing.item_count, 0);
        assert!(!missing.needs_migration);
    }

    #[tokio::test]
    async fn test_inspect_rejects_non_collection() {
        let (_dir, store) = store_with("todos", json!({"hello": "world"})).await;
        assert!(inspect(store.as_ref(), "todos", &Config::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_failed_clears_flags() {
        let items = json!([
            {"id": 1, "needsSync": true, "syncFailed": true, "syncAttempts": 3},
            {"id": 2, "needsSync": false}
        ]);
        let (_dir, store) = store_with("todos", items).await;

        let reset = reset_failed(store.as_ref(), "todos").await.unwrap();
        assert_eq!(reset, 1);

        let summary = inspect(store.as_ref(), "todos", &Config::default()).await.unwrap();
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.pending, 1);
    }

    #[tokio::test]
    async fn test_sync_without_endpoint_fails() {
        let (_dir, store) = store_with("todos", json!([{"id": 1, "needsSync": true}])).await;
        assert!(sync_once(store, "todos", &Config::default()).await.is_err());
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kvsync.toml");

        config_init(&path, false).unwrap();
        assert!(config_init(&path, false).is_err());
        config_init(&path, true).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.migration.version, 1);
    }
}
