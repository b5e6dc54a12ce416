/*
    engine.rs - Ordered schema migration

    Flow of one migrate() call:
    1. Read the recorded version (legacy payloads are version 1).
    2. recorded == target: nothing to do, return the payload unchanged.
       recorded  > target: refuse (DowngradeAttempted).
    3. Check that a migration exists for every version in
       (recorded, target] before running any of them.
    4. Run the steps in ascending order, each on the previous output.
    5. Append exactly one history record for the whole call.

    migrate_stored() wraps this with a read and, on success only, a write.
*/

use super::errors::{json_type_name, MigrationError, MigrationResult};
use super::record::MigrationRecord;
use super::step::MigrationFn;
use crate::config::MigrationConfig;
use crate::metrics::{record_counter, Timer, MIGRATION_DURATION, MIGRATION_ITEMS, MIGRATION_RUNS};
use crate::storage::{BackingStore, StoredPayload, LEGACY_VERSION};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Notified around migrations that change the version
pub trait MigrationObserver: Send + Sync {
    fn on_migration_start(&self, _from_version: u32, _to_version: u32) {}

    fn on_migration_complete(&self, _record: &MigrationRecord) {}

    fn on_migration_error(&self, _error: &MigrationError) {}
}

/// Outcome of [`MigrationEngine::migrate_stored`]
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    /// Payload after migration (or as stored, if nothing ran)
    pub payload: StoredPayload,
    pub from_version: u32,
    pub to_version: u32,
    /// Whether any step ran
    pub migrated: bool,
    /// Whether the result was written back
    pub persisted: bool,
}

/// Moves stored collections to the target schema version
pub struct MigrationEngine {
    target_version: u32,
    auto_migrate: bool,
    migrations: BTreeMap<u32, Arc<dyn MigrationFn>>,
    observers: Vec<Arc<dyn MigrationObserver>>,
}

impl MigrationEngine {
    /// Engine targeting `target_version` with no migrations registered
    pub fn new(target_version: u32) -> Self {
        Self {
            target_version,
            auto_migrate: true,
            migrations: BTreeMap::new(),
            observers: Vec::new(),
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.version).with_auto_migrate(config.auto_migrate)
    }

    pub fn with_auto_migrate(mut self, auto_migrate: bool) -> Self {
        self.auto_migrate = auto_migrate;
        self
    }

    /// Register the migration producing `version` from `version - 1`
    pub fn register(mut self, version: u32, migration: impl MigrationFn + 'static) -> Self {
        self.migrations.insert(version, Arc::new(migration));
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn MigrationObserver>) {
        self.observers.push(observer);
    }

    pub fn target_version(&self) -> u32 {
        self.target_version
    }

    pub fn auto_migrate(&self) -> bool {
        self.auto_migrate
    }

    /// Check the registered chain for structural errors
    pub fn validate(&self) -> MigrationResult<()> {
        if self.target_version < 1 {
            return Err(MigrationError::InvalidConfig(
                "target version must be at least 1".to_string(),
            ));
        }
        if let Some(&bad) = self.migrations.keys().find(|&&v| v < 2 || v > self.target_version) {
            return Err(MigrationError::InvalidConfig(format!(
                "migration for version {} is outside 2..={}",
                bad, self.target_version
            )));
        }
        Ok(())
    }

    /// Recorded version of a payload
    pub fn get_data_version(&self, payload: &StoredPayload) -> u32 {
        payload.version()
    }

    /// Whether `migrate` would run any step
    pub fn needs_migration(&self, payload: &StoredPayload) -> bool {
        !payload.items().is_empty() && payload.version() < self.target_version
    }

    /// Bring `payload` to the target version
    pub async fn migrate(&self, payload: StoredPayload) -> MigrationResult<StoredPayload> {
        self.validate()?;

        let from = payload.version();
        let to = self.target_version;

        if from == to {
            return Ok(payload);
        }

        let result = self.run_chain(payload, from, to).await;
        match &result {
            Ok(StoredPayload::Versioned(collection)) => {
                if let Some(record) = collection.migration_history.last() {
                    for observer in &self.observers {
                        observer.on_migration_complete(record);
                    }
                }
            }
            Ok(StoredPayload::Legacy(_)) => {}
            Err(e) => {
                warn!(from_version = from, to_version = to, "migration failed: {}", e);
                for observer in &self.observers {
                    observer.on_migration_error(e);
                }
            }
        }
        result
    }

    async fn run_chain(&self, payload: StoredPayload, from: u32, to: u32) -> MigrationResult<StoredPayload> {
        if from > to {
            return Err(MigrationError::DowngradeAttempted { recorded: from, target: to });
        }

        // Resolve the whole chain before touching the data. The first gap
        // ends the walk, so a huge target never allocates a huge chain.
        let chain = ((from + 1)..=to)
            .map(|version| {
                self.migrations
                    .get(&version)
                    .map(|step| (version, Arc::clone(step)))
                    .ok_or(MigrationError::MigrationGap { missing: version, from, to })
            })
            .collect::<MigrationResult<Vec<_>>>()?;

        for observer in &self.observers {
            observer.on_migration_start(from, to);
        }

        let mut collection = payload.into_versioned();
        let op = crate::tracing::migration::trace_migrate(from, to, collection.items.len());
        let timer = Timer::new(MIGRATION_DURATION);

        let mut items = std::mem::take(&mut collection.items);
        for (version, step) in chain {
            let output = step
                .apply(items)
                .await
                .map_err(|e| MigrationError::StepFailed { version, reason: format!("{:#}", e) })?;
            items = match output {
                Value::Array(next) => next,
                other => {
                    return Err(MigrationError::MalformedMigrationResult {
                        version,
                        found: json_type_name(&other),
                    })
                }
            };
            op.record_event("step applied");
            debug!(version, items = items.len(), "migration step applied");
        }

        // Records the duration histogram
        let duration_ms = timer.stop().round() as u64;
        op.complete();
        let now = chrono::Utc::now().timestamp_millis();
        let record = MigrationRecord {
            from_version: from,
            to_version: to,
            timestamp: now,
            item_count: items.len(),
            duration_ms,
        };

        record_counter(MIGRATION_RUNS, 1);
        record_counter(MIGRATION_ITEMS, items.len() as u64);
        info!(from_version = from, to_version = to, items = items.len(), duration_ms, "collection migrated");

        collection.items = items;
        collection.schema_version = to;
        collection.migrated_at = Some(now);
        collection.migration_history.push(record);
        Ok(StoredPayload::Versioned(collection))
    }

    /// Read `key`, migrate it, and write it back if allowed
    ///
    /// Stored bytes are only replaced after the whole chain succeeded.
    pub async fn migrate_stored(
        &self,
        store: &dyn BackingStore,
        key: &str,
    ) -> MigrationResult<MigrationReport> {
        let bytes = store.retrieve(key).await?;
        let payload = StoredPayload::decode(bytes.as_deref())?;
        let from_version = payload.version();

        if payload.items().is_empty() {
            return Ok(MigrationReport {
                payload,
                from_version,
                to_version: from_version,
                migrated: false,
                persisted: false,
            });
        }

        let migrated = self.migrate(payload).await?;
        let to_version = migrated.version();
        let changed = to_version != from_version;

        let persisted = changed && self.auto_migrate;
        if persisted {
            store.save(key, &migrated.encode()?).await?;
        } else if changed {
            info!(key, from_version, to_version, "auto_migrate disabled, migrated data not persisted");
        }

        Ok(MigrationReport { payload: migrated, from_version, to_version, migrated: changed, persisted })
    }
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self::new(LEGACY_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::step::{add_field, async_step};
    use crate::storage::{MemoryStore, VersionedCollection};
    use serde_json::json;
    use std::sync::Mutex;

    fn rename_title(items: Vec<Value>) -> Value {
        Value::Array(
            items
                .into_iter()
                .map(|mut item| {
                    if let Some(title) = item.as_object_mut().and_then(|m| m.remove("title")) {
                        item["name"] = title;
                    }
                    item
                })
                .collect(),
        )
    }

    fn engine_v3() -> MigrationEngine {
        MigrationEngine::new(3)
            .register(2, add_field("done", json!(false)))
            .register(3, rename_title)
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl MigrationObserver for RecordingObserver {
        fn on_migration_start(&self, from: u32, to: u32) {
            self.events.lock().unwrap().push(format!("start {}->{}", from, to));
        }

        fn on_migration_complete(&self, record: &MigrationRecord) {
            self.events
                .lock()
                .unwrap()
                .push(format!("complete {}->{}", record.from_version, record.to_version));
        }

        fn on_migration_error(&self, _error: &MigrationError) {
            self.events.lock().unwrap().push("error".to_string());
        }
    }

    #[tokio::test]
    async fn test_chain_composes_in_order() {
        let engine = engine_v3();
        let legacy = StoredPayload::Legacy(vec![json!({"id": 1, "title": "milk"})]);

        let migrated = engine.migrate(legacy).await.unwrap();
        assert_eq!(migrated.version(), 3);
        assert_eq!(migrated.items(), &[json!({"id": 1, "name": "milk", "done": false})]);

        let collection = migrated.into_versioned();
        assert_eq!(collection.migration_history.len(), 1);
        let record = &collection.migration_history[0];
        assert_eq!((record.from_version, record.to_version), (1, 3));
        assert_eq!(record.item_count, 1);
        assert!(collection.migrated_at.is_some());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let engine = engine_v3();
        let once = engine.migrate(StoredPayload::Legacy(vec![json!({"title": "a"})])).await.unwrap();
        let twice = engine.migrate(once.clone()).await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_same_version_returns_unchanged() {
        let engine = MigrationEngine::new(1);
        let legacy = StoredPayload::Legacy(vec![json!(1)]);
        assert_eq!(engine.migrate(legacy.clone()).await.unwrap(), legacy);
    }

    #[tokio::test]
    async fn test_gap_fails_before_any_step() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let engine = MigrationEngine::new(3).register(3, move |items: Vec<Value>| {
            *counter.lock().unwrap() += 1;
            Value::Array(items)
        });

        let err = engine.migrate(StoredPayload::Legacy(vec![json!(1)])).await.unwrap_err();
        assert!(matches!(err, MigrationError::MigrationGap { missing: 2, from: 1, to: 3 }));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_huge_target_reports_gap() {
        let engine = MigrationEngine::new(u32::MAX).register(2, add_field("done", json!(false)));
        assert!(engine.validate().is_ok());

        let err = engine.migrate(StoredPayload::Legacy(vec![json!({"id": 1})])).await.unwrap_err();
        assert!(matches!(err, MigrationError::MigrationGap { missing: 3, from: 1, to: u32::MAX }));
    }

    #[tokio::test]
    async fn test_downgrade_refused() {
        let engine = MigrationEngine::new(2).register(2, add_field("x", json!(0)));
        let newer = StoredPayload::Versioned(VersionedCollection::new(5, vec![json!(1)]));
        let err = engine.migrate(newer).await.unwrap_err();
        assert!(matches!(err, MigrationError::DowngradeAttempted { recorded: 5, target: 2 }));
    }

    #[tokio::test]
    async fn test_non_array_result_is_malformed() {
        let engine = MigrationEngine::new(2).register(2, |_items: Vec<Value>| json!({"oops": true}));
        let err = engine.migrate(StoredPayload::Legacy(vec![json!(1)])).await.unwrap_err();
        assert!(matches!(
            err,
            MigrationError::MalformedMigrationResult { version: 2, found: "an object" }
        ));
    }

    #[tokio::test]
    async fn test_step_error_is_step_failed() {
        let engine = MigrationEngine::new(2).register(
            2,
            async_step(|_items: Vec<Value>| async {
                Err::<Value, _>(anyhow::anyhow!("remote schema unavailable"))
            }),
        );
        let err = engine.migrate(StoredPayload::Legacy(vec![json!(1)])).await.unwrap_err();
        match err {
            MigrationError::StepFailed { version, reason } => {
                assert_eq!(version, 2);
                assert!(reason.contains("remote schema unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_keys() {
        let engine = MigrationEngine::new(3).register(1, add_field("x", json!(0)));
        assert!(matches!(engine.validate(), Err(MigrationError::InvalidConfig(_))));

        let engine = MigrationEngine::new(3).register(4, add_field("x", json!(0)));
        assert!(matches!(engine.validate(), Err(MigrationError::InvalidConfig(_))));

        assert!(MigrationEngine::new(0).validate().is_err());
        assert!(engine_v3().validate().is_ok());
    }

    #[test]
    fn test_needs_migration() {
        let engine = engine_v3();
        assert!(!engine.needs_migration(&StoredPayload::Legacy(vec![])));
        assert!(engine.needs_migration(&StoredPayload::Legacy(vec![json!(1)])));

        let current = StoredPayload::Versioned(VersionedCollection::new(3, vec![json!(1)]));
        assert!(!engine.needs_migration(&current));
        assert_eq!(engine.get_data_version(&current), 3);
        assert_eq!(engine.get_data_version(&StoredPayload::Legacy(vec![])), 1);
    }

    #[tokio::test]
    async fn test_observers_see_one_run() {
        let observer = Arc::new(RecordingObserver::default());
        let mut engine = engine_v3();
        engine.add_observer(observer.clone());

        engine.migrate(StoredPayload::Legacy(vec![json!({})])).await.unwrap();
        assert_eq!(*observer.events.lock().unwrap(), vec!["start 1->3", "complete 1->3"]);

        let newer = StoredPayload::Versioned(VersionedCollection::new(9, vec![json!(1)]));
        assert!(engine.migrate(newer).await.is_err());
        assert_eq!(observer.events.lock().unwrap().last().map(String::as_str), Some("error"));
    }

    #[tokio::test]
    async fn test_migrate_stored_persists_on_success() {
        let store = MemoryStore::new();
        store.save("todos", br#"[{"id":1,"title":"milk"}]"#).await.unwrap();

        let report = engine_v3().migrate_stored(&store, "todos").await.unwrap();
        assert!(report.migrated);
        assert!(report.persisted);
        assert_eq!((report.from_version, report.to_version), (1, 3));

        let stored = StoredPayload::decode(store.retrieve("todos").await.unwrap().as_deref()).unwrap();
        assert_eq!(stored.version(), 3);
    }

    #[tokio::test]
    async fn test_migrate_stored_failure_leaves_bytes() {
        let store = MemoryStore::new();
        let original = br#"[{"id":1}]"#;
        store.save("todos", original).await.unwrap();

        let engine = MigrationEngine::new(3).register(3, add_field("x", json!(0)));
        assert!(engine.migrate_stored(&store, "todos").await.is_err());
        assert_eq!(store.retrieve("todos").await.unwrap(), Some(original.to_vec()));
    }

    #[tokio::test]
    async fn test_migrate_stored_without_auto_migrate() {
        let store = MemoryStore::new();
        let original = br#"[{"id":1}]"#;
        store.save("todos", original).await.unwrap();

        let engine = engine_v3().with_auto_migrate(false);
        let report = engine.migrate_stored(&store, "todos").await.unwrap();
        assert!(report.migrated);
        assert!(!report.persisted);
        assert_eq!(store.retrieve("todos").await.unwrap(), Some(original.to_vec()));
    }

    #[tokio::test]
    async fn test_migrate_stored_missing_key() {
        let store = MemoryStore::new();
        let report = engine_v3().migrate_stored(&store, "nothing").await.unwrap();
        assert!(!report.migrated);
        assert_eq!(store.retrieve("nothing").await.unwrap(), None);
    }
}
