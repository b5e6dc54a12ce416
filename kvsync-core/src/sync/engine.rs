/*
    engine.rs - Sync orchestration for one stored collection

    A pass:
    1. Refuse (zero result) if another pass of this engine is running.
    2. Load the collection from the backing store.
    3. Run the configured strategy; it persists progress through a
       checkpoint that keeps the payload's schema metadata.
    4. Fold the result into the status, or log the failure.

    enable() wires passes to connectivity changes (or to an interval timer
    for the batch strategy) and runs one pass right away when online.
    disable() stops triggering new passes; a pass already in flight still
    completes and its result is applied.
*/

use super::connectivity::Connectivity;
use super::endpoint::{HttpEndpoint, RemoteEndpoint};
use super::errors::{SyncError, SyncOpResult};
use super::item::{items_from_values, items_to_values, SyncableItem};
use super::status::{ErrorLog, SyncResult, SyncStatus};
use super::strategy::{build_strategy, Checkpoint, StrategyKind, StrategySettings, SyncContext, SyncStrategy};
use crate::config::SyncConfig;
use crate::conflict::{ConflictResolver, ConflictStrategy};
use crate::metrics::record_sync_pass;
use crate::storage::{BackingStore, StoredPayload};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Interval between batch passes when none is configured
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(30);

/// Notified around every pass that actually runs
pub trait SyncObserver: Send + Sync {
    fn on_sync_start(&self) {}

    fn on_sync_complete(&self, _result: &SyncResult) {}

    fn on_sync_error(&self, _error: &SyncError) {}
}

/// Engine options that are not about the transport
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub strategy: StrategyKind,
    pub conflict: ConflictStrategy,
    pub settings: StrategySettings,
    pub sync_interval: Option<Duration>,
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            strategy: config.strategy,
            conflict: config.conflict_resolution.into(),
            settings: StrategySettings::from(config),
            sync_interval: config.sync_interval,
        }
    }
}

#[derive(Default)]
struct EngineState {
    synced_count: usize,
    failed_count: usize,
    last_sync_at: Option<i64>,
    error_log: ErrorLog,
}

struct EngineInner {
    storage_key: String,
    store: Arc<dyn BackingStore>,
    endpoint: Arc<dyn RemoteEndpoint>,
    strategy: Box<dyn SyncStrategy>,
    resolver: ConflictResolver,
    settings: StrategySettings,
    sync_interval: Duration,
    connectivity: Connectivity,
    enabled: AtomicBool,
    syncing: AtomicBool,
    state: Mutex<EngineState>,
    observers: Mutex<Vec<Arc<dyn SyncObserver>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Keeps one collection in step with the remote authority
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

/// Clears the in-progress flag however the pass ends
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Writes strategy progress back under the collection's key
struct StoreCheckpoint<'a> {
    store: &'a dyn BackingStore,
    key: &'a str,
    /// Stored payload without items, carrying the schema metadata
    base: StoredPayload,
}

#[async_trait]
impl Checkpoint for StoreCheckpoint<'_> {
    async fn persist(&self, items: &[SyncableItem]) -> SyncOpResult<()> {
        let payload = self.base.clone().with_items(items_to_values(items));
        self.store.save(self.key, &payload.encode()?).await?;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SyncEngine {
    pub fn new(
        storage_key: impl Into<String>,
        store: Arc<dyn BackingStore>,
        endpoint: Arc<dyn RemoteEndpoint>,
        options: SyncOptions,
        connectivity: Connectivity,
    ) -> Self {
        let inner = EngineInner {
            storage_key: storage_key.into(),
            store,
            endpoint,
            strategy: build_strategy(options.strategy),
            resolver: ConflictResolver::new(options.conflict),
            settings: options.settings,
            sync_interval: options.sync_interval.unwrap_or(DEFAULT_BATCH_INTERVAL),
            connectivity,
            enabled: AtomicBool::new(false),
            syncing: AtomicBool::new(false),
            state: Mutex::new(EngineState::default()),
            observers: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Engine talking HTTP to the configured endpoint
    pub fn from_config(
        storage_key: impl Into<String>,
        store: Arc<dyn BackingStore>,
        config: &SyncConfig,
        connectivity: Connectivity,
    ) -> SyncOpResult<Self> {
        let endpoint = HttpEndpoint::from_config(config)?;
        Ok(Self::new(storage_key, store, Arc::new(endpoint), SyncOptions::from(config), connectivity))
    }

    pub fn storage_key(&self) -> &str {
        &self.inner.storage_key
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.inner.strategy.kind()
    }

    pub fn add_observer(&self, observer: Arc<dyn SyncObserver>) {
        lock(&self.inner.observers).push(observer);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::Acquire)
    }

    /// Start automatic syncing
    ///
    /// Returns the result of the initial pass, or `None` when offline or
    /// already enabled.
    pub async fn enable(&self) -> Option<SyncOpResult<SyncResult>> {
        if self.inner.enabled.swap(true, Ordering::AcqRel) {
            return None;
        }

        let weak = Arc::downgrade(&self.inner);
        let listener = match self.inner.strategy.kind() {
            StrategyKind::Batch => tokio::spawn(interval_loop(weak, self.inner.sync_interval)),
            StrategyKind::Immediate | StrategyKind::Queued => {
                tokio::spawn(online_loop(weak, self.inner.connectivity.subscribe()))
            }
        };
        if let Some(previous) = lock(&self.inner.listener).replace(listener) {
            previous.abort();
        }
        info!(key = %self.inner.storage_key, strategy = %self.strategy_kind(), "sync enabled");

        if self.inner.connectivity.is_online() {
            Some(self.inner.run_pass().await)
        } else {
            None
        }
    }

    /// Stop triggering passes; an in-flight pass still completes
    pub fn disable(&self) {
        if !self.inner.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(listener) = lock(&self.inner.listener).take() {
            listener.abort();
        }
        info!(key = %self.inner.storage_key, "sync disabled");
    }

    /// Run one pass now
    ///
    /// Returns a zero result without doing anything if a pass is already
    /// running.
    pub async fn sync(&self) -> SyncOpResult<SyncResult> {
        self.inner.run_pass().await
    }

    /// Items currently waiting for the remote
    pub async fn pending_count(&self) -> SyncOpResult<usize> {
        let (_, items) = self.inner.load().await?;
        Ok(self.inner.strategy.pending_count(&items))
    }

    pub async fn status(&self) -> SyncOpResult<SyncStatus> {
        let pending_count = self.pending_count().await?;
        let state = lock(&self.inner.state);
        Ok(SyncStatus {
            pending_count,
            synced_count: state.synced_count,
            failed_count: state.failed_count,
            last_sync_at: state.last_sync_at,
            is_syncing: self.is_syncing(),
            error_log: state.error_log.to_vec(),
        })
    }

    /// Give failed and exhausted items a fresh set of retries
    ///
    /// Returns how many items were reset.
    pub async fn reset_failed(&self) -> SyncOpResult<usize> {
        reset_failed_items(self.inner.store.as_ref(), &self.inner.storage_key).await
    }
}

/// Reset failed and exhausted items of the collection under `key`
///
/// Purely local: no endpoint is involved. Returns how many items were reset.
pub async fn reset_failed_items(store: &dyn BackingStore, key: &str) -> SyncOpResult<usize> {
    let bytes = store.retrieve(key).await?;
    let payload = StoredPayload::decode(bytes.as_deref())?;
    let mut items = items_from_values(payload.items())?;

    let mut reset = 0;
    for item in items.iter_mut().filter(|i| i.needs_sync && (i.sync_failed || i.sync_attempts > 0)) {
        item.reset();
        reset += 1;
    }

    if reset > 0 {
        let updated = payload.with_items(items_to_values(&items));
        store.save(key, &updated.encode()?).await?;
        info!(key, reset, "failed items reset");
    }
    Ok(reset)
}

impl EngineInner {
    async fn load(&self) -> SyncOpResult<(StoredPayload, Vec<SyncableItem>)> {
        let bytes = self.store.retrieve(&self.storage_key).await?;
        let payload = StoredPayload::decode(bytes.as_deref())?;
        let items = items_from_values(payload.items())?;
        Ok((payload, items))
    }

    fn observers(&self) -> Vec<Arc<dyn SyncObserver>> {
        lock(&self.observers).clone()
    }

    async fn run_pass(&self) -> SyncOpResult<SyncResult> {
        if self.syncing.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            debug!(key = %self.storage_key, "sync already in progress");
            return Ok(SyncResult::default());
        }
        let guard = SyncingGuard(&self.syncing);

        let observers = self.observers();
        for observer in &observers {
            observer.on_sync_start();
        }

        let outcome = self.execute_pass().await;
        drop(guard);

        match outcome {
            Ok(result) => {
                {
                    let mut state = lock(&self.state);
                    state.synced_count += result.success;
                    state.failed_count += result.failed;
                    state.last_sync_at = Some(now_ms());
                }
                record_sync_pass(result.success, result.failed, result.conflicts, result.duration_ms);
                info!(
                    key = %self.storage_key,
                    success = result.success,
                    failed = result.failed,
                    conflicts = result.conflicts,
                    exhausted = result.exhausted,
                    duration_ms = result.duration_ms,
                    "sync pass complete"
                );
                for observer in &observers {
                    observer.on_sync_complete(&result);
                }
                Ok(result)
            }
            Err(e) => {
                error!(key = %self.storage_key, "sync pass failed: {}", e);
                lock(&self.state).error_log.push(e.to_string(), now_ms());
                for observer in &observers {
                    observer.on_sync_error(&e);
                }
                Err(e)
            }
        }
    }

    async fn execute_pass(&self) -> SyncOpResult<SyncResult> {
        let (payload, mut items) = self.load().await?;
        let pending = self.strategy.pending_count(&items);
        if pending == 0 {
            return Ok(SyncResult::default());
        }

        let op = crate::tracing::sync::trace_pass(&self.storage_key, self.strategy.kind().as_str(), pending);
        let checkpoint = StoreCheckpoint {
            store: self.store.as_ref(),
            key: &self.storage_key,
            base: payload.with_items(Vec::new()),
        };
        let ctx = SyncContext {
            collection_key: &self.storage_key,
            endpoint: self.endpoint.as_ref(),
            resolver: &self.resolver,
            settings: self.settings,
            checkpoint: &checkpoint,
        };

        let mut result = match self.strategy.execute(&mut items, &ctx).await {
            Ok(result) => result,
            Err(e) => {
                op.record_error(&e.to_string());
                return Err(e);
            }
        };
        debug_assert_eq!(result.success + result.failed, pending);
        result.duration_ms = op.complete();
        Ok(result)
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }
}

/// Run a detached pass; it survives disable()
fn spawn_pass(inner: Arc<EngineInner>) {
    tokio::spawn(async move {
        if let Err(e) = inner.run_pass().await {
            debug!(key = %inner.storage_key, "background sync failed: {}", e);
        }
    });
}

async fn online_loop(engine: Weak<EngineInner>, mut online: watch::Receiver<bool>) {
    while online.changed().await.is_ok() {
        if !*online.borrow_and_update() {
            continue;
        }
        let Some(inner) = engine.upgrade() else { break };
        if !inner.enabled.load(Ordering::Acquire) {
            break;
        }
        debug!(key = %inner.storage_key, "back online, syncing");
        spawn_pass(inner);
    }
}

async fn interval_loop(engine: Weak<EngineInner>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = engine.upgrade() else { break };
        if !inner.enabled.load(Ordering::Acquire) {
            break;
        }
        if inner.connectivity.is_online() {
            spawn_pass(inner);
        }
    }
}
