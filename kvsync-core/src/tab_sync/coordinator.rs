/*
    coordinator.rs - Cross-tab change propagation

    Flow:
    1. At construction pick a transport once: the broadcast hub if the
       context has one, otherwise mutation events from a simple key/value
       backend, otherwise nothing (inactive).
    2. Outbound: stamp every message with the context's identity.
    3. Inbound: one task per coordinator drains the transport in arrival
       order, drops our own messages and messages for other keys, and hands
       the rest to the handler. Handler errors and panics are logged here.

    The storage-event path cannot tell "remove" from "clear": both arrive as
    "the value became absent" and are dispatched to `on_remove`.
*/

use super::context::{BrowsingContext, ContextId, HubChannel};
use super::errors::TransportUnavailable;
use super::handler::CrossTabHandler;
use super::message::{channel_name, ChangeKind, ChangeMessage};
use crate::config::CrossTabConfig;
use crate::metrics::{record_counter, TAB_MESSAGES_DISPATCHED, TAB_MESSAGES_SENT};
use crate::storage::{BackendKind, BackingStore, StorageEvent, StoredPayload};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Transport chosen at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Broadcast,
    StorageEvents,
    Inactive,
}

/// What the receive path did with one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Dispatched(ChangeKind),
    IgnoredOwnOrigin,
    IgnoredKeyMismatch,
    Closed,
}

/// Construction options
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    /// When false the coordinator comes up inactive
    pub enabled: bool,
    /// Skip the broadcast hub even when one exists
    pub force_storage_events: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self { enabled: true, force_storage_events: false }
    }
}

impl From<&CrossTabConfig> for CoordinatorOptions {
    fn from(config: &CrossTabConfig) -> Self {
        Self { enabled: config.enable_cross_tab_sync, force_storage_events: config.force_storage_events }
    }
}

enum Outbound {
    Broadcast(HubChannel),
    StorageEvents,
    Inactive,
}

struct Inner {
    origin: ContextId,
    storage_key: String,
    channel_name: String,
    handler: Arc<dyn CrossTabHandler>,
    closed: AtomicBool,
}

/// Propagates changes of one logical key between contexts
pub struct TabCoordinator {
    inner: Arc<Inner>,
    outbound: Outbound,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TabCoordinator {
    /// Create a coordinator for `storage_key` in `context`
    ///
    /// Never fails: when no transport can be set up the coordinator is
    /// inactive and every operation is a no-op.
    pub fn new(
        context: &BrowsingContext,
        storage_key: impl Into<String>,
        store: &dyn BackingStore,
        options: CoordinatorOptions,
        handler: Arc<dyn CrossTabHandler>,
    ) -> Self {
        let storage_key = storage_key.into();
        let inner = Arc::new(Inner {
            origin: context.id(),
            channel_name: channel_name(&storage_key),
            storage_key,
            handler,
            closed: AtomicBool::new(false),
        });

        let (outbound, task) = match Self::connect(&inner, context, store, options) {
            Ok(connected) => connected,
            Err(reason) => {
                info!(
                    storage_key = %inner.storage_key,
                    %reason,
                    "cross-tab sync inactive"
                );
                (Outbound::Inactive, None)
            }
        };

        Self { inner, outbound, task: Mutex::new(task) }
    }

    /// Coordinator set up from the `[cross_tab]` section
    ///
    /// With `enable_cross_tab_sync = false` the coordinator is inactive.
    pub fn from_config(
        context: &BrowsingContext,
        storage_key: impl Into<String>,
        store: &dyn BackingStore,
        config: &CrossTabConfig,
        handler: Arc<dyn CrossTabHandler>,
    ) -> Self {
        Self::new(context, storage_key, store, CoordinatorOptions::from(config), handler)
    }

    fn connect(
        inner: &Arc<Inner>,
        context: &BrowsingContext,
        store: &dyn BackingStore,
        options: CoordinatorOptions,
    ) -> Result<(Outbound, Option<JoinHandle<()>>), TransportUnavailable> {
        if !options.enabled {
            return Err(TransportUnavailable::Disabled);
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TransportUnavailable::NoRuntime)?;

        let mut last_reason = TransportUnavailable::NoHub;
        if !options.force_storage_events {
            match context.hub().ok_or(TransportUnavailable::NoHub).and_then(|hub| hub.open(&inner.channel_name)) {
                Ok(channel) => {
                    let rx = channel.subscribe();
                    let task = runtime.spawn(broadcast_loop(Arc::clone(inner), rx));
                    debug!(channel = %inner.channel_name, "cross-tab transport: broadcast");
                    return Ok((Outbound::Broadcast(channel), Some(task)));
                }
                Err(reason) => last_reason = reason,
            }
        }

        if store.kind() != BackendKind::KeyValue {
            warn!(
                storage_key = %inner.storage_key,
                fallback_blocked_by = %last_reason,
                "storage events need a simple key/value backend"
            );
            return Err(TransportUnavailable::IncompatibleBackend);
        }

        let events = store.mutation_events().ok_or(TransportUnavailable::NoMutationEvents)?;
        let task = runtime.spawn(storage_event_loop(Arc::clone(inner), events));
        debug!(storage_key = %inner.storage_key, "cross-tab transport: storage events");
        Ok((Outbound::StorageEvents, Some(task)))
    }

    pub fn transport_kind(&self) -> TransportKind {
        match self.outbound {
            Outbound::Broadcast(_) => TransportKind::Broadcast,
            Outbound::StorageEvents => TransportKind::StorageEvents,
            Outbound::Inactive => TransportKind::Inactive,
        }
    }

    /// Whether changes are propagated at all
    pub fn is_active(&self) -> bool {
        !matches!(self.outbound, Outbound::Inactive) && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn origin_id(&self) -> ContextId {
        self.inner.origin
    }

    pub fn storage_key(&self) -> &str {
        &self.inner.storage_key
    }

    pub fn channel_name(&self) -> &str {
        &self.inner.channel_name
    }

    /// Announce new collection contents
    ///
    /// Returns whether a message was published. On the storage-event path
    /// the store write is the announcement, so nothing is sent.
    pub fn broadcast(&self, items: &[Value]) -> bool {
        self.publish(ChangeMessage::update(self.inner.origin, &self.inner.storage_key, items.to_vec()))
    }

    /// Announce that the key was removed
    pub fn broadcast_remove(&self) -> bool {
        self.publish(ChangeMessage::remove(self.inner.origin, &self.inner.storage_key))
    }

    /// Announce that the store was cleared
    pub fn broadcast_clear(&self) -> bool {
        self.publish(ChangeMessage::clear(self.inner.origin, &self.inner.storage_key))
    }

    fn publish(&self, message: ChangeMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        match &self.outbound {
            Outbound::Broadcast(channel) => {
                channel.publish(message);
                record_counter(TAB_MESSAGES_SENT, 1);
                true
            }
            Outbound::StorageEvents | Outbound::Inactive => false,
        }
    }

    /// Run one inbound message through the receive path synchronously
    pub fn handle_message(&self, message: &ChangeMessage) -> Dispatch {
        self.inner.handle_message(message)
    }

    /// Stop receiving; idempotent
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let task = self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(task) = task {
            task.abort();
        }
        debug!(storage_key = %self.inner.storage_key, "cross-tab coordinator closed");
    }
}

impl Drop for TabCoordinator {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn handle_message(&self, message: &ChangeMessage) -> Dispatch {
        if self.closed.load(Ordering::Acquire) {
            return Dispatch::Closed;
        }
        if message.origin_id == self.origin {
            return Dispatch::IgnoredOwnOrigin;
        }
        if message.channel_key != self.storage_key {
            return Dispatch::IgnoredKeyMismatch;
        }

        let handler = &self.handler;
        let outcome = catch_unwind(AssertUnwindSafe(|| match message.kind {
            ChangeKind::Update => {
                handler.on_update(message.items.as_deref().unwrap_or_default(), message)
            }
            ChangeKind::Remove => handler.on_remove(message),
            ChangeKind::Clear => handler.on_clear(message),
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(storage_key = %self.storage_key, kind = ?message.kind, "cross-tab handler failed: {:#}", e);
            }
            Err(_) => {
                error!(storage_key = %self.storage_key, kind = ?message.kind, "cross-tab handler panicked");
            }
        }

        record_counter(TAB_MESSAGES_DISPATCHED, 1);
        Dispatch::Dispatched(message.kind)
    }

    /// Translate a backend mutation into a message, if it concerns us
    fn message_from_event(&self, event: StorageEvent) -> Option<ChangeMessage> {
        // Browsers never deliver a storage event to the writing context
        if event.source == self.origin {
            return None;
        }
        match (event.key, event.new_value) {
            (None, _) => Some(ChangeMessage::remove(event.source, &self.storage_key)),
            (Some(key), _) if key != self.storage_key => None,
            (Some(_), None) => Some(ChangeMessage::remove(event.source, &self.storage_key)),
            (Some(_), Some(bytes)) => match StoredPayload::decode(Some(&bytes)) {
                Ok(payload) => Some(ChangeMessage::update(
                    event.source,
                    &self.storage_key,
                    payload.items().to_vec(),
                )),
                Err(e) => {
                    warn!(storage_key = %self.storage_key, "ignoring undecodable storage event: {}", e);
                    None
                }
            },
        }
    }
}

async fn broadcast_loop(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<ChangeMessage>) {
    while let Some(message) = rx.recv().await {
        if inner.handle_message(&message) == Dispatch::Closed {
            break;
        }
    }
    debug!(channel = %inner.channel_name, "cross-tab channel disconnected");
}

async fn storage_event_loop(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<StorageEvent>) {
    while let Some(event) = rx.recv().await {
        if let Some(message) = inner.message_from_event(event) {
            if inner.handle_message(&message) == Dispatch::Closed {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SharedKvStore};
    use crate::tab_sync::context::BroadcastHub;
    use crate::tab_sync::handler::{ForwardingHandler, NoopHandler};
    use crate::test_utils::recv_timeout;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FailingHandler {
        calls: AtomicUsize,
    }

    impl CrossTabHandler for FailingHandler {
        fn on_update(&self, _items: &[Value], _message: &ChangeMessage) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("handler exploded")
        }

        fn on_remove(&self, _message: &ChangeMessage) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("handler panicked")
        }
    }

    fn coordinator(
        ctx: &BrowsingContext,
        store: &dyn BackingStore,
        handler: Arc<dyn CrossTabHandler>,
    ) -> TabCoordinator {
        TabCoordinator::new(ctx, "todos", store, CoordinatorOptions::default(), handler)
    }

    #[tokio::test]
    async fn test_prefers_broadcast() {
        let ctx = BrowsingContext::new(BroadcastHub::new());
        let coord = coordinator(&ctx, &MemoryStore::new(), Arc::new(NoopHandler));

        assert_eq!(coord.transport_kind(), TransportKind::Broadcast);
        assert!(coord.is_active());
        assert_eq!(coord.origin_id(), ctx.id());
        assert_eq!(coord.channel_name(), "kvsync:todos");
    }

    #[tokio::test]
    async fn test_falls_back_to_storage_events() {
        let shared = SharedKvStore::new();
        let ctx = BrowsingContext::without_broadcast();
        let store = shared.handle(ctx.id());
        let coord = coordinator(&ctx, &store, Arc::new(NoopHandler));

        assert_eq!(coord.transport_kind(), TransportKind::StorageEvents);
        // The store write is the signal; nothing is published
        assert!(!coord.broadcast(&[json!({"id": 1})]));
    }

    #[tokio::test]
    async fn test_force_storage_events() {
        let shared = SharedKvStore::new();
        let ctx = BrowsingContext::new(BroadcastHub::new());
        let store = shared.handle(ctx.id());
        let coord = TabCoordinator::new(
            &ctx,
            "todos",
            &store,
            CoordinatorOptions { force_storage_events: true, ..Default::default() },
            Arc::new(NoopHandler),
        );
        assert_eq!(coord.transport_kind(), TransportKind::StorageEvents);
    }

    #[tokio::test]
    async fn test_from_config_respects_enable_flag() {
        let shared = SharedKvStore::new();
        let ctx = BrowsingContext::new(BroadcastHub::new());
        let store = shared.handle(ctx.id());
        let mut config = CrossTabConfig::default();

        let off = TabCoordinator::from_config(&ctx, "todos", &store, &config, Arc::new(NoopHandler));
        assert_eq!(off.transport_kind(), TransportKind::Inactive);
        assert!(!off.broadcast(&[json!(1)]));

        config.enable_cross_tab_sync = true;
        let on = TabCoordinator::from_config(&ctx, "todos", &store, &config, Arc::new(NoopHandler));
        assert_eq!(on.transport_kind(), TransportKind::Broadcast);

        config.force_storage_events = true;
        let forced = TabCoordinator::from_config(&ctx, "todos", &store, &config, Arc::new(NoopHandler));
        assert_eq!(forced.transport_kind(), TransportKind::StorageEvents);
    }

    #[tokio::test]
    async fn test_inactive_without_any_transport() {
        let ctx = BrowsingContext::without_broadcast();
        let store = MemoryStore::with_kind(BackendKind::Structured);
        let coord = coordinator(&ctx, &store, Arc::new(NoopHandler));

        assert_eq!(coord.transport_kind(), TransportKind::Inactive);
        assert!(!coord.is_active());
        assert!(!coord.broadcast(&[]));
        assert!(!coord.broadcast_remove());
        assert!(!coord.broadcast_clear());
        coord.close();
    }

    #[tokio::test]
    async fn test_key_value_store_without_events_is_inactive() {
        let ctx = BrowsingContext::without_broadcast();
        let coord = coordinator(&ctx, &MemoryStore::new(), Arc::new(NoopHandler));
        assert_eq!(coord.transport_kind(), TransportKind::Inactive);
    }

    #[tokio::test]
    async fn test_hub_shutdown_degrades() {
        let hub = BroadcastHub::new();
        hub.shutdown();
        let ctx = BrowsingContext::new(hub);
        let coord = coordinator(&ctx, &MemoryStore::with_kind(BackendKind::Structured), Arc::new(NoopHandler));
        assert_eq!(coord.transport_kind(), TransportKind::Inactive);
    }

    #[test]
    fn test_inactive_outside_runtime() {
        let ctx = BrowsingContext::new(BroadcastHub::new());
        let coord = coordinator(&ctx, &MemoryStore::new(), Arc::new(NoopHandler));
        assert_eq!(coord.transport_kind(), TransportKind::Inactive);
    }

    #[tokio::test]
    async fn test_handle_message_filters() {
        let ctx = BrowsingContext::new(BroadcastHub::new());
        let coord = coordinator(&ctx, &MemoryStore::new(), Arc::new(NoopHandler));
        let other = ContextId::new();

        let own = ChangeMessage::update(ctx.id(), "todos", vec![]);
        assert_eq!(coord.handle_message(&own), Dispatch::IgnoredOwnOrigin);

        let wrong_key = ChangeMessage::update(other, "notes", vec![]);
        assert_eq!(coord.handle_message(&wrong_key), Dispatch::IgnoredKeyMismatch);

        let remove = ChangeMessage::remove(other, "todos");
        assert_eq!(coord.handle_message(&remove), Dispatch::Dispatched(ChangeKind::Remove));

        coord.close();
        assert_eq!(coord.handle_message(&remove), Dispatch::Closed);
    }

    #[tokio::test]
    async fn test_handler_failures_are_contained() {
        let ctx = BrowsingContext::new(BroadcastHub::new());
        let handler = Arc::new(FailingHandler { calls: AtomicUsize::new(0) });
        let coord = coordinator(&ctx, &MemoryStore::new(), handler.clone());
        let other = ContextId::new();

        let update = ChangeMessage::update(other, "todos", vec![json!(1)]);
        assert_eq!(coord.handle_message(&update), Dispatch::Dispatched(ChangeKind::Update));

        let remove = ChangeMessage::remove(other, "todos");
        assert_eq!(coord.handle_message(&remove), Dispatch::Dispatched(ChangeKind::Remove));

        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_sibling_only() {
        let hub = BroadcastHub::new();
        let ctx_a = BrowsingContext::new(hub.clone());
        let ctx_b = BrowsingContext::new(hub);

        let (handler_a, mut rx_a) = ForwardingHandler::new();
        let (handler_b, mut rx_b) = ForwardingHandler::new();
        let store = MemoryStore::new();
        let a = coordinator(&ctx_a, &store, Arc::new(handler_a));
        let _b = coordinator(&ctx_b, &store, Arc::new(handler_b));

        assert!(a.broadcast(&[json!({"id": 7})]));

        let received = recv_timeout(&mut rx_b, Duration::from_secs(1)).await.unwrap();
        assert_eq!(received.kind, ChangeKind::Update);
        assert_eq!(received.origin_id, ctx_a.id());
        assert_eq!(received.items, Some(vec![json!({"id": 7})]));

        // A never sees its own message
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let ctx = BrowsingContext::new(BroadcastHub::new());
        let coord = coordinator(&ctx, &MemoryStore::new(), Arc::new(NoopHandler));

        coord.close();
        coord.close();
        assert!(coord.is_closed());
        assert!(!coord.is_active());
        assert!(!coord.broadcast(&[]));
    }
}
