//! Execution contexts and the broadcast hub they share
//!
//! A `BrowsingContext` is one tab/window. Its `ContextId` is generated once
//! and handed to everything that publishes on its behalf, so a context can
//! always recognise (and drop) its own messages.

use super::errors::TransportUnavailable;
use super::message::ChangeMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Identity of one execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a fresh identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<ChangeMessage>>>>;

/// One named channel of a [`BroadcastHub`]
///
/// Every subscriber owns an unbounded queue, so a slow receiver delays its
/// own messages but never loses any.
#[derive(Debug, Clone)]
pub struct HubChannel {
    name: String,
    subscribers: Subscribers,
}

impl HubChannel {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive every message published from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Deliver `message` to every live subscriber, in publish order
    ///
    /// Returns how many subscribers got it. Dropped receivers are pruned.
    pub fn publish(&self, message: ChangeMessage) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        subscribers.len()
    }

    /// Subscribers still attached
    pub fn receiver_count(&self) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

/// Named pub/sub channels shared by every context of one origin
#[derive(Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, Subscribers>>>,
    shut_down: Arc<AtomicBool>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or join) the channel called `name`
    pub fn open(&self, name: &str) -> Result<HubChannel, TransportUnavailable> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(TransportUnavailable::HubShutDown);
        }

        let subscribers = Arc::clone(lock(&self.channels).entry(name.to_string()).or_default());
        Ok(HubChannel { name: name.to_string(), subscribers })
    }

    /// Refuse new channels and disconnect every subscriber
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        for (_, subscribers) in lock(&self.channels).drain() {
            lock(&subscribers).clear();
        }
    }

    /// Number of open channels
    pub fn channel_count(&self) -> usize {
        lock(&self.channels).len()
    }
}

/// One tab/window
#[derive(Clone)]
pub struct BrowsingContext {
    id: ContextId,
    hub: Option<BroadcastHub>,
}

impl BrowsingContext {
    /// Context with access to a broadcast hub
    pub fn new(hub: BroadcastHub) -> Self {
        Self { id: ContextId::new(), hub: Some(hub) }
    }

    /// Context where no broadcast primitive exists
    pub fn without_broadcast() -> Self {
        Self { id: ContextId::new(), hub: None }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn hub(&self) -> Option<&BroadcastHub> {
        self.hub.as_ref()
    }
}
