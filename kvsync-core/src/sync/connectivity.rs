//! Online/offline signal
//!
//! Stands in for the browser's `online`/`offline` events. Whoever knows
//! about the network flips it; sync engines subscribe.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Flip the state; subscribers only wake on an actual change
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let connectivity = Connectivity::offline();
        let mut rx = connectivity.subscribe();
        assert!(!*rx.borrow_and_update());

        connectivity.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(connectivity.is_online());
    }

    #[test]
    fn test_same_state_does_not_notify() {
        let connectivity = Connectivity::online();
        let mut rx = connectivity.subscribe();
        rx.borrow_and_update();

        connectivity.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }
}
