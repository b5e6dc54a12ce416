//! Receiving side of cross-tab propagation

use super::message::{ChangeKind, ChangeMessage};
use serde_json::Value;
use tokio::sync::mpsc;

/// Callbacks invoked for changes made by other contexts
///
/// Errors are logged by the coordinator and never reach the transport.
pub trait CrossTabHandler: Send + Sync {
    fn on_update(&self, _items: &[Value], _message: &ChangeMessage) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_remove(&self, _message: &ChangeMessage) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_clear(&self, _message: &ChangeMessage) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Handler that ignores everything
pub struct NoopHandler;

impl CrossTabHandler for NoopHandler {}

/// Forwards every dispatched message into an unbounded channel
///
/// Useful for bridging into async code that wants to `await` changes.
pub struct ForwardingHandler {
    tx: mpsc::UnboundedSender<ChangeMessage>,
}

impl ForwardingHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChangeMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, message: &ChangeMessage) -> anyhow::Result<()> {
        self.tx
            .send(message.clone())
            .map_err(|_| anyhow::anyhow!("forwarding receiver dropped"))
    }
}

impl CrossTabHandler for ForwardingHandler {
    fn on_update(&self, _items: &[Value], message: &ChangeMessage) -> anyhow::Result<()> {
        debug_assert_eq!(message.kind, ChangeKind::Update);
        self.forward(message)
    }

    fn on_remove(&self, message: &ChangeMessage) -> anyhow::Result<()> {
        self.forward(message)
    }

    fn on_clear(&self, message: &ChangeMessage) -> anyhow::Result<()> {
        self.forward(message)
    }
}
