//! Cross-tab transport errors
//!
//! None of these reach callers of `TabCoordinator`: they explain why a
//! coordinator came up inactive and are logged at construction.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportUnavailable {
    /// Cross-tab sync is switched off in configuration
    #[error("cross-tab sync is disabled")]
    Disabled,

    /// The context has no broadcast hub
    #[error("no broadcast hub in this context")]
    NoHub,

    /// The hub refused to open a channel
    #[error("broadcast hub is shut down")]
    HubShutDown,

    /// Backend cannot deliver mutation events
    #[error("backing store does not emit mutation events")]
    NoMutationEvents,

    /// Storage events only work with simple key/value backends
    #[error("backing store is not a simple key/value store")]
    IncompatibleBackend,

    /// Receive loop needs a tokio runtime
    #[error("no async runtime to drive the receive loop")]
    NoRuntime,
}
