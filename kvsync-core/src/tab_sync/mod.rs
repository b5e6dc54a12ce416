/*
    tab_sync - Cross-context change propagation

    Every context (tab/window) that shows the same logical key gets a
    `TabCoordinator`. Changes go out over a named broadcast channel when the
    context has a hub, or ride on the shared store's own mutation events
    otherwise. Receivers never see their own messages.
*/

pub mod context;
pub mod coordinator;
pub mod errors;
pub mod handler;
pub mod message;

pub use context::{BroadcastHub, BrowsingContext, ContextId, HubChannel};
pub use coordinator::{CoordinatorOptions, Dispatch, TabCoordinator, TransportKind};
pub use errors::TransportUnavailable;
pub use handler::{CrossTabHandler, ForwardingHandler, NoopHandler};
pub use message::{channel_name, ChangeKind, ChangeMessage};
