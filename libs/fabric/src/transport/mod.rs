use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;

pub mod bus;
mod link;
pub mod socket;

pub use self::bus::{EventBus, ListenerId};
pub use self::socket::{Protocol, SocketOptions, SocketTransport, SocketTransportBuilder};

/// Lifecycle events synthesised by every event transport.
pub mod lifecycle {
    /// The link opened. Payload: `null`.
    pub const CONNECT: &str = "connect";
    /// One connection attempt failed. Payload: `{"message": ...}`.
    pub const CONNECT_ERROR: &str = "connect_error";
    /// An open link closed. Payload: reason string.
    pub const DISCONNECT: &str = "disconnect";

    /// Reason reported when the client asked for the disconnect.
    pub const CLIENT_DISCONNECT: &str = "io client disconnect";
    /// Reason reported when the peer closed the link.
    pub const TRANSPORT_CLOSE: &str = "transport close";
    /// Reason reported when the link failed mid-stream.
    pub const TRANSPORT_ERROR: &str = "transport error";
}

/// Persistent, bidirectional, event-based transport
///
/// Construction never connects. Inbound events and the [`lifecycle`] events
/// are delivered through [`EventTransport::events`].
#[async_trait::async_trait]
pub trait EventTransport: Send + Sync {
    /// Observer registry for inbound and lifecycle events
    fn events(&self) -> &Arc<EventBus>;

    /// Start connecting in the background
    ///
    /// A no-op while a connection is open or being established.
    fn connect(&self);

    /// Close the connection and stop reconnecting. A no-op when idle.
    fn disconnect(&self);

    /// Whether the link is currently open
    fn is_connected(&self) -> bool;

    /// Send one named event
    ///
    /// Events emitted while (re)connecting are queued until the link opens.
    /// Fails with `NotConnected` when no connection is running.
    async fn emit(&self, event: &str, data: Value) -> Result<()>;
}
