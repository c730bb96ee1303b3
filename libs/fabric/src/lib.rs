//! Orrery Fabric - Low-level transport and codec layer
//!
//! Provides the two transports the orrery client talks over: a persistent,
//! event-based socket (websocket with a long-polling fallback) and a
//! stateless JSON document client.
//!
//! # Example
//!
//! ```no_run
//! use orrery_fabric::{DocumentClient, EventTransport, SocketTransport};
//! use serde_json::{json, Value};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // One-off document request
//! let documents = DocumentClient::new("http://localhost:3000")?;
//! let languages: Value = documents.get_json(&["speech", "languages"]).await?;
//!
//! // Or use the persistent socket
//! let socket = SocketTransport::new("http://localhost:3000")?;
//! socket.events().on("navigate_to", |action| println!("navigate: {action}"));
//! socket.connect();
//! socket.emit("chat_message", json!({ "message": "hello" })).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod request;
pub mod transport;

// Re-exports for convenience
pub use codec::Frame;
pub use error::{Error, Result};
pub use request::DocumentClient;
pub use transport::{EventBus, EventTransport, ListenerId, SocketTransport};
