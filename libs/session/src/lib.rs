//! Orrery Session - client session against an orrery backend
//!
//! Request-style operations (narration, chat, live speech) travel over a
//! persistent event socket and are correlated with their response events.
//! Document operations (universes, templates, batch speech) are one-off
//! HTTP calls that never touch the socket.
//!
//! # Example
//!
//! ```no_run
//! use orrery_core::types::NarrationRequest;
//! use orrery_session::Session;
//!
//! # async fn example() -> orrery_session::Result<()> {
//! let session = Session::from_env()?;
//! session.on_navigate(|action| println!("navigate: {:?}", action))?;
//!
//! let request = NarrationRequest::new().with("object_id", "earth");
//! let narration = session.request_narration(&request).await?;
//! println!("{:?}", narration.get("text"));
//!
//! session.teardown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod pending;
pub mod protocol;
mod session;

pub use config::{CallTimeouts, SessionConfig};
pub use connection::{ConnectionManager, SocketFactory, TransportFactory};
pub use error::{Error, Result};
pub use session::Session;
