//! Orrery Core - records and plumbing shared by every orrery library.

pub mod error;
pub mod logging;
pub mod types;

pub use error::{Error, Result};
