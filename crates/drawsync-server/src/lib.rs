//! DrawSync Relay Server
//!
//! Accepts one sync per TCP connection, merges the sender's document into a
//! single persisted snapshot and, when the sender is who it claims to be,
//! returns the merged document. See [`drawsync_core::protocol`] for the wire
//! format.

pub mod config;
mod error;
pub mod listener;
pub mod store;
mod wire;

pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use listener::{Exchange, RelayListener};
pub use store::RelayStore;
