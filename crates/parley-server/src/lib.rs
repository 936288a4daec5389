//! # Parley Server
//!
//! Realtime chat relay server: configuration, the hub task that owns the
//! delivery engine, HTTP/WebSocket routes and metrics.

pub mod config;
pub mod handlers;
pub mod hub;
pub mod metrics;

pub use config::Config;
pub use handlers::{run_connection, run_server, SessionSettings};
pub use hub::{Hub, HubCommand, HubHandle};
