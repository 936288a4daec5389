//! # parley-core
//!
//! Session, routing and history engine for the Parley chat relay.
//!
//! This crate holds all relay state and decides who receives what:
//!
//! - **Identity** - Connection id to display name bindings and the roster
//! - **Rooms** - Named groups of connections
//! - **Store** - Append-only message history per scope
//! - **Unread** - Per-recipient unread counters
//! - **Query** - Backward pagination and keyword search over history
//! - **Engine** - Applies inbound events and produces deliveries
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │ ClientEvent │────▶│ DeliveryEngine  │────▶│  Delivery   │
//! └─────────────┘     └─────────────────┘     └─────────────┘
//!                       │    │    │    │
//!          ┌────────────┘    │    │    └───────────┐
//!          ▼                 ▼    ▼                ▼
//!   ┌────────────┐  ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │ Identities │  │   Rooms    │ │   Store    │ │   Unread   │
//!   └────────────┘  └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! The engine does no I/O. A single owner feeds it events in order and
//! resolves each [`Delivery`] target against its live connections.

pub mod engine;
pub mod identity;
pub mod message;
pub mod query;
pub mod rooms;
pub mod store;
pub mod unread;

pub use engine::{Delivery, DeliveryEngine, EngineConfig, EngineStats, Outcome, Target};
pub use identity::{Identity, IdentityRegistry, ANONYMOUS};
pub use message::{private_key, MessageIdGenerator, Scope, ScopeKind, GLOBAL_SCOPE_KEY};
pub use query::{page_bounds, QueryService};
pub use rooms::RoomMembership;
pub use store::{MessageStore, StoreStats};
pub use unread::UnreadTracker;
