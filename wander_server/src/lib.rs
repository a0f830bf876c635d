//! `wander_server`
//!
//! Server-side systems:
//! - Player registry (who is connected, where they stand)
//! - Room router (membership queries, join/switch/leave sequencing)
//! - Sync hub (one handler per inbound message type)
//! - TCP transport with a single state-owning hub task
//!
//! Rooms are a view over the registry, never a separate collection.

pub mod hub;
pub mod registry;
pub mod router;
pub mod server;

pub use hub::SyncHub;
pub use server::{RoomServer, ServerHandle};
