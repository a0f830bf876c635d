//! `wander_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - The wire contract lives here so both ends agree on it.
//! - Clear separation of concerns (net framing, protocol, rooms, config).
//! - No `unsafe`.

pub mod chat;
pub mod config;
pub mod math;
pub mod net;
pub mod player;
pub mod protocol;
pub mod room;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::player::*;
    pub use crate::protocol::*;
    pub use crate::room::*;
}
