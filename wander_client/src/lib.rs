//! `wander_client`
//!
//! Client-side systems:
//! - Connection and handshake over the reliable stream
//! - Walker input and per-tick movement
//! - View of the other players in the current room

pub mod client;
pub mod input;
pub mod view;

pub use client::WanderClient;
