//! Configuration system.
//!
//! Server and client configuration load from JSON strings/files. Every field
//! has a serde default, so a config file only needs the values it overrides.
//! Environment and CLI overrides are applied by the binaries on top.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::room::{RoomCatalog, RoomKey};

/// Port used when neither the config file, `PORT`, nor the CLI sets one.
pub const DEFAULT_PORT: u16 = 3000;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind, e.g. `0.0.0.0`.
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Room every new connection starts in, and the fallback for unknown keys.
    #[serde(default = "default_room")]
    pub default_room: RoomKey,
    /// Generated display names are `"<prefix> <id>"`.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Per-connection outbound frame queue depth.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Largest accepted frame payload in bytes.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    /// Chat messages allowed per connection within the rate window.
    #[serde(default = "default_chat_rate_messages")]
    pub chat_rate_messages: u32,
    #[serde(default = "default_chat_rate_window_secs")]
    pub chat_rate_window_secs: u64,
    #[serde(default = "RoomCatalog::builtin")]
    pub rooms: RoomCatalog,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_room() -> RoomKey {
    RoomKey::new("map1")
}

fn default_name_prefix() -> String {
    "Player".to_string()
}

fn default_outbound_queue() -> usize {
    256
}

fn default_max_frame_len() -> usize {
    crate::net::MAX_FRAME_LEN
}

fn default_chat_rate_messages() -> u32 {
    crate::chat::RATE_LIMIT_MESSAGES
}

fn default_chat_rate_window_secs() -> u64 {
    crate::chat::RATE_LIMIT_WINDOW.as_secs()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            port: default_port(),
            default_room: default_room(),
            name_prefix: default_name_prefix(),
            outbound_queue: default_outbound_queue(),
            max_frame_len: default_max_frame_len(),
            chat_rate_messages: default_chat_rate_messages(),
            chat_rate_window_secs: default_chat_rate_window_secs(),
            rooms: RoomCatalog::builtin(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Listen address as `host:port`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Applies a port override (`PORT` env or `--port`). Unparseable values are rejected.
    pub fn apply_port(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        if let Some(raw) = value {
            self.port = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw.to_string()))?;
        }
        Ok(())
    }

    /// Applies a `host:port` listen address override.
    pub fn apply_addr(&mut self, addr: &str) -> Result<(), ConfigError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidAddr(addr.to_string()))?;
        self.port = port
            .parse()
            .map_err(|_| ConfigError::InvalidAddr(addr.to_string()))?;
        self.bind_host = host.to_string();
        Ok(())
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rooms.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        if !self.rooms.contains(self.default_room.as_str()) {
            return Err(ConfigError::UnknownDefaultRoom(self.default_room.clone()));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::ZeroQueue);
        }
        Ok(())
    }
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server address, e.g. `127.0.0.1:3000`.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Display name requested after connecting; empty keeps the generated one.
    #[serde(default)]
    pub player_name: String,
    /// Movement updates per second.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Largest inbound frame payload accepted from the server. Must be at
    /// least the server's `max_frame_len`.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

fn default_server_addr() -> String {
    format!("127.0.0.1:{DEFAULT_PORT}")
}

fn default_tick_hz() -> u32 {
    20
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            player_name: String::new(),
            tick_hz: default_tick_hz(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyCatalog,
    UnknownDefaultRoom(RoomKey),
    InvalidPort(String),
    InvalidAddr(String),
    ZeroQueue,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyCatalog => write!(f, "room catalog is empty"),
            ConfigError::UnknownDefaultRoom(key) => {
                write!(f, "default room '{key}' is not in the room catalog")
            }
            ConfigError::InvalidPort(raw) => write!(f, "invalid port '{raw}'"),
            ConfigError::InvalidAddr(raw) => write!(f, "invalid listen address '{raw}'"),
            ConfigError::ZeroQueue => write!(f, "outbound_queue must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}
