//! Settings type definitions.
//!
//! Every section implements [`Default`] with production values and is marked
//! `#[serde(default)]`, so partial JSON files only need the keys they change.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RookSettings {
    /// HTTP + WebSocket server.
    pub server: ServerSettings,
    /// Durable game store.
    pub store: StoreSettings,
    /// Computer opponent.
    pub engine: EngineSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RookSettings {
    /// Reject combinations the session layer cannot run with.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if server.outbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outbound_queue_capacity must be at least 1".into(),
            ));
        }
        if server.hub_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.hub_queue_capacity must be at least 1".into(),
            ));
        }
        if server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.max_message_size must be at least 1".into(),
            ));
        }
        if server.pong_wait_ms == 0 || server.write_wait_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server timeouts must be non-zero".into(),
            ));
        }
        if server.ping_period() >= server.pong_wait() || server.ping_period().is_zero() {
            return Err(SettingsError::InvalidValue(format!(
                "server.ping_period_ms ({}) must be positive and shorter than server.pong_wait_ms ({})",
                server.ping_period().as_millis(),
                server.pong_wait_ms
            )));
        }
        if self.engine.search_depth == 0 {
            return Err(SettingsError::InvalidValue(
                "engine.search_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Which participants receive a broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubScope {
    /// Only participants attached to the sender's session.
    #[default]
    Session,
    /// Every connected participant, regardless of session.
    Global,
}

impl std::str::FromStr for HubScope {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "session" => Ok(Self::Session),
            "global" => Ok(Self::Global),
            other => Err(format!("unknown hub scope: {other}")),
        }
    }
}

/// Server network and session-layer settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Largest inbound frame accepted from a peer, in bytes.
    pub max_message_size: usize,
    /// Capacity of each participant's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Capacity of the hub's command queue.
    pub hub_queue_capacity: usize,
    /// Deadline for a single frame write.
    pub write_wait_ms: u64,
    /// Read deadline, refreshed by every pong.
    pub pong_wait_ms: u64,
    /// Keepalive ping interval. Defaults to 9/10 of `pong_wait_ms`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_period_ms: Option<u64>,
    /// Broadcast scope.
    pub hub_scope: HubScope,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_message_size: 512,
            outbound_queue_capacity: 256,
            hub_queue_capacity: 1024,
            write_wait_ms: 10_000,
            pong_wait_ms: 60_000,
            ping_period_ms: None,
            hub_scope: HubScope::Session,
        }
    }
}

impl ServerSettings {
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn ping_period(&self) -> Duration {
        self.ping_period_ms
            .map_or_else(|| self.pong_wait() * 9 / 10, Duration::from_millis)
    }
}

/// Durable store settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Database file. Relative paths resolve against `~/.rook`.
    pub db_path: String,
    /// Delete games not updated for this many days. `None` keeps everything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    /// How often the retention sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "games.db".to_string(),
            retention_days: None,
            sweep_interval_secs: 3600,
        }
    }
}

/// Computer opponent settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Plies searched per reply.
    pub search_depth: u8,
    /// Deadline for one reply before the move is deferred.
    pub think_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            search_depth: 3,
            think_timeout_ms: 5_000,
        }
    }
}

impl EngineSettings {
    pub fn think_timeout(&self) -> Duration {
        Duration::from_millis(self.think_timeout_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level (`RUST_LOG` takes precedence).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-target overrides, e.g. `("rook_server::hub", "debug")`.
    pub modules: Vec<(String, String)>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: Vec::new(),
        }
    }
}
