//! Server configuration.

use std::time::Duration;

use rook_settings::{HubScope, RookSettings};

/// Per-connection limits shared by both pumps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Capacity of each participant's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Deadline for one frame write.
    pub write_wait: Duration,
    /// Read deadline, refreshed by every pong.
    pub pong_wait: Duration,
    /// Keepalive ping interval. Strictly shorter than `pong_wait`.
    pub ping_period: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_message_size: 512,
            outbound_queue_capacity: 256,
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
        }
    }
}

/// Configuration for the rook server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Connection limits.
    pub limits: SessionLimits,
    /// Which participants a broadcast reaches.
    pub hub_scope: HubScope,
    /// Capacity of the hub's command queue.
    pub hub_queue_capacity: usize,
    /// Plies the engine searches per reply.
    pub search_depth: u8,
    /// How long a computer-play request waits for the engine.
    pub think_timeout: Duration,
    /// Delete games idle for longer than this. `None` keeps everything.
    pub retention: Option<Duration>,
    /// Interval between retention sweeps.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            limits: SessionLimits::default(),
            hub_scope: HubScope::Session,
            hub_queue_capacity: 1024,
            search_depth: 3,
            think_timeout: Duration::from_secs(5),
            retention: None,
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl From<&RookSettings> for ServerConfig {
    fn from(settings: &RookSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            limits: SessionLimits {
                max_message_size: server.max_message_size,
                outbound_queue_capacity: server.outbound_queue_capacity,
                write_wait: server.write_wait(),
                pong_wait: server.pong_wait(),
                ping_period: server.ping_period(),
            },
            hub_scope: server.hub_scope,
            hub_queue_capacity: server.hub_queue_capacity,
            search_depth: settings.engine.search_depth,
            think_timeout: settings.engine.think_timeout(),
            retention: settings
                .store
                .retention_days
                .map(|days| Duration::from_secs(u64::from(days) * 24 * 60 * 60)),
            sweep_interval: Duration::from_secs(settings.store.sweep_interval_secs.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_ephemeral_localhost() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_limits_keep_ping_inside_pong_wait() {
        let limits = SessionLimits::default();
        assert!(limits.ping_period < limits.pong_wait);
        assert_eq!(limits.max_message_size, 512);
        assert_eq!(limits.outbound_queue_capacity, 256);
    }

    #[test]
    fn from_default_settings_matches_defaults() {
        let cfg = ServerConfig::from(&RookSettings::default());
        assert_eq!(cfg.limits, SessionLimits::default());
        assert_eq!(cfg.hub_scope, HubScope::Session);
        assert_eq!(cfg.search_depth, 3);
        assert_eq!(cfg.retention, None);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn retention_days_convert_to_duration() {
        let mut settings = RookSettings::default();
        settings.store.retention_days = Some(2);
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.retention, Some(Duration::from_secs(2 * 86_400)));
    }
}
