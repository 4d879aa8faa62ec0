//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Participants currently registered with the hub.
    pub participants: usize,
    /// Sessions with at least one participant.
    pub sessions: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, participants: usize, sessions: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        participants,
        sessions,
    }
}
