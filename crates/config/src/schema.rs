//! Config schema types (server, auth allow-list, realtime, route timeouts, peer).

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use ackbridge_protocol::{DEFAULT_CLIENT_ID, HANDSHAKE_TIMEOUT_MS};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub realtime: RealtimeConfig,
    /// Per-event acknowledgment timeout overrides in milliseconds,
    /// e.g. `"leave:getAll" = 5000`.
    pub timeouts: HashMap<String, u64>,
    pub peer: PeerConfig,
}

/// HTTP + WebSocket listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8001,
        }
    }
}

/// Connection allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Client IDs admitted at handshake time.
    pub allowed_client_ids: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allowed_client_ids: vec![DEFAULT_CLIENT_ID.to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Interval of the `server-time` broadcast. 0 disables it.
    pub server_time_interval_ms: u64,
    pub handshake_timeout_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            server_time_interval_ms: 1_000,
            handshake_timeout_ms: HANDSHAKE_TIMEOUT_MS,
        }
    }
}

impl RealtimeConfig {
    pub fn server_time_interval(&self) -> Option<Duration> {
        (self.server_time_interval_ms > 0)
            .then(|| Duration::from_millis(self.server_time_interval_ms))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Settings for the bundled peer client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Gateway WebSocket URL.
    pub url: String,
    pub client_id: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8001/ws".into(),
            client_id: DEFAULT_CLIENT_ID.into(),
        }
    }
}
