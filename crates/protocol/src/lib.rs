//! Wire protocol shared by the gateway and its peers.
//!
//! Every WebSocket text frame is a JSON object tagged by `"type"`:
//!
//! | type            | direction | meaning                                     |
//! |-----------------|-----------|---------------------------------------------|
//! | `connect`       | P → G     | handshake, must be the first frame          |
//! | `connected`     | G → P     | handshake accepted                          |
//! | `connect_error` | G → P     | handshake rejected, socket closes after     |
//! | `event`         | both      | named event, `ack` set when a reply is owed |
//! | `ack`           | both      | reply to an event that carried `ack`        |

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// WebSocket upgrade path on the gateway.
pub const WS_PATH: &str = "/ws";

/// How long a fresh socket may take to send its `connect` frame.
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Identifier the bundled peer presents when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "0195cdb1-950b-7b2b-9827-f41275575743";

/// Event names used on the wire.
pub mod events {
    pub const CLIENTS_ONLINE: &str = "clients-online";
    pub const SERVER_TIME: &str = "server-time";
    pub const MESSAGE: &str = "message";
    pub const LOGIN: &str = "login";
    pub const CHANGE_PASSWORD: &str = "change-password";
    pub const LOGOUT: &str = "logout";
    pub const LEAVE_ADD: &str = "leave:add";
    pub const LEAVE_GET_ALL: &str = "leave:getAll";
    pub const LEAVE_GET_ALL_FROM_INTERN: &str = "leave:getAllFromIntern";
    pub const LEAVE_GET_ALL_FOR_MENTOR: &str = "leave:getAllForMentor";
    pub const LEAVE_UPDATE: &str = "leave:update";
    pub const LEAVE_DELETE: &str = "leave:delete";
    pub const MENTOR_GET_FILTERED: &str = "mentorConnection:getFiltered";
    pub const MENTOR_GET_ONE: &str = "mentorConnection:getOne";
    pub const INTERNSHIP_GET_ALL: &str = "internship:getAll";
    pub const ANNOUNCEMENT_GET_ALL_FOR_USER: &str = "announcement:getAllForUser";
    pub const ANNOUNCEMENT_GET_ONE: &str = "announcement:getOne";
    pub const ANNOUNCEMENT_ADD_WITH_TARGET_IDS: &str = "announcement:addWithTargetIds";
    pub const ANNOUNCEMENT_UPDATE: &str = "announcement:update";
    pub const ANNOUNCEMENT_DELETE: &str = "announcement:delete";
}

/// Reason codes carried by `connect_error`.
pub mod reasons {
    pub const INVALID_CLIENT_ID: &str = "Invalid clientID";
    pub const HANDSHAKE_TIMEOUT: &str = "handshake timeout";
    pub const EXPECTED_CONNECT: &str = "expected connect frame";
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Authentication data supplied in the handshake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandshakeAuth {
    #[serde(
        rename = "clientID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_id: Option<String>,
}

/// Extra detail attached to a rejected handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectErrorData {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Connect {
        #[serde(default)]
        auth: HandshakeAuth,
    },
    Connected {
        sid: String,
    },
    ConnectError {
        message: String,
        data: ConnectErrorData,
    },
    Event {
        event: String,
        #[serde(default)]
        data: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack: Option<u64>,
    },
    Ack {
        id: u64,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl Frame {
    pub fn connect(client_id: impl Into<String>) -> Self {
        Self::Connect {
            auth: HandshakeAuth {
                client_id: Some(client_id.into()),
            },
        }
    }

    /// Rejection frame; `message` and `reason` carry the same text.
    pub fn connect_error(reason: &str) -> Self {
        Self::ConnectError {
            message: reason.to_string(),
            data: ConnectErrorData {
                reason: reason.to_string(),
            },
        }
    }

    /// Fire-and-forget event.
    pub fn event(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self::Event {
            event: event.into(),
            data,
            ack: None,
        }
    }

    /// Event that expects an `ack` frame with the same id.
    pub fn event_with_ack(event: impl Into<String>, data: serde_json::Value, ack: u64) -> Self {
        Self::Event {
            event: event.into(),
            data,
            ack: Some(ack),
        }
    }

    pub fn ack(id: u64, data: serde_json::Value) -> Self {
        Self::Ack { id, data }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed frame: {0}")]
    Decode(#[source] serde_json::Error),
}
