//! Emit an event to connected peers and await their acknowledgments.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    ackbridge_protocol::{Frame, ProtocolError},
    futures::future::{select_ok, try_join_all},
    tokio::sync::oneshot,
    tracing::{debug, warn},
};

use crate::state::{GatewayState, PendingAck, millis};

/// How many acknowledgments an emit waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanIn {
    /// Sent to every peer; the first ack wins.
    First,
    /// Sent to every peer; resolves once each of them has acked.
    All,
}

/// Acknowledgment payloads gathered by [`emit_with_ack`].
#[derive(Debug, Clone, PartialEq)]
pub enum Acked {
    One(serde_json::Value),
    /// In the order peers were addressed. Empty when no peer was connected.
    Many(Vec<serde_json::Value>),
}

impl Acked {
    pub fn into_value(self) -> serde_json::Value {
        match self {
            Self::One(v) => v,
            Self::Many(vs) => serde_json::Value::Array(vs),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no peers connected")]
    NoPeers,
    #[error("operation has timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("peer disconnected before acknowledging")]
    PeerDisconnected,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Removes this call's correlation entries however the call ends, including
/// when the awaiting future is dropped.
struct PendingGuard {
    state: Arc<GatewayState>,
    ack_ids: Vec<u64>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.state.pending();
        for id in &self.ack_ids {
            pending.remove(id);
        }
    }
}

/// Emit `event` to every connected peer and wait up to `timeout` for acks.
pub async fn emit_with_ack(
    state: &Arc<GatewayState>,
    event: &str,
    data: serde_json::Value,
    timeout: Duration,
    fan_in: FanIn,
) -> Result<Acked, BridgeError> {
    let mut guard = PendingGuard {
        state: Arc::clone(state),
        ack_ids: Vec::new(),
    };
    let mut waiters = Vec::new();

    {
        let peers = state.peers.read().await;
        if peers.is_empty() {
            return match fan_in {
                FanIn::First => Err(BridgeError::NoPeers),
                FanIn::All => Ok(Acked::Many(Vec::new())),
            };
        }

        let mut pending = state.pending();
        for peer in peers.values() {
            let ack_id = state.next_ack_id();
            let frame = Frame::event_with_ack(event, data.clone(), ack_id).to_json()?;
            let (tx, rx) = oneshot::channel();
            pending.insert(ack_id, PendingAck {
                conn_id: peer.conn_id.clone(),
                event: event.to_string(),
                sender: tx,
                created_at: Instant::now(),
            });
            guard.ack_ids.push(ack_id);
            if !peer.send(&frame) {
                // Write loop is gone; dropping the sender fails this waiter.
                pending.remove(&ack_id);
                warn!(conn_id = %peer.conn_id, event, "peer send failed");
            }
            waiters.push(rx);
        }
    }

    debug!(
        event,
        peers = waiters.len(),
        ?fan_in,
        timeout_ms = millis(timeout),
        "emit with ack"
    );

    let collect = async {
        match fan_in {
            FanIn::First => select_ok(waiters)
                .await
                .map(|(v, _rest)| Acked::One(v))
                .map_err(|_| BridgeError::PeerDisconnected),
            FanIn::All => try_join_all(waiters)
                .await
                .map(Acked::Many)
                .map_err(|_| BridgeError::PeerDisconnected),
        }
    };

    let result = match tokio::time::timeout(timeout, collect).await {
        Ok(result) => result,
        Err(_) => Err(BridgeError::Timeout(timeout)),
    };
    drop(guard);
    result
}
