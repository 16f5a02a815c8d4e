use {
    ackbridge_protocol::{Frame, events},
    tracing::{debug, warn},
};

use crate::state::{ConnectedPeer, GatewayState};

/// Push one serialized frame to each peer. Returns how many accepted it.
pub fn send_to_all<'a>(peers: impl IntoIterator<Item = &'a ConnectedPeer>, frame: &str) -> usize {
    peers.into_iter().filter(|p| p.send(frame)).count()
}

/// Broadcast a fire-and-forget event to every connected peer.
pub async fn broadcast(state: &GatewayState, event: &str, data: serde_json::Value) -> usize {
    let frame = match Frame::event(event, data).to_json() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(event, error = %e, "failed to encode broadcast");
            return 0;
        },
    };
    let peers = state.peers.read().await;
    let delivered = send_to_all(peers.values(), &frame);
    debug!(event, delivered, "broadcast");
    delivered
}

/// Broadcast the current UTC time, only when someone is listening.
pub async fn broadcast_server_time(state: &GatewayState) {
    if state.peer_count().await == 0 {
        return;
    }
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    broadcast(state, events::SERVER_TIME, serde_json::Value::String(now)).await;
}
