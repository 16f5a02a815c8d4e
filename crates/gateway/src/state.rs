use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    ackbridge_config::{BridgeConfig, RealtimeConfig},
    ackbridge_protocol::{Frame, events},
    tokio::sync::{RwLock, mpsc, oneshot},
    tracing::{debug, warn},
};

use crate::{auth::AllowList, broadcast::send_to_all};

// ── Connected peer ───────────────────────────────────────────────────────────

/// A WebSocket peer that passed the handshake.
#[derive(Debug)]
pub struct ConnectedPeer {
    pub conn_id: String,
    pub client_id: String,
    pub remote_addr: Option<SocketAddr>,
    /// Channel for sending serialized frames to this peer's write loop.
    pub sender: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
}

impl ConnectedPeer {
    /// Send a serialized JSON frame to this peer.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Pending acknowledgment ───────────────────────────────────────────────────

/// An emitted event waiting for one peer's acknowledgment.
#[derive(Debug)]
pub struct PendingAck {
    /// Connection the event was addressed to; acks from elsewhere are refused.
    pub conn_id: String,
    pub event: String,
    pub sender: oneshot::Sender<serde_json::Value>,
    pub created_at: Instant,
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
///
/// `peers` is only written by [`GatewayState::connect_peer`] and
/// [`GatewayState::disconnect_peer`], which also publish the new count while
/// still holding the write lock, so every peer observes counts in order.
pub struct GatewayState {
    /// Admitted peers, keyed by conn_id.
    pub peers: RwLock<HashMap<String, ConnectedPeer>>,
    /// Acks owed by peers, keyed by ack id.
    pub pending_acks: Mutex<HashMap<u64, PendingAck>>,
    next_ack: AtomicU64,
    pub allow_list: AllowList,
    pub realtime: RealtimeConfig,
    /// Per-event timeout overrides from config.
    pub timeouts: HashMap<String, Duration>,
    pub version: String,
}

impl GatewayState {
    pub fn new(config: &BridgeConfig) -> Arc<Self> {
        Arc::new(Self {
            peers: RwLock::new(HashMap::new()),
            pending_acks: Mutex::new(HashMap::new()),
            next_ack: AtomicU64::new(0),
            allow_list: AllowList::new(config.auth.allowed_client_ids.iter().cloned()),
            realtime: config.realtime.clone(),
            timeouts: config
                .timeouts
                .iter()
                .map(|(event, ms)| (event.clone(), Duration::from_millis(*ms)))
                .collect(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    pub fn next_ack_id(&self) -> u64 {
        self.next_ack.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Effective timeout for `event`: config override, else the route default.
    pub fn timeout_for(&self, event: &str, default: Duration) -> Duration {
        self.timeouts.get(event).copied().unwrap_or(default)
    }

    pub(crate) fn pending(&self) -> MutexGuard<'_, HashMap<u64, PendingAck>> {
        self.pending_acks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of acknowledgments currently awaited.
    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Admit a peer and broadcast the new `clients-online` count.
    pub async fn connect_peer(&self, peer: ConnectedPeer) -> usize {
        let mut peers = self.peers.write().await;
        peers.insert(peer.conn_id.clone(), peer);
        let count = peers.len();
        publish_count(&peers, count);
        count
    }

    /// Remove a peer, fail its outstanding acks, and broadcast the new count.
    pub async fn disconnect_peer(&self, conn_id: &str) -> Option<ConnectedPeer> {
        let mut peers = self.peers.write().await;
        let removed = peers.remove(conn_id)?;

        let dropped = {
            let mut pending = self.pending();
            let before = pending.len();
            // Dropping the senders wakes the waiting bridge calls.
            pending.retain(|_, p| p.conn_id != conn_id);
            before - pending.len()
        };
        if dropped > 0 {
            debug!(conn_id, dropped, "released acks owed by disconnected peer");
        }

        publish_count(&peers, peers.len());
        Some(removed)
    }

    /// Number of connected peers.
    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Send a frame to a single peer.
    pub async fn send_to(&self, conn_id: &str, frame: &str) -> bool {
        self.peers
            .read()
            .await
            .get(conn_id)
            .is_some_and(|p| p.send(frame))
    }

    /// Deliver an inbound `ack` frame to the bridge call waiting on it.
    ///
    /// Returns false when the id is unknown or belongs to another connection.
    pub fn resolve_ack(&self, conn_id: &str, ack_id: u64, data: serde_json::Value) -> bool {
        let mut pending = self.pending();
        match pending.get(&ack_id) {
            Some(p) if p.conn_id == conn_id => {},
            Some(p) => {
                warn!(conn_id, ack_id, owner = %p.conn_id, "ack from wrong connection ignored");
                return false;
            },
            None => {
                warn!(conn_id, ack_id, "ack for unknown or expired id ignored");
                return false;
            },
        }
        let Some(entry) = pending.remove(&ack_id) else {
            return false;
        };
        debug!(
            conn_id,
            ack_id,
            event = %entry.event,
            elapsed_ms = millis(entry.created_at.elapsed()),
            "ack received"
        );
        // The waiter may already have timed out; nothing to do then.
        let _ = entry.sender.send(data);
        true
    }
}

/// Whole milliseconds in `d`, saturating.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn publish_count(peers: &HashMap<String, ConnectedPeer>, count: usize) {
    match Frame::event(events::CLIENTS_ONLINE, serde_json::json!(count)).to_json() {
        Ok(frame) => {
            send_to_all(peers.values(), &frame);
        },
        Err(e) => warn!(error = %e, "failed to encode clients-online"),
    }
    debug!(peers = count, "clients-online");
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_peer(conn_id: &str) -> (ConnectedPeer, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ConnectedPeer {
                conn_id: conn_id.to_string(),
                client_id: "test".to_string(),
                remote_addr: None,
                sender: tx,
                connected_at: Instant::now(),
            },
            rx,
        )
    }

    fn last_count(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<u64> {
        let mut last = None;
        while let Ok(text) = rx.try_recv() {
            if let Ok(Frame::Event { event, data, .. }) = Frame::from_json(&text)
                && event == events::CLIENTS_ONLINE
            {
                last = data.as_u64();
            }
        }
        last
    }

    #[tokio::test]
    async fn connect_and_disconnect_broadcast_count() {
        let state = GatewayState::new(&BridgeConfig::default());
        let (a, mut rx_a) = test_peer("a");
        let (b, mut rx_b) = test_peer("b");

        assert_eq!(state.connect_peer(a).await, 1);
        assert_eq!(last_count(&mut rx_a), Some(1));

        assert_eq!(state.connect_peer(b).await, 2);
        assert_eq!(last_count(&mut rx_a), Some(2));
        assert_eq!(last_count(&mut rx_b), Some(2));

        assert!(state.disconnect_peer("b").await.is_some());
        assert_eq!(last_count(&mut rx_a), Some(1));
        assert_eq!(state.peer_count().await, 1);
    }

    #[tokio::test]
    async fn disconnect_unknown_is_noop() {
        let state = GatewayState::new(&BridgeConfig::default());
        assert!(state.disconnect_peer("ghost").await.is_none());
    }

    #[tokio::test]
    async fn resolve_ack_checks_owner() {
        let state = GatewayState::new(&BridgeConfig::default());
        let (tx, mut rx) = oneshot::channel();
        state.pending().insert(5, PendingAck {
            conn_id: "a".into(),
            event: "login".into(),
            sender: tx,
            created_at: Instant::now(),
        });

        assert!(!state.resolve_ack("b", 5, serde_json::json!(1)));
        assert!(rx.try_recv().is_err());
        assert!(state.resolve_ack("a", 5, serde_json::json!(2)));
        assert_eq!(rx.try_recv().unwrap(), serde_json::json!(2));
        assert_eq!(state.pending_count(), 0);
        assert!(!state.resolve_ack("a", 5, serde_json::json!(3)));
    }

    #[tokio::test]
    async fn disconnect_releases_owed_acks() {
        let state = GatewayState::new(&BridgeConfig::default());
        let (a, _rx) = test_peer("a");
        state.connect_peer(a).await;
        let (tx, rx) = oneshot::channel();
        state.pending().insert(1, PendingAck {
            conn_id: "a".into(),
            event: "leave:add".into(),
            sender: tx,
            created_at: Instant::now(),
        });

        state.disconnect_peer("a").await;
        assert_eq!(state.pending_count(), 0);
        assert!(rx.await.is_err());
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn timeout_override_wins() {
        let mut config = BridgeConfig::default();
        config.timeouts.insert("login".into(), 50);
        let state = GatewayState::new(&config);
        assert_eq!(
            state.timeout_for("login", Duration::from_secs(2)),
            Duration::from_millis(50)
        );
        assert_eq!(
            state.timeout_for("logout", Duration::from_secs(2)),
            Duration::from_secs(2)
        );
    }
}
