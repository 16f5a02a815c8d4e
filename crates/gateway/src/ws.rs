//! Per-connection WebSocket handling: handshake, read loop, write loop.

use std::{fmt, net::SocketAddr, sync::Arc, time::Instant};

use {
    ackbridge_protocol::{Frame, events, reasons},
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, StreamExt, stream::SplitStream},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    auth::authorize_connect,
    state::{ConnectedPeer, GatewayState, millis},
};

/// Lifecycle of one socket as seen by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Authenticating,
    Connected,
    Rejected(&'static str),
    Disconnected,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Connected => f.write_str("connected"),
            Self::Rejected(reason) => write!(f, "rejected({reason})"),
            Self::Disconnected => f.write_str("disconnected"),
        }
    }
}

fn enter(conn_id: &str, phase: Phase) {
    debug!(conn_id, %phase, "ws: phase");
}

/// Outcome of waiting for the first frame.
enum Handshake {
    ClientId(Option<String>),
    Reject(&'static str),
    Closed,
}

async fn read_handshake(rx: &mut SplitStream<WebSocket>) -> Handshake {
    while let Some(msg) = rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                return match Frame::from_json(text.as_str()) {
                    Ok(Frame::Connect { auth }) => Handshake::ClientId(auth.client_id),
                    Ok(_) | Err(_) => Handshake::Reject(reasons::EXPECTED_CONNECT),
                };
            },
            Ok(Message::Close(_)) | Err(_) => return Handshake::Closed,
            // Ping/pong are answered by axum.
            Ok(_) => {},
        }
    }
    Handshake::Closed
}

/// Drive one WebSocket from upgrade to close.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, remote_addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    enter(&conn_id, Phase::Connecting);
    let (mut ws_tx, mut ws_rx) = socket.split();

    enter(&conn_id, Phase::Authenticating);
    let handshake =
        match tokio::time::timeout(state.realtime.handshake_timeout(), read_handshake(&mut ws_rx))
            .await
        {
            Ok(h) => h,
            Err(_) => Handshake::Reject(reasons::HANDSHAKE_TIMEOUT),
        };

    let client_id = match handshake {
        Handshake::ClientId(id) => {
            let auth = authorize_connect(&state.allow_list, id.as_deref());
            if !auth.ok {
                info!(
                    conn_id,
                    %remote_addr,
                    detail = auth.detail.unwrap_or_default(),
                    "connection denied"
                );
                let reason = auth.reason.unwrap_or(reasons::INVALID_CLIENT_ID);
                reject(&mut ws_tx, &conn_id, reason).await;
                return;
            }
            id.unwrap_or_default()
        },
        Handshake::Reject(reason) => {
            warn!(conn_id, %remote_addr, reason, "handshake failed");
            reject(&mut ws_tx, &conn_id, reason).await;
            return;
        },
        Handshake::Closed => {
            debug!(conn_id, "closed during handshake");
            enter(&conn_id, Phase::Disconnected);
            return;
        },
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    match (Frame::Connected {
        sid: conn_id.clone(),
    })
    .to_json()
    {
        Ok(frame) => {
            let _ = tx.send(frame);
        },
        Err(e) => warn!(conn_id, error = %e, "failed to encode connected frame"),
    }

    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "ws: write failed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let peers = state
        .connect_peer(ConnectedPeer {
            conn_id: conn_id.clone(),
            client_id: client_id.clone(),
            remote_addr: Some(remote_addr),
            sender: tx,
            connected_at: Instant::now(),
        })
        .await;
    enter(&conn_id, Phase::Connected);
    info!(conn_id, client_id, %remote_addr, peers, "peer connected");

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_frame(&state, &conn_id, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {},
            Err(e) => {
                debug!(conn_id, error = %e, "ws: read error");
                break;
            },
        }
    }

    // Removing the peer drops its sender, which ends the write loop.
    let removed = state.disconnect_peer(&conn_id).await.map(|peer| {
        (
            peer.client_id,
            peer.remote_addr,
            millis(peer.connected_at.elapsed()),
        )
    });
    let _ = write_handle.await;
    enter(&conn_id, Phase::Disconnected);
    let peers = state.peer_count().await;
    if let Some((client_id, remote_addr, connected_ms)) = removed {
        info!(
            conn_id,
            client_id,
            remote_addr = ?remote_addr,
            connected_ms,
            peers,
            "peer disconnected"
        );
    }
}

async fn reject(
    ws_tx: &mut futures::stream::SplitSink<WebSocket, Message>,
    conn_id: &str,
    reason: &'static str,
) {
    enter(conn_id, Phase::Rejected(reason));
    if let Ok(frame) = Frame::connect_error(reason).to_json() {
        let _ = ws_tx.send(Message::Text(frame.into())).await;
    }
    let _ = ws_tx.close().await;
}

/// Dispatch one inbound frame from an admitted peer.
pub(crate) async fn handle_frame(state: &GatewayState, conn_id: &str, text: &str) {
    let frame = match Frame::from_json(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(conn_id, error = %e, "ignoring frame");
            return;
        },
    };

    match frame {
        Frame::Ack { id, data } => {
            state.resolve_ack(conn_id, id, data);
        },
        Frame::Event { event, data, ack } => {
            if event == events::MESSAGE {
                info!(conn_id, message = %data, "message received");
            } else {
                debug!(conn_id, event, "unhandled event");
            }
            // Peers waiting on us get an empty ack rather than hanging.
            if let Some(id) = ack
                && let Ok(reply) = Frame::ack(id, serde_json::Value::Null).to_json()
            {
                state.send_to(conn_id, &reply).await;
            }
        },
        Frame::Connect { .. } => debug!(conn_id, "duplicate connect ignored"),
        Frame::Connected { .. } | Frame::ConnectError { .. } => {
            warn!(conn_id, "peer sent a gateway-only frame");
        },
    }
}
