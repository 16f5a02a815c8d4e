//! Peer client: connects to the gateway, authenticates with a client ID and
//! answers the requests it knows how to serve.

pub mod handlers;

use {
    ackbridge_config::PeerConfig,
    ackbridge_protocol::{Frame, ProtocolError, events},
    futures::{SinkExt, StreamExt},
    tokio::net::TcpStream,
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async,
        tungstenite::{self, Message},
    },
    tracing::{debug, info, warn},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Greeting emitted once admitted.
pub const GREETING: &str = "Hello from client";

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("invalid gateway url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("websocket error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("connection rejected: {reason}")]
    Rejected { reason: String },
    #[error("gateway closed the connection during handshake")]
    ClosedDuringHandshake,
    #[error("unexpected handshake reply")]
    UnexpectedReply,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// An admitted connection to the gateway.
pub struct PeerSession {
    sid: String,
    ws: WsStream,
}

/// Connect to `url` and complete the handshake with `client_id`.
pub async fn connect(url: &str, client_id: &str) -> Result<PeerSession, PeerError> {
    let url = url::Url::parse(url)?;
    let (mut ws, _response) = connect_async(url.as_str()).await?;
    ws.send(Message::text(Frame::connect(client_id).to_json()?)).await?;

    while let Some(msg) = ws.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        return match Frame::from_json(text.as_str())? {
            Frame::Connected { sid } => Ok(PeerSession { sid, ws }),
            Frame::ConnectError { data, .. } => Err(PeerError::Rejected {
                reason: data.reason,
            }),
            _ => Err(PeerError::UnexpectedReply),
        };
    }
    Err(PeerError::ClosedDuringHandshake)
}

/// Connect with `config` and serve requests until the gateway goes away.
pub async fn run_peer(config: &PeerConfig) -> Result<(), PeerError> {
    info!(url = %config.url, "connecting to the gateway");
    let session = connect(&config.url, &config.client_id).await?;
    session.run().await
}

impl PeerSession {
    /// Fire-and-forget event to the gateway.
    pub async fn emit(&mut self, event: &str, data: serde_json::Value) -> Result<(), PeerError> {
        let frame = Frame::event(event, data).to_json()?;
        self.ws.send(Message::text(frame)).await?;
        Ok(())
    }

    /// Greet the gateway, then answer inbound frames until the socket closes.
    pub async fn run(mut self) -> Result<(), PeerError> {
        info!(sid = %self.sid, "connected to the gateway");
        self.emit(events::MESSAGE, serde_json::json!(GREETING)).await?;

        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => self.handle_text(text.as_str()).await?,
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "close frame");
                    break;
                },
                Ok(_) => {},
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    break;
                },
                Err(e) => return Err(e.into()),
            }
        }

        info!("disconnected from the gateway");
        Ok(())
    }

    async fn handle_text(&mut self, text: &str) -> Result<(), PeerError> {
        let frame = match Frame::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "ignoring frame");
                return Ok(());
            },
        };

        let (event, data, ack) = match frame {
            Frame::Event { event, data, ack } => (event, data, ack),
            other => {
                debug!(frame = ?other, "non-event frame");
                return Ok(());
            },
        };

        match event.as_str() {
            events::SERVER_TIME => info!(server_time = %data, "server time"),
            events::CLIENTS_ONLINE => info!(count = %data, "clients online"),
            _ => match (ack, handlers::respond(&event, &data)) {
                (Some(id), Some(reply)) => {
                    info!(event, received = %data, "acknowledging request");
                    let frame = Frame::ack(id, reply).to_json()?;
                    self.ws.send(Message::text(frame)).await?;
                },
                (Some(id), None) => warn!(event, ack = id, "no handler, request left unanswered"),
                (None, _) => debug!(event, "event"),
            },
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_malformed_url() {
        let err = connect("not a url", "id").await.err().unwrap();
        assert!(matches!(err, PeerError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_transport_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = connect(&format!("ws://127.0.0.1:{port}/ws"), "id")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PeerError::Transport(_)));
    }
}
