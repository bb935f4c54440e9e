//! WebSocket channel to the conversational agent service.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, VoiceError};
use crate::protocol::{close_cause, InboundEvent, OutboundMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the channel produced when polled.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A parsed inbound message.
    Inbound(InboundEvent),
    /// The channel closed. `None` means a clean closure; otherwise the
    /// typed cause from the close-code table.
    Closed(Option<VoiceError>),
}

/// An open bidirectional message channel to the remote agent.
pub struct Channel {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

impl Channel {
    /// Connect to the agent endpoint.
    ///
    /// The remote side will not accept audio until [`handshake`](Self::handshake)
    /// has been sent and answered with init metadata.
    pub async fn open(config: &SessionConfig) -> Result<Self> {
        let request = config
            .endpoint_url()
            .into_client_request()
            .map_err(|err| VoiceError::Network(format!("invalid endpoint: {err}")))?;

        let (ws, _) = connect_async(request).await.map_err(connect_error)?;
        info!(agent_id = %config.agent_id, "connected to agent endpoint");

        let (sink, stream) = ws.split();
        Ok(Self { sink, stream })
    }

    /// Send the initiation message carrying credentials.
    pub async fn handshake(&mut self, config: &SessionConfig) -> Result<()> {
        self.send(&OutboundMessage::initiation(config.api_key.clone()))
            .await
    }

    /// Serialize and send one outbound message.
    pub async fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        let serialized = serde_json::to_string(message)?;
        self.sink
            .send(Message::Text(serialized.into()))
            .await
            .map_err(|err| VoiceError::Network(err.to_string()))
    }

    /// Wait for the next inbound event, in arrival order.
    ///
    /// Frames that fail to parse are logged and dropped; they never end the
    /// session. A close frame (or an abrupt disconnect) yields `Closed`.
    pub async fn next(&mut self) -> ChannelEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<InboundEvent>(&text) {
                        Ok(event) => return ChannelEvent::Inbound(event),
                        Err(err) => {
                            warn!(error = %err, "dropping unparseable inbound frame");
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let cause = match frame {
                        Some(CloseFrame { code, reason }) => {
                            close_cause(u16::from(code), &reason)
                        }
                        None => None,
                    };
                    return ChannelEvent::Closed(cause);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Transport-level keep-alive; the JSON ping/pong pair is
                    // handled by the session.
                    debug!("websocket-level heartbeat frame");
                }
                Some(Ok(other)) => {
                    warn!(frame = ?other, "dropping unexpected inbound frame");
                }
                Some(Err(err)) => return ChannelEvent::Closed(Some(transport_error(err))),
                None => {
                    return ChannelEvent::Closed(Some(VoiceError::Network(
                        "connection lost unexpectedly".into(),
                    )));
                }
            }
        }
    }

    /// Close the channel cleanly. Tolerant of an already-closed socket.
    pub async fn close(mut self) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "conversation ended".into(),
        };
        match self.sink.send(Message::Close(Some(frame))).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(VoiceError::Network(err.to_string())),
        }
    }
}

fn connect_error(err: tungstenite::Error) -> VoiceError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            match status.as_u16() {
                401 | 403 => {
                    VoiceError::AuthInvalid(format!("handshake rejected with status {status}"))
                }
                404 => VoiceError::AgentNotFound(format!(
                    "agent endpoint not found (status {status})"
                )),
                _ => VoiceError::Network(format!("handshake failed with status {status}")),
            }
        }
        other => VoiceError::Network(other.to_string()),
    }
}

fn transport_error(err: tungstenite::Error) -> VoiceError {
    match err {
        tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        ) => VoiceError::Network("connection lost unexpectedly".into()),
        other => VoiceError::Network(other.to_string()),
    }
}
