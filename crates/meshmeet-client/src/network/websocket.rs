use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use meshmeet_protocol::Envelope;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::error::ChannelError;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(15);
const PREFLIGHT_HOLD: Duration = Duration::from_secs(1);

/// What the reader task reports to the session
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(Envelope),
    Closed { code: u16, reason: String },
}

pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// Outbound half of an open signaling channel
pub trait SignalingChannel: Send + Sync {
    fn send(&self, envelope: Envelope) -> Result<(), ChannelError>;

    /// Close the channel. Only the first call reaches the socket.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens signaling channels for a meeting code
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    /// Probe the endpoint without joining: open, hold briefly, close
    async fn preflight(&self, code: &str) -> Result<(), ChannelError>;

    async fn connect(
        &self,
        code: &str,
    ) -> Result<(Box<dyn SignalingChannel>, ChannelEvents), ChannelError>;
}

/// Build the signaling URL: `ws(s)://host/ws/meetings/{code}?token=...`
pub fn ws_url(base: &str, code: &str, token: Option<&str>) -> Result<String, ChannelError> {
    let base = base.trim_end_matches('/');
    let host = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(ChannelError::InvalidUrl(base.to_string()));
    };

    let mut url = format!("{}/ws/meetings/{}", host, urlencoding::encode(code));
    if let Some(token) = token {
        url.push_str("?token=");
        url.push_str(&urlencoding::encode(token));
    }
    Ok(url)
}

pub struct WebSocketChannel {
    sender: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
}

impl WebSocketChannel {
    pub async fn connect(url: &str) -> Result<(Self, ChannelEvents), ChannelError> {
        let (ws_stream, _) = connect_async(url).await?;
        tracing::info!("Signaling channel open");

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // Writer: the only owner of the sink. Stops after forwarding a close.
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    tracing::error!("Failed to send WebSocket message: {}", e);
                    break;
                }
                if is_close {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Envelope>(&text) {
                        Ok(envelope) => {
                            if events_tx.send(ChannelEvent::Message(envelope)).is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::debug!("Dropping malformed envelope: {}", e),
                    },
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                            .unwrap_or((1005, String::new()));
                        tracing::info!("Signaling channel closed by server: {} {}", code, reason);
                        let _ = events_tx.send(ChannelEvent::Closed { code, reason });
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                        let _ = events_tx.send(ChannelEvent::Closed {
                            code: 1006,
                            reason: e.to_string(),
                        });
                        return;
                    }
                }
            }

            let _ = events_tx.send(ChannelEvent::Closed {
                code: 1006,
                reason: "Stream ended".to_string(),
            });
        });

        let tx_ping = tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PING_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx_ping.send(Message::Ping(Vec::new().into())).is_err() {
                    break;
                }
            }
        });

        Ok((
            Self {
                sender: tx,
                closed: AtomicBool::new(false),
            },
            events_rx,
        ))
    }
}

impl SignalingChannel for WebSocketChannel {
    fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::NotOpen);
        }
        let json =
            serde_json::to_string(&envelope).map_err(|e| ChannelError::Encode(e.to_string()))?;
        self.sender
            .send(Message::Text(json.into()))
            .map_err(|_| ChannelError::NotOpen)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Closing signaling channel");
        let _ = self.sender.send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "leave".into(),
        })));
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Connects to `<server>/ws/meetings/{code}` with the configured token
pub struct WebSocketConnector {
    server_url: String,
    token: Option<String>,
}

impl WebSocketConnector {
    pub fn new(server_url: &str, token: Option<String>) -> Self {
        Self {
            server_url: server_url.to_string(),
            token,
        }
    }

    fn url(&self, code: &str) -> Result<String, ChannelError> {
        ws_url(&self.server_url, code, self.token.as_deref())
    }
}

#[async_trait]
impl SignalingConnector for WebSocketConnector {
    async fn preflight(&self, code: &str) -> Result<(), ChannelError> {
        preflight(&self.url(code)?).await
    }

    async fn connect(
        &self,
        code: &str,
    ) -> Result<(Box<dyn SignalingChannel>, ChannelEvents), ChannelError> {
        let (channel, events) = WebSocketChannel::connect(&self.url(code)?).await?;
        Ok((Box::new(channel), events))
    }
}

/// Open a probe connection, keep it for a moment and classify how it ends.
/// A rejection by the server arrives as a close frame right after the upgrade.
pub async fn preflight(url: &str) -> Result<(), ChannelError> {
    let (mut ws_stream, _) = tokio::time::timeout(PREFLIGHT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| ChannelError::Timeout)??;

    let hold = tokio::time::sleep(PREFLIGHT_HOLD);
    tokio::pin!(hold);

    loop {
        tokio::select! {
            _ = &mut hold => break,
            msg = ws_stream.next() => match msg {
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
                        .unwrap_or((1005, String::new()));
                    tracing::debug!("Preflight closed with {} {}", code, reason);
                    return match ChannelError::from_close(code, &reason) {
                        Some(e) => Err(e),
                        None => Ok(()),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return Err(ChannelError::Abnormal),
            },
        }
    }

    let _ = ws_stream.close(None).await;
    tracing::debug!("Preflight succeeded");
    Ok(())
}
