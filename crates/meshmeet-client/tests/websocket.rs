//! Signaling channel against a loopback WebSocket server
//!
//! Run with: cargo test -p meshmeet-client --test websocket

use futures_util::{SinkExt, StreamExt};
use meshmeet_client::error::ChannelError;
use meshmeet_client::network::{ChannelEvent, SignalingChannel, WebSocketChannel, preflight};
use meshmeet_protocol::{Envelope, EnvelopeKind};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};

/// Accept one WebSocket client and hand it to `serve`
async fn start_server<F, Fut>(serve: F) -> String
where
    F: FnOnce(WebSocketStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        serve(ws).await;
    });

    format!("ws://{}/ws/meetings/abc", addr)
}

fn close_frame(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    }))
}

#[tokio::test]
async fn test_channel_relays_envelopes_both_ways() {
    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    let url = start_server(move |mut ws| async move {
        ws.send(Message::Text(
            r#"{"type":"user-joined","user":{"id":7,"name":"Kit"}}"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text("not json".into())).await.unwrap();

        if let Some(Ok(Message::Text(text))) = ws.next().await {
            seen_tx.send(text.as_str().to_string()).unwrap();
        }
        ws.send(close_frame(4404, "meeting not found")).await.unwrap();
        while ws.next().await.is_some() {}
    })
    .await;

    let (channel, mut events) = WebSocketChannel::connect(&url).await.unwrap();

    let first = timeout(Duration::from_secs(5), events.recv()).await.unwrap();
    match first {
        Some(ChannelEvent::Message(envelope)) => {
            assert_eq!(envelope.kind, EnvelopeKind::UserJoined);
            assert_eq!(envelope.subject().map(|u| u.id), Some(7));
        }
        other => panic!("expected an envelope, got {:?}", other),
    }

    channel.send(Envelope::chat("hello")).unwrap();
    let sent = timeout(Duration::from_secs(5), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let sent: serde_json::Value = serde_json::from_str(&sent).unwrap();
    assert_eq!(sent["type"], "chat");
    assert_eq!(sent["data"]["text"], "hello");

    // The malformed frame is dropped, the next event is the close
    let closed = timeout(Duration::from_secs(5), events.recv()).await.unwrap();
    assert_eq!(
        closed,
        Some(ChannelEvent::Closed {
            code: 4404,
            reason: "meeting not found".to_string()
        })
    );
    assert_eq!(
        ChannelError::from_close(4404, "meeting not found"),
        Some(ChannelError::MeetingNotFound)
    );
}

#[tokio::test]
async fn test_close_is_sent_once() {
    let (frames_tx, mut frames_rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    let url = start_server(move |mut ws| async move {
        while let Some(Ok(msg)) = ws.next().await {
            let _ = frames_tx.send(msg);
        }
    })
    .await;

    let (channel, _events) = WebSocketChannel::connect(&url).await.unwrap();
    channel.close();
    channel.close();

    assert!(channel.is_closed());
    assert!(matches!(
        channel.send(Envelope::chat("too late")),
        Err(ChannelError::NotOpen)
    ));

    let frame = timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match frame {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Normal);
            assert_eq!(frame.reason.as_str(), "leave");
        }
        other => panic!("expected a close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_preflight_classifies_rejection() {
    let url = start_server(|mut ws| async move {
        ws.send(close_frame(4401, "unauthorized")).await.unwrap();
        while ws.next().await.is_some() {}
    })
    .await;

    assert_eq!(preflight(&url).await, Err(ChannelError::Unauthorized));
}

#[tokio::test]
async fn test_preflight_passes_when_channel_stays_open() {
    let url = start_server(|mut ws| async move { while ws.next().await.is_some() {} }).await;

    assert_eq!(preflight(&url).await, Ok(()));
}
