mod api;
pub mod websocket;

use anyhow::Result;
use async_trait::async_trait;
use meshmeet_protocol::{
    AckResponse, ChatMessageData, CreateMeetingResponse, IceServer, JoinResponse,
    ParticipantData, RelayConfig,
};
use reqwest::Client;

pub use websocket::{
    ChannelEvent, ChannelEvents, SignalingChannel, SignalingConnector, WebSocketChannel,
    WebSocketConnector, preflight, ws_url,
};

/// REST collaborator the session consumes: roster, chat history, relay
/// credentials and host-only meeting end.
#[async_trait]
pub trait MeetingService: Send + Sync {
    async fn join_meeting(&self, code: &str) -> Result<JoinResponse>;

    async fn chat_history(&self, code: &str) -> Result<Vec<ChatMessageData>>;

    async fn relay_servers(&self) -> Result<Vec<IceServer>>;

    async fn end_meeting(&self, code: &str) -> Result<()>;
}

/// HTTP client for the meeting API
#[derive(Clone)]
pub struct MeetingApi {
    http: Client,
    server_url: String,
    token: Option<String>,
}

impl MeetingApi {
    pub fn new(server_url: &str, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    pub async fn create_meeting(&self, title: Option<&str>) -> Result<CreateMeetingResponse> {
        #[derive(serde::Serialize)]
        struct CreateMeeting<'a> {
            title: Option<&'a str>,
        }

        api::post(
            &self.http,
            &self.url("/meeting/create"),
            &CreateMeeting { title },
            self.token.as_deref(),
        )
        .await
    }

    pub async fn list_participants(&self, code: &str) -> Result<Vec<ParticipantData>> {
        api::get(
            &self.http,
            &self.url(&format!("/meeting/{}/participants", urlencoding::encode(code))),
            self.token.as_deref(),
        )
        .await
    }
}

#[derive(serde::Serialize)]
struct MeetingRef<'a> {
    meeting_id: &'a str,
}

#[async_trait]
impl MeetingService for MeetingApi {
    async fn join_meeting(&self, code: &str) -> Result<JoinResponse> {
        api::post(
            &self.http,
            &self.url("/meeting/join"),
            &MeetingRef { meeting_id: code },
            self.token.as_deref(),
        )
        .await
    }

    async fn chat_history(&self, code: &str) -> Result<Vec<ChatMessageData>> {
        let body: serde_json::Value = api::get(
            &self.http,
            &self.url(&format!("/meeting/{}/chat", urlencoding::encode(code))),
            self.token.as_deref(),
        )
        .await?;

        // Servers without history answer with an object instead of a list
        if body.is_array() {
            Ok(serde_json::from_value(body)?)
        } else {
            Ok(Vec::new())
        }
    }

    async fn relay_servers(&self) -> Result<Vec<IceServer>> {
        let config: RelayConfig =
            api::get(&self.http, &self.url("/config/turn"), self.token.as_deref()).await?;
        Ok(config.ice_servers)
    }

    async fn end_meeting(&self, code: &str) -> Result<()> {
        let ack: AckResponse = api::post(
            &self.http,
            &self.url("/meeting/end"),
            &MeetingRef { meeting_id: code },
            self.token.as_deref(),
        )
        .await?;
        tracing::info!("Meeting {} ended: {}", code, ack.message);
        Ok(())
    }
}
