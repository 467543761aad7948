use std::time::Duration;

use futures::TryStreamExt as _;
use tracing::debug;

use crate::chunk::ChatId;
use crate::conversation::Message;
use crate::errors::{ClientError, TransportError};
use crate::session::ChatSession;
use crate::transport::{ByteStream, ChatRequest, ChatTransport};

/// Configuration for the policy-chat backend client.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Base URL of the backend, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Bearer token attached to every request when present.
    pub auth_token: Option<String>,
    /// Deadline for non-streaming requests.
    pub timeout: Duration,
}

impl BackendConfig {
    /// Creates a config with sensible defaults and a provided base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Builds a config from `POLICYCHAT_BASE_URL` and, when set,
    /// `POLICYCHAT_AUTH_TOKEN`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_vars(
            std::env::var("POLICYCHAT_BASE_URL").ok(),
            std::env::var("POLICYCHAT_AUTH_TOKEN").ok(),
        )
    }

    fn from_vars(
        base_url: Option<String>,
        auth_token: Option<String>,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.unwrap_or_default();
        if base_url.trim().is_empty() {
            return Err(ClientError::Config(
                "missing POLICYCHAT_BASE_URL for the backend client".into(),
            ));
        }
        let mut config = Self::new(base_url);
        if let Some(token) = auth_token
            && !token.trim().is_empty()
        {
            config.auth_token = Some(token);
        }
        Ok(config)
    }

    /// Sets the bearer token.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Overrides the non-streaming request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// HTTP client for the policy-chat backend: the streaming transport plus
/// the session catalog endpoints.
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    /// Creates a backend client from explicit configuration.
    pub fn new(config: BackendConfig) -> Result<Self, ClientError> {
        if config.base_url.trim().is_empty() {
            return Err(ClientError::Config(
                "backend config base_url must not be empty".into(),
            ));
        }
        // No client-wide timeout: it would bound the entire streaming body.
        // Deadlines are attached per request instead.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build backend client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a backend client using `POLICYCHAT_BASE_URL`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(BackendConfig::from_env()?)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.auth_token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Lists every conversation the backend knows about.
    pub async fn fetch_sessions(&self) -> Result<Vec<ChatSession>, TransportError> {
        debug!("fetching chat sessions");
        let response = self
            .authorized(self.client.get(self.config.url("/api/chats")))
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| TransportError::request(format!("session list request failed: {e}")))?;
        let response = expect_success(response, "session list").await?;
        response
            .json::<Vec<ChatSession>>()
            .await
            .map_err(|e| TransportError::read(format!("invalid session list response: {e}")))
    }

    /// Fetches the full message history of one conversation.
    pub async fn fetch_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, TransportError> {
        debug!(%chat_id, "fetching chat history");
        let response = self
            .authorized(
                self.client
                    .get(self.config.url(&format!("/api/chats/{chat_id}/messages"))),
            )
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| TransportError::request(format!("history request failed: {e}")))?;
        let response = expect_success(response, "history").await?;
        response
            .json::<Vec<Message>>()
            .await
            .map_err(|e| TransportError::read(format!("invalid history response: {e}")))
    }

    /// Renames one conversation.
    pub async fn rename_session(
        &self,
        chat_id: ChatId,
        title: impl Into<String>,
    ) -> Result<(), TransportError> {
        let title = title.into();
        debug!(%chat_id, %title, "renaming chat session");
        let response = self
            .authorized(
                self.client
                    .patch(self.config.url(&format!("/api/chats/{chat_id}"))),
            )
            .timeout(self.config.timeout)
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await
            .map_err(|e| TransportError::request(format!("rename request failed: {e}")))?;
        expect_success(response, "rename").await?;
        Ok(())
    }

    /// Archives or unarchives one conversation.
    pub async fn set_archived(
        &self,
        chat_id: ChatId,
        archived: bool,
    ) -> Result<(), TransportError> {
        debug!(%chat_id, archived, "updating chat archive flag");
        let response = self
            .authorized(
                self.client
                    .patch(self.config.url(&format!("/api/chats/{chat_id}"))),
            )
            .timeout(self.config.timeout)
            .json(&serde_json::json!({ "is_archived": archived }))
            .send()
            .await
            .map_err(|e| TransportError::request(format!("archive request failed: {e}")))?;
        expect_success(response, "archive").await?;
        Ok(())
    }

    /// Archives every conversation in one call.
    pub async fn archive_all(&self) -> Result<(), TransportError> {
        debug!("archiving all chat sessions");
        let response = self
            .authorized(self.client.post(self.config.url("/api/chats/archive-all")))
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| TransportError::request(format!("archive-all request failed: {e}")))?;
        expect_success(response, "archive-all").await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpBackend {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        debug!(chat_id = ?request.chat_id, "opening chat stream");

        let mut http_req = self
            .authorized(self.client.post(self.config.url("/api/chat/stream")))
            .json(&stream_body(request));
        if let Some(timeout) = request.options.timeout {
            http_req = http_req.timeout(timeout);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| TransportError::request(format!("chat stream request failed: {e}")))?;
        let response = expect_success(response, "chat stream").await?;

        Ok(Box::pin(response.bytes_stream().map_err(|e| {
            TransportError::read(format!("chat stream read failed: {e}"))
        })))
    }
}

async fn expect_success(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(TransportError::status(
        status.as_u16(),
        format!("{what} request failed with status {status}: {body}"),
    ))
}

pub(crate) fn stream_body(request: &ChatRequest) -> serde_json::Value {
    let mut body = serde_json::json!({ "message": request.message });
    if let Some(chat_id) = request.chat_id {
        body["chat_id"] = serde_json::json!(chat_id);
    }
    body
}
