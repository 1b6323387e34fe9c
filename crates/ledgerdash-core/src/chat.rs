use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Utc;
use reqwest::Url;
use tracing::{debug, error, info, instrument};

use crate::config::Config;
use crate::datastore::Storage;
use crate::item::{ChatMessage, ChatRole};
use crate::store::ItemStore;

pub const DEFAULT_CHAT_ENDPOINT: &str = "http://127.0.0.1:5000";
pub const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 60;

/// Reply used whenever the remote assistant cannot be reached.
pub const CHAT_FALLBACK_REPLY: &str = "Oops! There was an error processing your request.";

/// Remote assistant. Never fails: transport problems come back as
/// [`CHAT_FALLBACK_REPLY`].
pub trait ChatTransport: Send + Sync {
    fn send_message(&self, text: &str) -> impl Future<Output = String> + Send;
}

/// Asks the assistant over HTTP: `GET <endpoint>?msg=<text>`, reply is the
/// response body.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl ChatClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint.trim())
            .with_context(|| format!("invalid chat endpoint: {endpoint}"))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client for chat")?;
        Ok(Self { http, endpoint })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let endpoint = cfg
            .get("chat.endpoint")
            .unwrap_or_else(|| DEFAULT_CHAT_ENDPOINT.to_string());
        let timeout = cfg
            .get_u64("chat.timeout")?
            .unwrap_or(DEFAULT_CHAT_TIMEOUT_SECS);
        Self::new(&endpoint, Duration::from_secs(timeout))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[instrument(skip(self, text), fields(endpoint = %self.endpoint, chars = text.len()))]
    async fn request(&self, text: &str) -> anyhow::Result<String> {
        let url = Url::parse_with_params(self.endpoint.as_str(), &[("msg", text)])
            .context("failed building chat request URL")?;

        let response = self
            .http
            .get(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .context("failed requesting chat reply")?;

        let status = response.status();
        if !status.is_success() {
            bail!("chat API error: {status}");
        }

        let body = response
            .text()
            .await
            .context("failed reading chat reply body")?;
        debug!(bytes = body.len(), "received chat reply");
        Ok(body)
    }
}

impl ChatTransport for ChatClient {
    async fn send_message(&self, text: &str) -> String {
        match self.request(text).await {
            Ok(reply) => reply,
            Err(err) => {
                error!(error = %format!("{err:#}"), "chat request failed");
                CHAT_FALLBACK_REPLY.to_string()
            }
        }
    }
}

/// Persisted conversation with the assistant.
#[derive(Debug)]
pub struct ChatHistory {
    store: ItemStore<ChatMessage>,
}

impl ChatHistory {
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        Self {
            store: ItemStore::load(storage),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.store.items()
    }

    /// Records `text` and the assistant's reply. Blank input is ignored.
    #[instrument(skip(self, transport, text))]
    pub async fn send<T: ChatTransport>(
        &mut self,
        transport: &T,
        text: &str,
    ) -> Option<&ChatMessage> {
        if text.trim().is_empty() {
            debug!("ignoring blank chat message");
            return None;
        }

        self.store
            .append(ChatMessage::new(ChatRole::User, text.to_string(), Utc::now()));

        let reply = transport.send_message(text).await;
        self.store
            .append(ChatMessage::new(ChatRole::Assistant, reply, Utc::now()));
        info!(messages = self.store.len(), "chat exchange recorded");

        self.store.items().last()
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }
}
