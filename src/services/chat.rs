//! Chat completions over an OpenAI-compatible API

use async_trait::async_trait;

use super::{ChatRequest, ChatService};
use crate::config::ChatConfig;
use crate::session::ChatMessage;
use crate::{Error, Result};

#[derive(serde::Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(serde::Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat collaborator backed by `/chat/completions`
pub struct HttpChatService {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl HttpChatService {
    /// Create a chat client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("API key required for chat".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            url: format!("{}/chat/completions", config.url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn reply(&self, request: &ChatRequest) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: self.max_tokens,
            user: request.voice_profile.as_deref(),
        };

        tracing::debug!(
            messages = request.messages.len(),
            persona = ?request.voice_profile,
            "requesting chat reply"
        );

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat API error");
            return Err(Error::Chat(format!("API failed {status}: {body}")));
        }

        let raw = response.text().await?;
        let reply = parse_reply(&raw)?;

        tracing::info!(reply_len = reply.len(), "chat replied");
        Ok(reply)
    }
}

/// Pull the first non-empty choice out of a completion response body
fn parse_reply(raw: &str) -> Result<String> {
    let result: CompletionResponse = serde_json::from_str(raw)?;
    result
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::Chat("empty reply".to_string()))
}
