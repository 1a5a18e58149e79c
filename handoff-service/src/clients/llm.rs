use anyhow::anyhow;
use async_trait::async_trait;
use handoff_flow::Message;
use serde_json::{Value, json};
use tracing::{debug, error};

use super::{ensure_success, join_url};

/// A hosted chat-completion model
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `messages`, preceded by an optional system instruction, and return the reply text
    async fn complete(&self, system: Option<&str>, messages: &[Message]) -> anyhow::Result<String>;

    /// Single-shot prompt with a system instruction
    async fn prompt(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        self.complete(Some(system), &[Message::user(prompt)]).await
    }
}

/// OpenAI-compatible `/chat/completions` client, pointed at Upstage Solar by default
pub struct UpstageChatModel {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl UpstageChatModel {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

pub(crate) fn completion_payload(model: &str, system: Option<&str>, messages: &[Message]) -> Value {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        wire.push(json!({ "role": "system", "content": system }));
    }
    wire.extend(
        messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content })),
    );

    json!({
        "model": model,
        "messages": wire,
        "stream": false
    })
}

#[async_trait]
impl ChatModel for UpstageChatModel {
    async fn complete(&self, system: Option<&str>, messages: &[Message]) -> anyhow::Result<String> {
        let payload = completion_payload(&self.model, system, messages);
        debug!(model = %self.model, messages = messages.len(), "requesting chat completion");

        let response = self
            .http
            .post(join_url(&self.api_base, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "chat completion request failed");
                anyhow!("chat completion request failed: {e}")
            })?;

        let response_json: Value = ensure_success("chat completion", response).await?.json().await?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid response format from LLM"))?;

        Ok(content.to_string())
    }
}
