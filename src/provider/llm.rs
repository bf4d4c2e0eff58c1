use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::OpenAiSettings;
use crate::error::ProviderError;

use super::ProvidedFields;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that extracts metadata from documents.";

/// Characters of document text sent to the model.
const MAX_PROMPT_TEXT_CHARS: usize = 12_000;

/// A chat model that answers one prompt.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiClient {
    settings: OpenAiSettings,
    client: reqwest::Client,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            settings,
            client,
            timeout,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.1,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.settings.base_url))
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedInput(format!("chat completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ProviderError::NoText)
    }
}

/// Asks a chat model for Title/Date/Volume/Issue/Description as JSON.
pub struct LlmFieldExtractor {
    client: Box<dyn LlmClient>,
}

impl LlmFieldExtractor {
    pub fn new(client: Box<dyn LlmClient>) -> Self {
        Self { client }
    }

    pub async fn extract_fields(&self, text: &str) -> Result<ProvidedFields, ProviderError> {
        let reply = self.client.complete(SYSTEM_PROMPT, &build_prompt(text)).await?;
        parse_fields(&reply)
    }
}

fn build_prompt(text: &str) -> String {
    let text: String = text.chars().take(MAX_PROMPT_TEXT_CHARS).collect();
    format!(
        "Extract the following metadata from the text below.\n\
         Return the result as a JSON object with these exact keys: \"Title\", \"Date\", \"Volume\", \"Issue\", \"Description\".\n\
         If a field cannot be determined, use an empty string.\n\n\
         Text:\n{}\n\nJSON Response:",
        text
    )
}

/// Parse the model reply, tolerating a surrounding Markdown code fence and
/// numeric values.
pub fn parse_fields(reply: &str) -> Result<ProvidedFields, ProviderError> {
    let json = strip_code_fence(reply);
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ProviderError::MalformedInput(format!("LLM reply is not JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| ProviderError::MalformedInput("LLM reply is not a JSON object".into()))?;

    let field = |key: &str| -> Option<String> {
        match object.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    Ok(ProvidedFields {
        title: field("Title"),
        date: field("Date"),
        volume: field("Volume"),
        issue: field("Issue"),
        description: field("Description"),
    }
    .normalized())
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (e.g. "json") on the opening fence line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.rsplit_once("```").map_or(body, |(inner, _)| inner).trim()
}

/// Returns a canned reply.
#[cfg(test)]
pub struct MockLlmClient {
    pub reply: Result<String, fn() -> ProviderError>,
}

#[cfg(test)]
#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ProviderError> {
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(make) => Err(make()),
        }
    }
}
