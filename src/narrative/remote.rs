// =============================================================================
// Remote Completion Client
// =============================================================================
//
// Minimal client for an OpenAI-compatible chat-completions endpoint. One
// prompt in, one completion out; no streaming, no conversation state. The
// annotator treats every error here as a signal to fall back to local
// commentary, so errors stay inspectable rather than stringly.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";

const REQUEST_TIMEOUT_SECS: u64 = 10;
const MAX_COMPLETION_TOKENS: u32 = 600;
const BODY_SNIPPET_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("completion response contained no text")]
    EmptyCompletion,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("failed to build reqwest client");

        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Send one prompt and return the completion text, trimmed.
    pub async fn complete(&self, prompt: &str) -> Result<String, NarrativeError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: MAX_COMPLETION_TOKENS,
            temperature: 0.4,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NarrativeError::Status {
                status,
                body: body.chars().take(BODY_SNIPPET_LEN).collect(),
            });
        }

        let body: ChatResponse = resp.json().await?;
        let text = extract_completion(body).ok_or(NarrativeError::EmptyCompletion)?;
        debug!(model = %self.model, chars = text.len(), "completion received");
        Ok(text)
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

fn extract_completion(response: ChatResponse) -> Option<String> {
    let text = response.choices.into_iter().next()?.message.content?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ChatResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn extracts_first_choice_text() {
        let response = parse(
            r#"{ "choices": [ { "message": { "role": "assistant", "content": "  Premium is stretched.  " } } ] }"#,
        );
        assert_eq!(
            extract_completion(response).as_deref(),
            Some("Premium is stretched.")
        );
    }

    #[test]
    fn empty_choices_yield_none() {
        let response = parse(r#"{ "choices": [] }"#);
        assert!(extract_completion(response).is_none());
    }

    #[test]
    fn null_or_blank_content_yields_none() {
        let response = parse(r#"{ "choices": [ { "message": { "content": null } } ] }"#);
        assert!(extract_completion(response).is_none());

        let response = parse(r#"{ "choices": [ { "message": { "content": "   " } } ] }"#);
        assert!(extract_completion(response).is_none());
    }

    #[test]
    fn debug_redacts_the_api_key() {
        let client = ChatClient::new("https://example.test/v1", "sk-secret", "test-model");
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
