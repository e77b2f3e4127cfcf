use std::time::Duration;

use async_trait::async_trait;
use picker_core::{LlmConfig, LlmFailure, PickerError};
use serde::{Deserialize, Serialize};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PING_TIMEOUT: Duration = Duration::from_secs(10);
const TEMPERATURE: f64 = 0.1;
const MAX_TOKENS: u32 = 300;

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use picker_engine::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage {
///     role: Role::User,
///     content: "Pick a release".into(),
/// };
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use picker_engine::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
}

/// A parsed model answer: a 1-based candidate index and its justification.
///
/// `choice` is not range-checked here; only the decision engine knows how
/// many candidates there were.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmChoice {
    pub choice: i64,
    pub reason: String,
}

/// One chat-completion round-trip returning a release choice.
///
/// Implementations send exactly one request per [`complete`] call and
/// never retry on their own.
///
/// [`complete`]: ChatCompleter::complete
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Model identifier, for logs and `/test`.
    fn model(&self) -> &str;

    /// Ask for a choice, giving up after `timeout`.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<LlmChoice, LlmFailure>;

    /// Check that the endpoint is reachable.
    async fn ping(&self) -> Result<(), LlmFailure>;
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes `{api_url}/chat/completions`:
/// OpenAI, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use picker_core::LlmConfig;
/// use picker_engine::llm::{ChatCompleter, LlmClient};
/// use std::time::Duration;
///
/// let config = LlmConfig {
///     api_url: "http://localhost:11434/v1".into(),
///     model: "llama3.1".into(),
///     api_key: None,
///     timeout: Duration::from_secs(90),
///     retry: false,
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "llama3.1");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("api_url", &self.config.api_url)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// The underlying HTTP client only carries a connect timeout; the
    /// per-call deadline is enforced by [`ChatCompleter::complete`].
    ///
    /// # Errors
    ///
    /// Returns [`PickerError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, PickerError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| PickerError::Config(format!("failed to create LLM HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(api_key) => request.header("Authorization", format!("Bearer {api_key}")),
            None => request,
        }
    }

    async fn request_choice(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<LlmChoice, LlmFailure> {
        let url = format!("{}/chat/completions", self.config.api_url);
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: system_prompt.to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: user_prompt.to_string(),
            },
        ];
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        });

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmFailure::Transport(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmFailure::Transport(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmFailure::InvalidResponse(format!("response body is not JSON: {e}")))?;

        let content = envelope
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                LlmFailure::InvalidResponse(format!("unexpected response structure: {envelope}"))
            })?;

        parse_choice(content)
    }
}

#[async_trait]
impl ChatCompleter for LlmClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<LlmChoice, LlmFailure> {
        match tokio::time::timeout(timeout, self.request_choice(system_prompt, user_prompt)).await
        {
            Ok(result) => result,
            Err(_) => Err(LlmFailure::Timeout(timeout)),
        }
    }

    async fn ping(&self) -> Result<(), LlmFailure> {
        let url = format!("{}/models", self.config.api_url);
        self.authorize(self.client.get(&url))
            .timeout(PING_TIMEOUT)
            .send()
            .await
            .map_err(|e| LlmFailure::Transport(format!("request failed: {e}")))?;
        Ok(())
    }
}

/// Parse the assistant message into an [`LlmChoice`].
///
/// The content must be a bare JSON object with an integer `choice`.
/// Markdown fences, prose, arrays, floats, and strings are all rejected as
/// [`LlmFailure::InvalidResponse`]. A missing `reason` is tolerated.
///
/// # Examples
///
/// ```
/// use picker_engine::llm::parse_choice;
///
/// let parsed = parse_choice(r#"{"choice": 2, "reason": "smaller"}"#).unwrap();
/// assert_eq!(parsed.choice, 2);
/// assert!(parse_choice("```json\n{\"choice\": 2}\n```").is_err());
/// ```
pub fn parse_choice(content: &str) -> Result<LlmChoice, LlmFailure> {
    let value: serde_json::Value = serde_json::from_str(content.trim())
        .map_err(|e| LlmFailure::InvalidResponse(format!("content is not a JSON object: {e}")))?;

    let Some(object) = value.as_object() else {
        return Err(LlmFailure::InvalidResponse(format!(
            "expected a JSON object, got {value}"
        )));
    };

    let choice = object
        .get("choice")
        .ok_or_else(|| LlmFailure::InvalidResponse("missing 'choice' field".into()))?;
    let choice = choice.as_i64().ok_or_else(|| {
        LlmFailure::InvalidResponse(format!("'choice' must be an integer, got {choice}"))
    })?;

    let reason = object
        .get("reason")
        .and_then(|r| r.as_str())
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("No reason provided")
        .to_string();

    Ok(LlmChoice { choice, reason })
}
