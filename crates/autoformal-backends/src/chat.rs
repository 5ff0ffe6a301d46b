//! Generation client for OpenAI-compatible chat-completions endpoints.
//!
//! The prompt instructions become the system message. The named inputs
//! and the list of requested output fields become the user message, and
//! the model is asked to answer with one JSON object keyed by field name.
//! Transient failures are retried with exponential backoff up to the
//! model's `max_retries`.

use std::time::Duration;

use async_trait::async_trait;
use autoformal_core::lean::clean_output;
use autoformal_core::{
    GenerationClient, GenerationOutput, ModelConfig, OutputField, PromptSpec, ServiceError,
    ServiceKind,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{BackendError, Result};

/// Error bodies are cut to this many bytes before they reach logs and results.
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatGenerationClient {
    http: reqwest::Client,
}

impl ChatGenerationClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("autoformal/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    #[instrument(skip_all, fields(item_id = %prompt.item_id, kind = %prompt.kind, model = %model.model))]
    async fn request(&self, model: &ModelConfig, prompt: &PromptSpec) -> Result<GenerationOutput> {
        let key_var = model.resolved_api_key_env();
        let api_key = std::env::var(&key_var).map_err(|_| BackendError::MissingApiKey(key_var))?;
        let url = format!("{}/chat/completions", model.resolved_base_url());

        let user = render_user_message(prompt);
        let body = ChatRequest {
            model: &model.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.instructions,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: model.temperature,
            max_tokens: model.max_tokens,
        };

        let mut request = self.http.post(&url).bearer_auth(api_key).json(&body);
        if model.timeout_secs > 0 {
            request = request.timeout(Duration::from_secs(model.timeout_secs));
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: truncate(&text, ERROR_BODY_LIMIT),
            });
        }

        let reply: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::MalformedReply(format!("response body: {e}")))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::MalformedReply("reply has no content".to_string()))?;
        debug!(chars = content.len(), "chat reply received");

        parse_reply(&content, &prompt.outputs)
    }
}

#[async_trait]
impl GenerationClient for ChatGenerationClient {
    async fn generate(
        &self,
        model: &ModelConfig,
        prompt: &PromptSpec,
    ) -> std::result::Result<GenerationOutput, ServiceError> {
        let max_attempts = model.max_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.request(model, prompt).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = backoff_delay(model.backoff_base_ms, attempt);
                    warn!(
                        item_id = %prompt.item_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient generation failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into_service_error(ServiceKind::Generation)),
            }
        }
    }
}

/// Delay before retry number `attempt` (1-based): `base_ms * 2^(attempt - 1)`.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Inputs as markdown sections, followed by the JSON answer contract.
pub fn render_user_message(prompt: &PromptSpec) -> String {
    let mut out = String::new();
    for (name, value) in &prompt.inputs {
        out.push_str(&format!("## {name}\n{value}\n\n"));
    }
    out.push_str("Respond with a single JSON object containing these string fields:\n");
    for field in &prompt.outputs {
        out.push_str(&format!("- `{}`: {}\n", field.name, field.description));
    }
    out
}

/// Read the requested fields out of a model reply.
///
/// Code fences around the object are tolerated, and so is prose before or
/// after it. Missing fields come back empty; non-string values are kept in
/// their JSON form.
pub fn parse_reply(content: &str, outputs: &[OutputField]) -> Result<GenerationOutput> {
    let cleaned = clean_output(content);
    let value = serde_json::from_str::<Value>(&cleaned)
        .ok()
        .or_else(|| embedded_object(&cleaned))
        .ok_or_else(|| BackendError::MalformedReply("reply is not a JSON object".to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| BackendError::MalformedReply("reply is not a JSON object".to_string()))?;

    if !outputs.is_empty() && !outputs.iter().any(|f| object.contains_key(&f.name)) {
        return Err(BackendError::MalformedReply(
            "reply has none of the requested fields".to_string(),
        ));
    }

    let mut output = GenerationOutput::new();
    for field in outputs {
        let text = match object.get(&field.name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        output = output.with(field.name.clone(), text);
    }
    Ok(output)
}

fn embedded_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
