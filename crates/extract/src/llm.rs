use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::RemoteConfig;
use crate::prompt;
use crate::retry::RetryPolicy;
use crate::schema::FieldSchema;

const MAX_ERROR_BODY_CHARS: usize = 256;

/// One entity as reported by the remote engine, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntity {
    pub field: String,
    pub value: String,
    pub extraction_class: String,
}

impl RemoteEntity {
    pub fn new(
        field: impl Into<String>,
        value: impl Into<String>,
        extraction_class: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            extraction_class: extraction_class.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no credential supplied")]
    MissingCredential,
    #[error("credential rejected by extraction service")]
    InvalidCredential,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("extraction service returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("extraction client panicked")]
    Panicked,
}

impl RemoteError {
    /// Short stable tag for logs and metrics.
    pub fn cause(&self) -> &'static str {
        match self {
            RemoteError::MissingCredential | RemoteError::InvalidCredential => "credential",
            RemoteError::Transport(_) => "transport",
            RemoteError::HttpStatus { .. } => "http_status",
            RemoteError::MalformedResponse(_) => "malformed_response",
            RemoteError::Model(_) => "model",
            RemoteError::Timeout(_) => "timeout",
            RemoteError::Panicked => "panic",
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Transport(_) => true,
            RemoteError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Boundary to a language-model-backed extraction service.
#[async_trait]
pub trait RemoteExtractor: Send + Sync {
    async fn extract(
        &self,
        document_text: &str,
        schema: &FieldSchema,
        credential: &str,
    ) -> Result<Vec<RemoteEntity>, RemoteError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Chat-completions client that asks the model for a JSON list of extractions.
pub struct LlmExtractionClient {
    base_url: String,
    model: String,
    max_json_retries: usize,
    request_timeout: Duration,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl LlmExtractionClient {
    pub fn new(config: &RemoteConfig, max_json_retries: usize) -> Result<Self, RemoteError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_json_retries,
            request_timeout,
            retry: RetryPolicy::from_config(&config.retry),
            client,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout(self.request_timeout)
        } else {
            RemoteError::Transport(e.to_string())
        }
    }

    async fn complete(&self, prompt: &str, credential: &str) -> Result<String, RemoteError> {
        self.retry
            .retry("remote_extraction", RemoteError::is_transient, move || {
                self.complete_once(prompt, credential)
            })
            .await
    }

    async fn complete_once(&self, prompt: &str, credential: &str) -> Result<String, RemoteError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(RemoteError::InvalidCredential);
        }
        if !status.is_success() {
            return Err(RemoteError::HttpStatus {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| RemoteError::MalformedResponse(format!("unreadable response body: {}", e)))?;

        if let Some(error) = parsed.error {
            return Err(RemoteError::Model(error.message));
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RemoteError::MalformedResponse("response has no message content".to_string()))
    }
}

#[async_trait]
impl RemoteExtractor for LlmExtractionClient {
    async fn extract(
        &self,
        document_text: &str,
        schema: &FieldSchema,
        credential: &str,
    ) -> Result<Vec<RemoteEntity>, RemoteError> {
        if credential.trim().is_empty() {
            return Err(RemoteError::MissingCredential);
        }

        let extraction_prompt = prompt::build_extraction_prompt(document_text, schema);
        let mut content = self.complete(&extraction_prompt, credential).await?;

        let mut attempt = 0;
        loop {
            match parse_extractions(&content) {
                Ok(entities) => return Ok(entities),
                Err(RemoteError::MalformedResponse(reason)) if attempt < self.max_json_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, %reason, "model returned invalid JSON, asking for a correction");
                    let retry_prompt = prompt::build_retry_prompt(&content);
                    content = self.complete(&retry_prompt, credential).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn truncate_body(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened: String = collapsed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}...", shortened)
    } else {
        collapsed
    }
}

/// Parse model output into entities.
///
/// Accepts `{"extractions": [...]}` or a bare array, optionally wrapped in a
/// markdown code fence. An `{"error": ...}` object is reported as a model error.
pub fn parse_extractions(content: &str) -> Result<Vec<RemoteEntity>, RemoteError> {
    let json = strip_code_fence(content);

    let value: Value = serde_json::from_str(json)
        .map_err(|e| RemoteError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => {
            if let Some(error) = map.get("error") {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| error.as_str())
                    .unwrap_or("unspecified error");
                return Err(RemoteError::Model(message.to_string()));
            }
            match map.get("extractions") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(RemoteError::MalformedResponse(
                        "missing \"extractions\" array".to_string(),
                    ))
                }
            }
        }
        _ => {
            return Err(RemoteError::MalformedResponse(
                "expected a JSON object or array".to_string(),
            ))
        }
    };

    let mut entities = Vec::with_capacity(items.len());
    for item in items {
        let field = item
            .get("field")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::MalformedResponse("extraction without \"field\"".to_string()))?;

        let value = match item.get("value") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Null) | None => continue,
            Some(other) => {
                return Err(RemoteError::MalformedResponse(format!(
                    "unsupported value for field {}: {}",
                    field, other
                )))
            }
        };

        let extraction_class = item
            .get("extraction_class")
            .and_then(Value::as_str)
            .unwrap_or("entity");

        entities.push(RemoteEntity::new(field, value, extraction_class));
    }

    Ok(entities)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, e.g. ```json
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().trim_end_matches("```").trim()
}
