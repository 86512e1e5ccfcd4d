use serde::{Deserialize, Serialize};

use ingest::DEFAULT_MAX_DOCUMENT_BYTES;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub max_document_bytes: usize,
    /// Upper bound on one remote extraction, retries included.
    pub remote_timeout_secs: u64,
    pub max_concurrent_documents: usize,
    /// Correction round-trips allowed when the model returns invalid JSON.
    pub max_json_retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            remote_timeout_secs: 60,
            max_concurrent_documents: 5,
            max_json_retries: 2,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            request_timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 5000,
        }
    }
}
