use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use extract::{PipelineConfig, RemoteConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    /// Credential for the remote extraction service. Never serialized.
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub remote: RemoteConfig,
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
            api_key: None,
            remote: RemoteConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with `EXTRACT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("EXTRACT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.api_key = get("EXTRACT_API_KEY");
        if let Some(model) = get("EXTRACT_MODEL") {
            config.remote.model = model;
        }
        if let Some(url) = get("EXTRACT_BASE_URL") {
            config.remote.base_url = url;
        }
        if let Some(v) = get("EXTRACT_MAX_DOCUMENT_BYTES") {
            config.pipeline.max_document_bytes = parse("EXTRACT_MAX_DOCUMENT_BYTES", &v)?;
        }
        if let Some(v) = get("EXTRACT_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse("EXTRACT_MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = get("EXTRACT_REMOTE_TIMEOUT_SECS") {
            config.pipeline.remote_timeout_secs = parse("EXTRACT_REMOTE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("EXTRACT_MAX_CONCURRENCY") {
            config.pipeline.max_concurrent_documents = parse("EXTRACT_MAX_CONCURRENCY", &v)?;
        }

        Ok(config)
    }

    pub fn remote_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert!(!config.remote_configured());
        assert_eq!(config.pipeline.max_concurrent_documents, 5);
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("EXTRACT_API_KEY", "sk-test"),
            ("EXTRACT_MODEL", "small-model"),
            ("EXTRACT_REMOTE_TIMEOUT_SECS", " 5 "),
            ("EXTRACT_MAX_CONCURRENCY", "2"),
        ]))
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.remote.model, "small-model");
        assert_eq!(config.pipeline.remote_timeout_secs, 5);
        assert_eq!(config.pipeline.max_concurrent_documents, 2);
    }

    #[test]
    fn test_blank_key_means_no_credential() {
        let config = AppConfig::from_lookup(lookup(&[("EXTRACT_API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[("EXTRACT_MAX_DOCUMENT_BYTES", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("EXTRACT_MAX_DOCUMENT_BYTES"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = AppConfig {
            api_key: Some("secret".to_string()),
            ..AppConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
