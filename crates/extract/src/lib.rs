pub mod adapter;
pub mod aggregator;
pub mod config;
pub mod export;
pub mod fallback;
pub mod llm;
pub mod normalizer;
pub mod prompt;
pub mod retry;
pub mod schema;

pub use adapter::{DocumentOutcome, ExtractionAdapter, PipelineError};
pub use aggregator::{DocumentSummary, Record, RecordAggregator, RunResult, dedup_candidates};
pub use config::{PipelineConfig, RemoteConfig, RetryConfig};
pub use export::{RowSource, write_csv, write_records_csv};
pub use fallback::{FallbackExtractor, FieldRule};
pub use llm::{LlmExtractionClient, RemoteEntity, RemoteError, RemoteExtractor};
pub use retry::RetryPolicy;
pub use schema::{Engine, EngineLabel, EntityCandidate, FieldSchema, SchemaError};

use std::sync::Arc;

/// Build an adapter with the HTTP extraction client attached.
pub fn build_adapter(
    pipeline: PipelineConfig,
    remote: &RemoteConfig,
) -> Result<ExtractionAdapter, RemoteError> {
    let client = LlmExtractionClient::new(remote, pipeline.max_json_retries)?;
    Ok(ExtractionAdapter::new(pipeline).with_remote(Arc::new(client)))
}
