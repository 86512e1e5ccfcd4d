use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use ingest::{Decoded, RawDocument};

use crate::aggregator::{RecordAggregator, RunResult};
use crate::config::PipelineConfig;
use crate::fallback::FallbackExtractor;
use crate::llm::{RemoteEntity, RemoteError, RemoteExtractor};
use crate::normalizer::{FieldNameResolver, clean_value};
use crate::schema::{Engine, EntityCandidate, FieldSchema};

/// Failures that stop a run before any document is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Please provide at least one valid field.")]
    EmptySchema,
    #[error("Please upload at least one document.")]
    NoDocuments,
}

/// Everything one document contributed to a run.
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub index: usize,
    pub document: String,
    pub engine: Engine,
    pub candidates: Vec<EntityCandidate>,
    pub logs: Vec<String>,
    /// Cause tag of the remote failure that forced the fallback, if any.
    pub remote_failure: Option<&'static str>,
    pub validation_error: Option<String>,
}

impl DocumentOutcome {
    fn new(index: usize, document: &str, engine: Engine) -> Self {
        Self {
            index,
            document: document.to_string(),
            engine,
            candidates: Vec::new(),
            logs: Vec::new(),
            remote_failure: None,
            validation_error: None,
        }
    }

    fn internal_error(index: usize, document: &str, reason: &str) -> Self {
        let mut outcome = Self::new(index, document, Engine::Fallback);
        let line = format!(
            "Internal error while processing document {}: {}; its fields are left empty.",
            document, reason
        );
        warn!(document, reason, "document task failed");
        outcome.logs.push(line);
        outcome
    }
}

/// Drives extraction per document: remote when a credential is available,
/// deterministic fallback otherwise or on any remote failure.
#[derive(Clone)]
pub struct ExtractionAdapter {
    remote: Option<Arc<dyn RemoteExtractor>>,
    fallback: FallbackExtractor,
    config: Arc<PipelineConfig>,
}

impl ExtractionAdapter {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            remote: None,
            fallback: FallbackExtractor::new(),
            config: Arc::new(config),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteExtractor>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.config.remote_timeout_secs)
    }

    /// Remote call on its own task so a panicking client surfaces as a
    /// `RemoteError` and the document can still fall back.
    async fn call_remote(
        &self,
        remote: &Arc<dyn RemoteExtractor>,
        text: &str,
        schema: &FieldSchema,
        credential: &str,
    ) -> Result<Vec<RemoteEntity>, RemoteError> {
        let timeout = self.remote_timeout();
        let remote = Arc::clone(remote);
        let text = text.to_string();
        let schema = schema.clone();
        let credential = credential.to_string();

        let mut call = tokio::spawn(
            async move { remote.extract(&text, &schema, &credential).await }.in_current_span(),
        );

        match tokio::time::timeout(timeout, &mut call).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => Err(RemoteError::Panicked),
            Ok(Err(e)) => Err(RemoteError::Transport(e.to_string())),
            Err(_) => {
                call.abort();
                Err(RemoteError::Timeout(timeout))
            }
        }
    }

    /// Run a batch. Documents are processed concurrently, bounded by
    /// `max_concurrent_documents`; results and logs keep input order.
    pub async fn run(
        &self,
        documents: Vec<RawDocument>,
        schema: FieldSchema,
        credential: Option<String>,
    ) -> Result<RunResult, PipelineError> {
        if schema.is_empty() {
            return Err(PipelineError::EmptySchema);
        }
        if documents.is_empty() {
            return Err(PipelineError::NoDocuments);
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("extraction_run", %run_id, documents = documents.len(), fields = schema.len());

        async move {
            let credential: Option<Arc<str>> = credential
                .filter(|c| !c.trim().is_empty())
                .map(Arc::from);

            let header = match (credential.is_some(), self.remote.is_some()) {
                (true, true) => format!(
                    "Remote extraction enabled. Processing {} document(s) for {} field(s).",
                    documents.len(),
                    schema.len()
                ),
                (true, false) => format!(
                    "Remote extraction client not configured. Using fallback extractor for {} document(s).",
                    documents.len()
                ),
                (false, _) => format!(
                    "No credential configured. Using fallback extractor for {} document(s).",
                    documents.len()
                ),
            };
            info!("{}", header);

            let schema = Arc::new(schema);
            let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_documents.max(1)));

            let mut handles = Vec::with_capacity(documents.len());
            for (index, raw) in documents.into_iter().enumerate() {
                let adapter = self.clone();
                let schema = Arc::clone(&schema);
                let credential = credential.clone();
                let semaphore = Arc::clone(&semaphore);
                let name = raw.name.clone();

                let handle = tokio::spawn(
                    async move {
                        let _permit = semaphore.acquire_owned().await.ok();
                        adapter
                            .extract_document(index, &raw, &schema, credential.as_deref())
                            .await
                    }
                    .in_current_span(),
                );
                handles.push((name, handle));
            }

            // Awaiting in spawn order keeps outcomes in document order.
            let mut outcomes = Vec::with_capacity(handles.len());
            for (index, (name, handle)) in handles.into_iter().enumerate() {
                match handle.await {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => {
                        let reason = if e.is_panic() { "task panicked" } else { "task cancelled" };
                        outcomes.push(DocumentOutcome::internal_error(index, &name, reason));
                    }
                }
            }

            let result = RecordAggregator::new(&schema).aggregate(vec![header], outcomes);
            info!(engine = %result.engine, records = result.records.len(), "extraction run finished");
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Extract one document. Never fails: problems become log lines and the
    /// document falls back or yields no entities.
    pub async fn extract_document(
        &self,
        index: usize,
        raw: &RawDocument,
        schema: &FieldSchema,
        credential: Option<&str>,
    ) -> DocumentOutcome {
        let name = raw.name.as_str();

        let document = match raw.decode(self.config.max_document_bytes) {
            Decoded::Clean(document) => document,
            Decoded::Degraded { document, error } => {
                let mut outcome = DocumentOutcome::new(index, name, Engine::Fallback);
                outcome.logs.push(format!(
                    "Document {} failed validation: {}; using fallback on best-effort text.",
                    name, error
                ));
                warn!(document = name, %error, "document degraded");
                outcome.validation_error = Some(error.to_string());
                outcome.candidates = self.fallback.extract(name, &document.text, schema);
                outcome.logs.push(entity_summary(&outcome));
                return outcome;
            }
            Decoded::Rejected(error) => {
                let mut outcome = DocumentOutcome::new(index, name, Engine::Fallback);
                outcome.logs.push(format!(
                    "Document {} failed validation: {}; no entities extracted.",
                    name, error
                ));
                warn!(document = name, %error, "document rejected");
                outcome.validation_error = Some(error.to_string());
                return outcome;
            }
        };

        let (remote, credential) = match (&self.remote, credential) {
            (Some(remote), Some(credential)) => (remote, credential),
            (_, credential) => {
                let reason = if credential.is_none() {
                    "no credential supplied"
                } else {
                    "remote extraction client not configured"
                };
                let mut outcome = DocumentOutcome::new(index, name, Engine::Fallback);
                outcome.logs.push(format!(
                    "Document {}: {}; using fallback extractor.",
                    name, reason
                ));
                outcome.candidates = self.fallback.extract(name, &document.text, schema);
                outcome.logs.push(entity_summary(&outcome));
                return outcome;
            }
        };

        let result = self.call_remote(remote, &document.text, schema, credential).await;

        match result {
            Ok(entities) => {
                let mut outcome = DocumentOutcome::new(index, name, Engine::Remote);
                let resolver = FieldNameResolver::new(schema);
                outcome.candidates = entities
                    .into_iter()
                    .filter(|e| !e.value.trim().is_empty())
                    .map(|e| EntityCandidate {
                        field: resolver.resolve(&e.field),
                        value: clean_value(&e.value),
                        source_document: name.to_string(),
                        extraction_class: e.extraction_class,
                        engine: Engine::Remote,
                    })
                    .collect();
                outcome.logs.push(entity_summary(&outcome));
                outcome
            }
            Err(error) => {
                let mut outcome = DocumentOutcome::new(index, name, Engine::Fallback);
                warn!(document = name, cause = error.cause(), %error, "remote extraction failed");
                outcome.logs.push(format!(
                    "Remote call failed for document {} ({}): {}; using fallback.",
                    name,
                    error.cause(),
                    error
                ));
                outcome.remote_failure = Some(error.cause());
                outcome.candidates = self.fallback.extract(name, &document.text, schema);
                outcome.logs.push(entity_summary(&outcome));
                outcome
            }
        }
    }
}

fn entity_summary(outcome: &DocumentOutcome) -> String {
    let engine = match outcome.engine {
        Engine::Remote => "remote",
        Engine::Fallback => "fallback",
    };
    debug!(document = %outcome.document, engine, candidates = outcome.candidates.len(), "document extracted");
    format!(
        "Document {}: {} candidate(s) from {} extraction.",
        outcome.document,
        outcome.candidates.len(),
        engine
    )
}
