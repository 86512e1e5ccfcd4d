use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use extract::{Engine, RunResult};

pub struct Metrics {
    // Counters
    total_runs: AtomicUsize,
    rejected_runs: AtomicUsize,
    csv_exports: AtomicUsize,

    // Timing (in microseconds)
    total_run_time_us: AtomicU64,

    // Counts
    total_documents: AtomicUsize,
    remote_documents: AtomicUsize,
    fallback_documents: AtomicUsize,
    remote_failures: AtomicUsize,
    validation_failures: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_runs: AtomicUsize::new(0),
            rejected_runs: AtomicUsize::new(0),
            csv_exports: AtomicUsize::new(0),
            total_run_time_us: AtomicU64::new(0),
            total_documents: AtomicUsize::new(0),
            remote_documents: AtomicUsize::new(0),
            fallback_documents: AtomicUsize::new(0),
            remote_failures: AtomicUsize::new(0),
            validation_failures: AtomicUsize::new(0),
        })
    }

    pub fn record_run(&self, duration: std::time::Duration, result: &RunResult) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.total_run_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        for doc in &result.documents {
            self.total_documents.fetch_add(1, Ordering::Relaxed);
            match doc.engine {
                Engine::Remote => self.remote_documents.fetch_add(1, Ordering::Relaxed),
                Engine::Fallback => self.fallback_documents.fetch_add(1, Ordering::Relaxed),
            };
            if doc.remote_failure.is_some() {
                self.remote_failures.fetch_add(1, Ordering::Relaxed);
            }
            if doc.validation_error.is_some() {
                self.validation_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// A request that failed a precondition before extraction started.
    pub fn record_rejected_run(&self) {
        self.rejected_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export(&self) {
        self.csv_exports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_runs = self.total_runs.load(Ordering::Relaxed);
        let total_documents = self.total_documents.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_runs,
            rejected_runs: self.rejected_runs.load(Ordering::Relaxed),
            csv_exports: self.csv_exports.load(Ordering::Relaxed),
            total_documents,
            remote_documents: self.remote_documents.load(Ordering::Relaxed),
            fallback_documents: self.fallback_documents.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            avg_run_time_ms: self.avg_time_ms(total_runs),
            avg_document_time_ms: self.avg_time_ms(total_documents),
        }
    }

    fn avg_time_ms(&self, count: usize) -> f64 {
        let total = self.total_run_time_us.load(Ordering::Relaxed) as f64;
        if count > 0 {
            total / count as f64 / 1000.0 // Convert to ms
        } else {
            0.0
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_runs: usize,
    pub rejected_runs: usize,
    pub csv_exports: usize,
    pub total_documents: usize,
    pub remote_documents: usize,
    pub fallback_documents: usize,
    pub remote_failures: usize,
    pub validation_failures: usize,
    pub avg_run_time_ms: f64,
    pub avg_document_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{ExtractionAdapter, FieldSchema, PipelineConfig};
    use ingest::RawDocument;
    use std::time::Duration;

    #[tokio::test]
    async fn test_record_run_counts_documents() {
        let adapter = ExtractionAdapter::new(PipelineConfig::default());
        let result = adapter
            .run(
                vec![
                    RawDocument::new("a.txt", "a@b.io"),
                    RawDocument::new("b.txt", ""),
                ],
                FieldSchema::from_names(["email"]).unwrap(),
                None,
            )
            .await
            .unwrap();

        let metrics = Metrics::new();
        metrics.record_run(Duration::from_millis(4), &result);
        metrics.record_rejected_run();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_runs, 1);
        assert_eq!(snapshot.rejected_runs, 1);
        assert_eq!(snapshot.total_documents, 2);
        assert_eq!(snapshot.fallback_documents, 2);
        assert_eq!(snapshot.remote_documents, 0);
        assert_eq!(snapshot.validation_failures, 1);
        assert!((snapshot.avg_run_time_ms - 4.0).abs() < 1e-9);
        assert!((snapshot.avg_document_time_ms - 2.0).abs() < 1e-9);
    }
}
