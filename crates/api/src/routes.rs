use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use extract::{ExtractionAdapter, FieldSchema, PipelineError, RunResult, write_csv};
use ingest::RawDocument;

use crate::metrics::{Metrics, MetricsSnapshot, TimedOperation};

#[derive(Clone)]
pub struct AppState {
    pub adapter: ExtractionAdapter,
    pub credential: Option<String>,
    pub metrics: Arc<Metrics>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    remote_configured: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct ExtractResponse {
    status: &'static str,
    #[serde(flatten)]
    result: RunResult,
}

#[derive(Deserialize)]
struct ExportRequest {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    records: Vec<Map<String, Value>>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/extract", post(extract_documents))
        .route("/api/export/csv", post(export_csv))
        .route("/api/metrics", get(get_metrics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(Arc::new(state))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        remote_configured: state.credential.is_some(),
    })
}

/// Multipart upload: a `fields` part holding a JSON array of names and one
/// `documents` part per file.
async fn extract_documents(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let mut raw_fields = "[]".to_string();
    let mut documents = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid upload: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "fields" => {
                raw_fields = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Invalid upload: {}", e)))?;
            }
            "documents" => {
                let name = field.file_name().unwrap_or("unnamed.txt").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read {}: {}", name, e)))?;
                documents.push(RawDocument::new(name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let names =
        parse_field_names(&raw_fields).inspect_err(|_| state.metrics.record_rejected_run())?;

    let schema = match FieldSchema::from_names_lenient(&names) {
        Ok(schema) => schema,
        Err(_) => {
            state.metrics.record_rejected_run();
            return Err(bad_request(PipelineError::EmptySchema.to_string()));
        }
    };

    let timer = TimedOperation::start();
    let result = state
        .adapter
        .run(documents, schema, state.credential.clone())
        .await
        .map_err(|e| {
            state.metrics.record_rejected_run();
            bad_request(e.to_string())
        })?;
    state.metrics.record_run(timer.elapsed(), &result);

    Ok(Json(ExtractResponse {
        status: "completed",
        result,
    }))
}

fn parse_field_names(raw: &str) -> Result<Vec<String>, ApiError> {
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|_| bad_request("Invalid fields format. Send a JSON array."))?;

    let names = match parsed {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(names)
}

async fn export_csv(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<ExportRequest>>,
) -> Result<Response, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(bad_request("Missing JSON body."));
    };
    if request.records.is_empty() {
        return Err(bad_request("No records to export."));
    }

    let fields = if request.fields.is_empty() {
        // Union of keys in first-seen order.
        let mut fields: Vec<String> = Vec::new();
        for record in &request.records {
            for key in record.keys() {
                if !fields.contains(key) {
                    fields.push(key.clone());
                }
            }
        }
        fields
    } else {
        request.fields
    };

    let rows: Vec<HashMap<String, String>> = request
        .records
        .into_iter()
        .map(|record| {
            record
                .into_iter()
                .map(|(k, v)| {
                    let cell = match v {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k, cell)
                })
                .collect()
        })
        .collect();

    let csv = write_csv(&fields, &rows).map_err(|e| {
        tracing::error!(error = %e, "CSV export failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "CSV export failed.".to_string(),
            }),
        )
    })?;
    state.metrics.record_export();

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"extracted_entities.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
