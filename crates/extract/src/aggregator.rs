//! Merges per-document candidates into one record per document.
//!
//! Records are single-valued: for each field the first distinct value in
//! extraction order is displayed. Every schema field is present in every
//! record, empty when nothing was found.

use serde::Serialize;
use serde::ser::SerializeMap;
use std::collections::HashSet;
use tracing::warn;

use crate::adapter::DocumentOutcome;
use crate::normalizer::normalize_value;
use crate::schema::{Engine, EngineLabel, EntityCandidate, FieldSchema};

/// One output row: a value per schema field, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub document: String,
    values: Vec<(String, String)>,
}

impl Record {
    pub fn empty(document: &str, schema: &FieldSchema) -> Self {
        Self {
            document: document.to_string(),
            values: schema.iter().map(|f| (f.to_string(), String::new())).collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    /// Set `field` unless it already holds a value. Returns whether it was set.
    fn fill(&mut self, field: &str, value: &str) -> bool {
        match self.values.iter_mut().find(|(f, _)| f == field) {
            Some((_, slot)) if slot.is_empty() => {
                *slot = value.to_string();
                true
            }
            _ => false,
        }
    }
}

// Serialized as a plain field -> value object; the document identifier is
// reported separately in `RunResult::documents`.
impl Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in &self.values {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub name: String,
    pub engine: Engine,
    pub candidates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
}

/// Immutable snapshot of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub engine: EngineLabel,
    pub fields: FieldSchema,
    pub documents: Vec<DocumentSummary>,
    pub records: Vec<Record>,
    pub logs: Vec<String>,
}

impl RunResult {
    pub fn to_csv(&self) -> anyhow::Result<String> {
        crate::export::write_csv(self.fields.names(), &self.records)
    }

    /// CSV with a leading `document` column, for exports spanning many files.
    pub fn to_csv_with_documents(&self) -> anyhow::Result<String> {
        crate::export::write_records_csv(self.fields.names(), &self.records)
    }
}

/// Collapse candidates sharing (document, field, normalized value), keeping
/// the first occurrence.
pub fn dedup_candidates(candidates: Vec<EntityCandidate>) -> Vec<EntityCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| {
            seen.insert((
                c.source_document.clone(),
                c.field.clone(),
                normalize_value(&c.value),
            ))
        })
        .collect()
}

pub struct RecordAggregator<'a> {
    schema: &'a FieldSchema,
}

impl<'a> RecordAggregator<'a> {
    pub fn new(schema: &'a FieldSchema) -> Self {
        Self { schema }
    }

    /// Build the run result. `logs` holds lines recorded before any document
    /// was processed; document logs follow in document order, then
    /// aggregation warnings and a summary line.
    pub fn aggregate(&self, mut logs: Vec<String>, mut outcomes: Vec<DocumentOutcome>) -> RunResult {
        outcomes.sort_by_key(|o| o.index);

        let mut warnings = Vec::new();
        let mut records = Vec::with_capacity(outcomes.len());
        let mut documents = Vec::with_capacity(outcomes.len());

        for outcome in outcomes {
            logs.extend(outcome.logs);

            let candidates = dedup_candidates(outcome.candidates);
            let mut record = Record::empty(&outcome.document, self.schema);

            for candidate in &candidates {
                if !self.schema.contains(&candidate.field) {
                    warn!(
                        document = %outcome.document,
                        field = %candidate.field,
                        "discarding candidate for unknown field"
                    );
                    warnings.push(format!(
                        "Warning: discarded value for unknown field '{}' in document {}.",
                        candidate.field, outcome.document
                    ));
                    continue;
                }
                if candidate.source_document != outcome.document {
                    warn!(
                        document = %outcome.document,
                        source = %candidate.source_document,
                        "discarding candidate from another document"
                    );
                    warnings.push(format!(
                        "Warning: discarded value for field '{}' attributed to document {} while processing {}.",
                        candidate.field, candidate.source_document, outcome.document
                    ));
                    continue;
                }
                record.fill(&candidate.field, &candidate.value);
            }

            documents.push(DocumentSummary {
                name: outcome.document,
                engine: outcome.engine,
                candidates: candidates.len(),
                remote_failure: outcome.remote_failure.map(str::to_string),
                validation_error: outcome.validation_error,
            });
            records.push(record);
        }

        let engine = EngineLabel::reduce(documents.iter().map(|d| d.engine));

        logs.extend(warnings);
        logs.push(format!(
            "Generated {} extracted record(s) using {} engine.",
            records.len(),
            engine
        ));

        RunResult {
            engine,
            fields: self.schema.clone(),
            documents,
            records,
            logs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(doc: &str, field: &str, value: &str) -> EntityCandidate {
        EntityCandidate {
            field: field.to_string(),
            value: value.to_string(),
            source_document: doc.to_string(),
            extraction_class: "test".to_string(),
            engine: Engine::Fallback,
        }
    }

    fn outcome(index: usize, doc: &str, engine: Engine, candidates: Vec<EntityCandidate>) -> DocumentOutcome {
        DocumentOutcome {
            index,
            document: doc.to_string(),
            engine,
            candidates,
            logs: vec![format!("processed {}", doc)],
            remote_failure: None,
            validation_error: None,
        }
    }

    #[test]
    fn test_duplicate_candidate_collapses() {
        let c = candidate("a.txt", "email", "jane@example.com");
        let deduped = dedup_candidates(vec![c.clone(), c.clone()]);
        assert_eq!(deduped, vec![c]);
    }

    #[test]
    fn test_dedup_ignores_case_and_whitespace_keeps_first_display() {
        let deduped = dedup_candidates(vec![
            candidate("a.txt", "company", "Acme Corp"),
            candidate("a.txt", "company", "  ACME   corp "),
            candidate("b.txt", "company", "acme corp"),
        ]);
        let values: Vec<_> = deduped.iter().map(|c| (c.source_document.as_str(), c.value.as_str())).collect();
        assert_eq!(values, vec![("a.txt", "Acme Corp"), ("b.txt", "acme corp")]);
    }

    #[test]
    fn test_records_are_complete_and_ordered() {
        let schema = FieldSchema::from_names(["name", "email", "phone"]).unwrap();
        let result = RecordAggregator::new(&schema).aggregate(
            vec!["start".to_string()],
            vec![
                outcome(1, "b.txt", Engine::Fallback, vec![candidate("b.txt", "phone", "555-1234")]),
                outcome(0, "a.txt", Engine::Fallback, vec![]),
            ],
        );

        assert_eq!(result.records[0].document, "a.txt");
        assert_eq!(result.records[1].document, "b.txt");
        for record in &result.records {
            let fields: Vec<_> = record.values().map(|(f, _)| f).collect();
            assert_eq!(fields, vec!["name", "email", "phone"]);
        }
        assert_eq!(result.records[1].get("phone"), Some("555-1234"));
        assert_eq!(result.records[1].get("name"), Some(""));
        assert_eq!(
            result.logs,
            vec![
                "start",
                "processed a.txt",
                "processed b.txt",
                "Generated 2 extracted record(s) using fallback engine.",
            ]
        );
    }

    #[test]
    fn test_first_distinct_value_wins() {
        let schema = FieldSchema::from_names(["email"]).unwrap();
        let result = RecordAggregator::new(&schema).aggregate(
            vec![],
            vec![outcome(
                0,
                "a.txt",
                Engine::Remote,
                vec![
                    candidate("a.txt", "email", "first@example.com"),
                    candidate("a.txt", "email", "second@example.com"),
                ],
            )],
        );

        assert_eq!(result.records[0].get("email"), Some("first@example.com"));
        assert_eq!(result.documents[0].candidates, 2);
        assert_eq!(result.engine, EngineLabel::Remote);
    }

    #[test]
    fn test_unknown_field_is_warned_and_discarded() {
        let schema = FieldSchema::from_names(["email"]).unwrap();
        let result = RecordAggregator::new(&schema).aggregate(
            vec![],
            vec![outcome(
                0,
                "a.txt",
                Engine::Remote,
                vec![
                    candidate("a.txt", "fax", "555-0000"),
                    candidate("a.txt", "email", "x@y.io"),
                ],
            )],
        );

        let fields: Vec<_> = result.records[0].values().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["email"]);
        assert_eq!(result.records[0].get("email"), Some("x@y.io"));
        assert_eq!(
            result
                .logs
                .iter()
                .filter(|l| l.starts_with("Warning") && l.contains("'fax'") && l.contains("a.txt"))
                .count(),
            1
        );
    }

    #[test]
    fn test_engine_label_is_reduced_over_all_documents() {
        let schema = FieldSchema::from_names(["name"]).unwrap();
        let result = RecordAggregator::new(&schema).aggregate(
            vec![],
            vec![
                outcome(0, "a.txt", Engine::Remote, vec![]),
                outcome(1, "b.txt", Engine::Fallback, vec![]),
                outcome(2, "c.txt", Engine::Remote, vec![]),
            ],
        );
        assert_eq!(result.engine, EngineLabel::Mixed);
    }

    #[test]
    fn test_json_shape() {
        let schema = FieldSchema::from_names(["name", "city"]).unwrap();
        let result = RecordAggregator::new(&schema).aggregate(
            vec![],
            vec![outcome(0, "a.txt", Engine::Fallback, vec![candidate("a.txt", "city", "Oslo")])],
        );

        let json = serde_json::to_string(&result.records[0]).unwrap();
        assert_eq!(json, r#"{"name":"","city":"Oslo"}"#);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["engine"], "fallback");
        assert_eq!(value["fields"], serde_json::json!(["name", "city"]));
        assert_eq!(value["documents"][0]["name"], "a.txt");
        assert!(value["logs"].is_array());
    }
}
