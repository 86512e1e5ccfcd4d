use regex::Regex;
use std::sync::LazyLock;

use crate::schema::FieldSchema;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Comparison key for a value: trimmed, whitespace collapsed, case-folded.
/// Only used for deduplication; displayed values keep their casing.
pub fn normalize_value(value: &str) -> String {
    WHITESPACE
        .replace_all(value.trim(), " ")
        .to_lowercase()
}

/// Trim a value for display without changing its casing.
pub fn clean_value(value: &str) -> String {
    WHITESPACE.replace_all(value.trim(), " ").into_owned()
}

/// Maps field names coming back from the remote engine onto schema names.
pub struct FieldNameResolver<'a> {
    schema: &'a FieldSchema,
}

impl<'a> FieldNameResolver<'a> {
    pub fn new(schema: &'a FieldSchema) -> Self {
        Self { schema }
    }

    /// Exact match first, then a trimmed case-insensitive match. Unknown
    /// names are returned trimmed so the aggregator can reject them.
    pub fn resolve(&self, name: &str) -> String {
        let trimmed = name.trim();

        if self.schema.contains(trimmed) {
            return trimmed.to_string();
        }

        let folded = trimmed.to_lowercase();
        self.schema
            .iter()
            .find(|field| field.to_lowercase() == folded)
            .unwrap_or(trimmed)
            .to_string()
    }
}
