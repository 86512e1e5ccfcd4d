use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("field schema must contain at least one field")]
    Empty,
    #[error("field names must not be blank")]
    BlankName,
    #[error("duplicate field name: {0}")]
    Duplicate(String),
}

/// Ordered, user-declared set of extraction field names.
///
/// Names are trimmed on insert and compared case-sensitively. Insertion
/// order is the column order of every record and of the CSV export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldSchema {
    fields: Vec<String>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema, rejecting blanks and duplicates.
    pub fn from_names<I, S>(names: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut schema = Self::new();
        for name in names {
            schema.add(name.as_ref())?;
        }
        if schema.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(schema)
    }

    /// Build a schema from loosely supplied names: blanks are skipped and
    /// repeated names keep their first position.
    pub fn from_names_lenient<I, S>(names: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut schema = Self::new();
        for name in names {
            match schema.add(name.as_ref()) {
                Ok(()) | Err(SchemaError::BlankName) | Err(SchemaError::Duplicate(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if schema.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(schema)
    }

    pub fn add(&mut self, name: &str) -> Result<(), SchemaError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SchemaError::BlankName);
        }
        if self.contains(name) {
            return Err(SchemaError::Duplicate(name.to_string()));
        }
        self.fields.push(name.to_string());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Which path produced a document's entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Remote,
    Fallback,
}

/// Run-level engine summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineLabel {
    Remote,
    Fallback,
    Mixed,
}

impl EngineLabel {
    /// All remote -> `Remote`, all fallback -> `Fallback`, anything else -> `Mixed`.
    /// An empty batch reports `Fallback`.
    pub fn reduce<I>(engines: I) -> Self
    where
        I: IntoIterator<Item = Engine>,
    {
        let mut saw_remote = false;
        let mut saw_fallback = false;

        for engine in engines {
            match engine {
                Engine::Remote => saw_remote = true,
                Engine::Fallback => saw_fallback = true,
            }
        }

        match (saw_remote, saw_fallback) {
            (true, false) => EngineLabel::Remote,
            (true, true) => EngineLabel::Mixed,
            (false, _) => EngineLabel::Fallback,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineLabel::Remote => "remote",
            EngineLabel::Fallback => "fallback",
            EngineLabel::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for EngineLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected value for one field from one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCandidate {
    pub field: String,
    pub value: String,
    pub source_document: String,
    pub extraction_class: String,
    pub engine: Engine,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_trims_and_keeps_order() {
        let schema = FieldSchema::from_names([" email ", "phone", "Date"]).unwrap();
        assert_eq!(schema.names(), ["email", "phone", "Date"]);
        assert_eq!(schema.position("phone"), Some(1));
    }

    #[test]
    fn test_schema_rejects_duplicates_case_sensitive() {
        let mut schema = FieldSchema::new();
        schema.add("email").unwrap();
        assert_eq!(
            schema.add(" email"),
            Err(SchemaError::Duplicate("email".to_string()))
        );
        assert!(schema.add("Email").is_ok());
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_schema_rejects_empty_and_blank() {
        assert_eq!(
            FieldSchema::from_names(Vec::<String>::new()),
            Err(SchemaError::Empty)
        );
        assert_eq!(FieldSchema::from_names(["  "]), Err(SchemaError::BlankName));
    }

    #[test]
    fn test_lenient_schema_skips_blanks_and_repeats() {
        let schema = FieldSchema::from_names_lenient(["name", "", "name", "city"]).unwrap();
        assert_eq!(schema.names(), ["name", "city"]);
        assert_eq!(
            FieldSchema::from_names_lenient(["", " "]),
            Err(SchemaError::Empty)
        );
    }

    #[test]
    fn test_engine_label_reduction() {
        assert_eq!(
            EngineLabel::reduce([Engine::Remote, Engine::Remote]),
            EngineLabel::Remote
        );
        assert_eq!(
            EngineLabel::reduce([Engine::Fallback, Engine::Fallback]),
            EngineLabel::Fallback
        );
        assert_eq!(
            EngineLabel::reduce([Engine::Fallback, Engine::Remote]),
            EngineLabel::Mixed
        );
        assert_eq!(EngineLabel::reduce(Vec::<Engine>::new()), EngineLabel::Fallback);
    }

    #[test]
    fn test_engine_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EngineLabel::Mixed).unwrap(),
            "\"mixed\""
        );
    }
}
