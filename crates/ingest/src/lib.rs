pub mod document;
pub mod reader;

pub use document::{Decoded, Document, RawDocument, ValidationError};
pub use reader::FileReader;

/// Upper bound on a single document when no explicit limit is configured.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;
