use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An uploaded document before decoding: identifier plus raw bytes.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let name = if name.trim().is_empty() {
            "unnamed.txt".to_string()
        } else {
            name
        };

        Self {
            name,
            bytes: bytes.into(),
        }
    }
}

/// A decoded text document owned by a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub text: String,
}

impl Document {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("document is empty")]
    Empty,
    #[error("document is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("document is not valid text: {reason}")]
    Undecodable { reason: String },
}

/// Result of validating and decoding a [`RawDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Valid UTF-8 within the size limit.
    Clean(Document),
    /// Validation failed, but usable text was recovered.
    Degraded {
        document: Document,
        error: ValidationError,
    },
    /// Validation failed and nothing usable remains.
    Rejected(ValidationError),
}

// Share of control characters above which bytes are treated as binary.
const BINARY_CONTROL_RATIO: f64 = 0.1;

impl RawDocument {
    /// Validate and decode the bytes.
    ///
    /// Oversized input is cut at `max_bytes` on a character boundary. Invalid
    /// UTF-8 is decoded lossily with the invalid sequences removed, unless the
    /// content looks binary.
    pub fn decode(&self, max_bytes: usize) -> Decoded {
        if self.bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Decoded::Rejected(ValidationError::Empty);
        }

        if looks_binary(&self.bytes) {
            return Decoded::Rejected(ValidationError::Undecodable {
                reason: "binary content".to_string(),
            });
        }

        let mut error = None;

        let bytes = if self.bytes.len() > max_bytes {
            error = Some(ValidationError::TooLarge {
                size: self.bytes.len(),
                limit: max_bytes,
            });
            &self.bytes[..max_bytes]
        } else {
            &self.bytes[..]
        };

        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            // Truncation may split a multi-byte character; drop the tail.
            Err(e) if error.is_some() && e.error_len().is_none() => {
                String::from_utf8_lossy(&bytes[..e.valid_up_to()]).into_owned()
            }
            Err(e) => {
                if error.is_none() {
                    error = Some(ValidationError::Undecodable {
                        reason: format!("invalid UTF-8 at byte {}", e.valid_up_to()),
                    });
                }
                String::from_utf8_lossy(bytes).replace(char::REPLACEMENT_CHARACTER, "")
            }
        };

        let document = Document::new(self.name.clone(), text);

        match error {
            None => Decoded::Clean(document),
            Some(error) if document.text.trim().is_empty() => Decoded::Rejected(error),
            Some(error) => Decoded::Degraded { document, error },
        }
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    if bytes.contains(&0) {
        return true;
    }

    let sample = &bytes[..bytes.len().min(8192)];
    let control = sample
        .iter()
        .filter(|b| b.is_ascii_control() && !b.is_ascii_whitespace())
        .count();

    control as f64 / sample.len() as f64 > BINARY_CONTROL_RATIO
}
