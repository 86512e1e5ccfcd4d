use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

use crate::document::RawDocument;

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "csv", "json"];

pub struct FileReader;

impl FileReader {
    /// Load a file as raw bytes. Decoding happens later, per run.
    pub async fn read_file(path: &Path) -> Result<RawDocument> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        if !SUPPORTED_EXTENSIONS.contains(&extension) {
            anyhow::bail!("Unsupported file format: {}", extension);
        }

        let bytes = fs::read(path)
            .await
            .context(format!("Failed to read file: {:?}", path))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        tracing::debug!(file = %path.display(), bytes = bytes.len(), "read document");

        Ok(RawDocument::new(name, bytes))
    }

    /// Load every supported file in a directory, sorted by file name.
    pub async fn read_directory(dir: &Path) -> Result<Vec<RawDocument>> {
        let mut paths = Vec::new();

        let mut entries = fs::read_dir(dir)
            .await
            .context(format!("Failed to read directory: {:?}", dir))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.is_file() {
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    if SUPPORTED_EXTENSIONS.contains(&ext) {
                        paths.push(path);
                    }
                }
            }
        }

        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            documents.push(Self::read_file(&path).await?);
        }

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "hello").unwrap();

        let doc = FileReader::read_file(&path).await.unwrap();
        assert_eq!(doc.name, "note.txt");
        assert_eq!(doc.bytes, b"hello");
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, "x").unwrap();

        assert!(FileReader::read_file(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_read_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("skip.bin"), "x").unwrap();

        let docs = FileReader::read_directory(dir.path()).await.unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.md"]);
    }
}
