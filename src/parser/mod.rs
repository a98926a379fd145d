//! Document parsing: format dispatch and per-format extractors

mod csv;
mod html;
mod json;
mod office;
mod pdf;
mod rtf;
mod text;

use crate::config::ParserConfig;
use crate::document::{FileType, ParsedDocument};
use crate::error::{ParseError, Result};
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Dispatches a source file to the parser for its format.
///
/// Guards every parse with a size bound and a wall-clock timeout; format
/// parsers run on the blocking thread pool since they are CPU-bound.
pub struct DocumentParser {
    config: ParserConfig,
}

impl DocumentParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse a source file into a uniform document value.
    ///
    /// Rejects unsupported extensions, oversized files, and non-files before
    /// dispatch; a parser exceeding the timeout yields `ParseError::Timeout`
    /// and no partial document.
    pub async fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| ParseError::NotAFile(path.display().to_string()))?;
        if !meta.is_file() {
            return Err(ParseError::NotAFile(path.display().to_string()).into());
        }

        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let file_type = FileType::from_extension(ext)
            .ok_or_else(|| ParseError::UnsupportedType(ext.to_string()))?;

        if meta.len() > self.config.max_file_size {
            return Err(ParseError::FileTooLarge {
                size: meta.len(),
                limit: self.config.max_file_size,
            }
            .into());
        }

        debug!(path = %path.display(), file_type = %file_type, "Parsing document");

        let owned = path.to_path_buf();
        let parsed = timeout(
            Duration::from_secs(self.config.timeout),
            tokio::task::spawn_blocking(move || parse_file(&owned, file_type)),
        )
        .await
        .map_err(|_| {
            warn!(path = %path.display(), "Parse timed out");
            ParseError::Timeout
        })?
        .map_err(|e| ParseError::Failed(format!("parser task failed: {e}")))??;

        debug!(
            path = %path.display(),
            chars = parsed.content.len(),
            sections = parsed.sections.len(),
            "Parsed document"
        );
        Ok(parsed)
    }
}

impl Default for DocumentParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

/// Route a file to its format parser (blocking)
pub(crate) fn parse_file(path: &Path, file_type: FileType) -> Result<ParsedDocument> {
    match file_type {
        FileType::Txt => text::parse_text(path),
        FileType::Md => text::parse_markdown(path),
        FileType::Pdf => pdf::parse(path),
        FileType::Docx => office::parse_docx(path),
        FileType::Pptx => office::parse_pptx(path),
        FileType::Xlsx => office::parse_xlsx(path),
        FileType::Csv => csv::parse(path),
        FileType::Json => json::parse(path),
        FileType::Html => html::parse(path),
        FileType::Rtf => rtf::parse(path),
    }
}

/// Read a file and decode it as UTF-8, tolerating invalid sequences
pub(crate) fn read_lossy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| ParseError::Failed(e.to_string()))?;
    let (decoded, _, _) = encoding_rs::UTF_8.decode(&bytes);
    Ok(decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use std::io::Write;

    #[tokio::test]
    async fn test_rejects_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binary.exe");
        std::fs::write(&path, b"MZ").unwrap();

        let parser = DocumentParser::default();
        let err = parser.parse(&path).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Parse(ParseError::UnsupportedType(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_missing_file() {
        let parser = DocumentParser::default();
        let err = parser.parse(Path::new("/nonexistent/file.txt")).await;
        assert!(matches!(
            err.unwrap_err(),
            RagError::Parse(ParseError::NotAFile(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![b'a'; 2048]).unwrap();

        let parser = DocumentParser::new(ParserConfig {
            max_file_size: 1024,
            timeout: 60,
        });
        let err = parser.parse(&path).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Parse(ParseError::FileTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_parses_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "hello parser").unwrap();

        let parser = DocumentParser::default();
        let parsed = parser.parse(&path).await.unwrap();
        assert_eq!(parsed.content, "hello parser");
    }
}
