//! Text extraction for files passed to `gw add` and `gw ingest`.
//!
//! PDFs go through `pdf-extract`; every other supported file is read as
//! UTF-8 text. The document type is guessed from the extension.

use groundwork_core::models::DocumentType;
use std::path::Path;

/// Extraction failure. Ingestion of a directory skips the file and
/// continues.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("file is not valid UTF-8 text")]
    NotUtf8,
    #[error("no text could be extracted")]
    Empty,
}

/// Text and guessed type of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFile {
    pub text: String,
    pub doc_type: DocumentType,
}

/// Extract plain text from `bytes` according to `doc_type`.
pub fn extract_text(bytes: &[u8], doc_type: DocumentType) -> Result<String, ExtractError> {
    let text = match doc_type {
        DocumentType::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?
        }
        _ => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotUtf8)?,
    };

    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}

/// Read and extract a file from disk.
pub fn read_file(path: &Path) -> Result<ExtractedFile, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let doc_type = path
        .extension()
        .and_then(|e| e.to_str())
        .map(DocumentType::from_extension)
        .unwrap_or_default();

    Ok(ExtractedFile {
        text: extract_text(&bytes, doc_type)?,
        doc_type,
    })
}
