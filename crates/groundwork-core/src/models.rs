//! Core data models.
//!
//! These types represent the documents, chunks, search results, and
//! answers that flow through the ingestion and retrieval pipeline. They
//! are plain data: no framework types cross this boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::RagError;

/// Closed set of document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[default]
    #[serde(rename = "text")]
    PlainText,
    Pdf,
    #[serde(rename = "web")]
    WebPage,
    Faq,
    KnowledgeBase,
    #[serde(rename = "company")]
    CompanyDocument,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        DocumentType::PlainText,
        DocumentType::Pdf,
        DocumentType::WebPage,
        DocumentType::Faq,
        DocumentType::KnowledgeBase,
        DocumentType::CompanyDocument,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::PlainText => "text",
            DocumentType::Pdf => "pdf",
            DocumentType::WebPage => "web",
            DocumentType::Faq => "faq",
            DocumentType::KnowledgeBase => "knowledge_base",
            DocumentType::CompanyDocument => "company",
        }
    }

    /// Guess a document type from a file extension (case-insensitive).
    ///
    /// Unknown extensions map to [`DocumentType::PlainText`].
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => DocumentType::Pdf,
            "html" | "htm" => DocumentType::WebPage,
            _ => DocumentType::PlainText,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                RagError::InvalidDocument(format!(
                    "unknown document type '{}': expected one of text, pdf, web, faq, knowledge_base, company",
                    s
                ))
            })
    }
}

/// Filter dimensions attached to a document. Never used for access control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTags {
    /// Owning agent id.
    pub agent_id: Option<String>,
    /// Industry / domain tag.
    pub industry: Option<String>,
}

/// A stored document.
///
/// Content is immutable once chunked; an update is a delete followed by
/// a re-insert under the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub doc_type: DocumentType,
    /// Where the document came from (file path, URL, connector name).
    pub source: String,
    pub tags: DocumentTags,
    /// Pass-through fields the core never inspects.
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for ingestion. The id is generated when absent.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub id: Option<String>,
    pub title: String,
    pub content: String,
    pub doc_type: DocumentType,
    pub source: String,
    pub tags: DocumentTags,
    pub metadata: BTreeMap<String, String>,
}

impl NewDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            source: "manual".to_string(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, doc_type: DocumentType) -> Self {
        self.doc_type = doc_type;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.tags.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.tags.industry = Some(industry.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Stamp the document with an id (UUID v4 when none was given) and a
    /// creation time.
    pub fn into_document(self) -> Document {
        Document {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            title: self.title,
            content: self.content,
            doc_type: self.doc_type,
            source: self.source,
            tags: self.tags,
            metadata: self.metadata,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Parent-document fields copied onto each chunk so the store can filter
/// without a document join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub agent_id: Option<String>,
    pub industry: Option<String>,
    pub doc_type: DocumentType,
    pub source: String,
    pub title: String,
}

impl From<&Document> for ChunkMetadata {
    fn from(doc: &Document) -> Self {
        Self {
            agent_id: doc.tags.agent_id.clone(),
            industry: doc.tags.industry.clone(),
            doc_type: doc.doc_type,
            source: doc.source.clone(),
            title: doc.title.clone(),
        }
    }
}

/// Namespace for deterministic chunk ids.
const CHUNK_ID_NAMESPACE: Uuid = Uuid::NAMESPACE_URL;

/// A retrievable unit of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// UUID v5 of `(document_id, position)`.
    pub id: String,
    pub document_id: String,
    /// Trimmed, non-empty text.
    pub content: String,
    /// Zero-based emission index within the document.
    pub position: usize,
    /// Absent until the embedding step succeeds.
    pub embedding: Option<Vec<f32>>,
    /// SHA-256 of `content`, hex encoded.
    pub hash: String,
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    /// Build a chunk for `document` at `position`. No vector is attached.
    pub fn new(document: &Document, position: usize, content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());

        Self {
            id: chunk_id(&document.id, position),
            document_id: document.id.clone(),
            content: content.to_string(),
            position,
            embedding: None,
            hash: format!("{:x}", hasher.finalize()),
            metadata: ChunkMetadata::from(document),
        }
    }

    pub fn with_embedding(mut self, vector: Vec<f32>) -> Self {
        self.embedding = Some(vector);
        self
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Deterministic chunk id for a document position.
pub fn chunk_id(document_id: &str, position: usize) -> String {
    let name = format!("{}:{}", document_id, position);
    Uuid::new_v5(&CHUNK_ID_NAMESPACE, name.as_bytes()).to_string()
}

/// Restricts which chunks are eligible in a search.
///
/// Every populated field must match the chunk's inherited metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub agent_id: Option<String>,
    pub industry: Option<String>,
    pub doc_type: Option<DocumentType>,
}

impl SearchFilter {
    /// Filter on owning agent only; `None` matches every chunk.
    pub fn for_agent(agent_id: Option<&str>) -> Self {
        Self {
            agent_id: agent_id.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.agent_id.is_none() && self.industry.is_none() && self.doc_type.is_none()
    }

    pub fn matches(&self, meta: &ChunkMetadata) -> bool {
        if let Some(agent) = &self.agent_id {
            if meta.agent_id.as_deref() != Some(agent.as_str()) {
                return false;
            }
        }
        if let Some(industry) = &self.industry {
            if meta.industry.as_deref() != Some(industry.as_str()) {
                return false;
            }
        }
        if let Some(doc_type) = self.doc_type {
            if meta.doc_type != doc_type {
                return false;
            }
        }
        true
    }
}

/// A scored chunk with its parent document. Produced per search call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub document: Document,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Citation attached to an [`Answer`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCitation {
    pub title: String,
    pub source: String,
    pub score: f32,
    pub preview: String,
}

/// A grounded answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer_text: String,
    pub sources: Vec<SourceCitation>,
    /// Heuristic, not a calibrated probability. See
    /// [`confidence_from_scores`](crate::answer::confidence_from_scores).
    pub confidence: f32,
    /// Set when a provider failure forced the fallback text.
    pub degraded: bool,
}
