//! Core types for Mnemo

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Unique identifier for a memory record
pub type MemoryId = i64;

/// Unique identifier for a vector record
pub type VectorId = i64;

/// Importance bounds for memory records
pub const MIN_IMPORTANCE: i32 = 1;
pub const MAX_IMPORTANCE: i32 = 10;

/// Clamp an importance value into the valid [1, 10] range
pub fn clamp_importance(importance: i32) -> i32 {
    importance.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE)
}

/// Compute the content natural key: SHA256 of the trimmed content.
///
/// `(user_id, content_key)` identifies the same fact across the memory
/// store and the vector store, and is the duplicate-detection key.
pub fn content_key(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.trim().as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// A stored fact, scoped to one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier (monotonic, storage-assigned)
    pub id: MemoryId,
    /// Owner; every query is scoped to exactly one user
    pub user_id: String,
    /// Free text, non-empty, may contain mixed scripts
    pub content: String,
    /// Semantic category
    #[serde(default)]
    pub category: Category,
    /// Free-text labels, deduplicated
    #[serde(default)]
    pub tags: Vec<String>,
    /// Where the fact came from
    #[serde(default)]
    pub source: MemorySource,
    /// Ranking tiebreaker and retention priority, 1-10
    #[serde(default = "default_importance")]
    pub importance: i32,
    /// Back-reference to the originating conversation, if any
    pub conversation_id: Option<String>,
    /// Freeform provenance note
    pub extracted_from: Option<String>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last updated (always >= created_at)
    pub updated_at: DateTime<Utc>,
}

fn default_importance() -> i32 {
    5
}

/// Semantic category of a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Identity,
    Device,
    Work,
    Interests,
    Relationships,
    Lifestyle,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Identity => "identity",
            Category::Device => "device",
            Category::Work => "work",
            Category::Interests => "interests",
            Category::Relationships => "relationships",
            Category::Lifestyle => "lifestyle",
            Category::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "identity" => Ok(Category::Identity),
            "device" => Ok(Category::Device),
            "work" => Ok(Category::Work),
            "interests" => Ok(Category::Interests),
            "relationships" => Ok(Category::Relationships),
            "lifestyle" => Ok(Category::Lifestyle),
            "other" => Ok(Category::Other),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Provenance of a memory record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    /// Extracted from a chat conversation
    #[default]
    Conversation,
    /// Extracted from an uploaded document
    Document,
    /// Entered by hand
    Manual,
}

impl MemorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::Conversation => "conversation",
            MemorySource::Document => "document",
            MemorySource::Manual => "manual",
        }
    }
}

impl std::str::FromStr for MemorySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conversation" => Ok(MemorySource::Conversation),
            "document" => Ok(MemorySource::Document),
            "manual" => Ok(MemorySource::Manual),
            _ => Err(format!("Unknown memory source: {}", s)),
        }
    }
}

/// Input for creating a new memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMemoryInput {
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: MemorySource,
    #[serde(default = "default_importance")]
    pub importance: i32,
    pub conversation_id: Option<String>,
    pub extracted_from: Option<String>,
}

impl CreateMemoryInput {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            content: content.into(),
            category: Category::default(),
            tags: Vec::new(),
            source: MemorySource::default(),
            importance: default_importance(),
            conversation_id: None,
            extracted_from: None,
        }
    }
}

/// A memory's semantic counterpart, independently lived.
///
/// Carries its own content copy: the vector store and the memory store
/// are not transactionally coupled, and a vector record may outlive the
/// memory record it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: VectorId,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub category: Category,
    /// Tags/importance/source carried as an opaque blob
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Fixed-length embedding; dimension must match the active model
    #[serde(skip_serializing, default)]
    pub embedding: Vec<f32>,
    /// Precomputed Euclidean norm of the embedding
    pub norm: f32,
    pub created_at: DateTime<Utc>,
}

/// Which retrieval pipeline to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Lexical substring matching only
    Keyword,
    /// Embedding similarity only
    Vector,
    /// Both paths, fused
    #[default]
    Hybrid,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keyword" => Ok(SearchMode::Keyword),
            "vector" => Ok(SearchMode::Vector),
            "hybrid" => Ok(SearchMode::Hybrid),
            _ => Err(format!("Unknown search mode: {}", s)),
        }
    }
}

/// A candidate produced by the lexical path
#[derive(Debug, Clone, Serialize)]
pub struct KeywordHit {
    pub memory: MemoryRecord,
    /// Final relevance score
    pub score: f32,
    /// Importance-derived lexical score (the path has no continuous signal)
    pub keyword_score: f32,
    /// Keywords that actually matched content or tags
    pub matched_keywords: Vec<String>,
}

/// A candidate produced by the semantic path
#[derive(Debug, Clone, Serialize)]
pub struct VectorHit {
    pub record: VectorRecord,
    /// Final relevance score
    pub score: f32,
    /// Raw cosine similarity against the query embedding
    pub similarity: f32,
}

/// A candidate found by both paths and fused
#[derive(Debug, Clone, Serialize)]
pub struct HybridHit {
    pub memory: MemoryRecord,
    /// Weighted sum of the two sub-scores
    pub score: f32,
    pub keyword_score: f32,
    pub similarity: f32,
    pub matched_keywords: Vec<String>,
}

/// A single ranked search result with provenance.
///
/// Tagged by the pipeline that produced it so fusion logic stays
/// exhaustive; `Hybrid` only appears for candidates matched by both paths.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "search_type", rename_all = "lowercase")]
pub enum SearchResult {
    Keyword(KeywordHit),
    Vector(VectorHit),
    Hybrid(HybridHit),
}

impl SearchResult {
    /// Final relevance score
    pub fn score(&self) -> f32 {
        match self {
            SearchResult::Keyword(hit) => hit.score,
            SearchResult::Vector(hit) => hit.score,
            SearchResult::Hybrid(hit) => hit.score,
        }
    }

    /// Content of the matched record
    pub fn content(&self) -> &str {
        match self {
            SearchResult::Keyword(hit) => &hit.memory.content,
            SearchResult::Vector(hit) => &hit.record.content,
            SearchResult::Hybrid(hit) => &hit.memory.content,
        }
    }

    /// Creation timestamp, used as the ranking tiebreaker
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            SearchResult::Keyword(hit) => hit.memory.created_at,
            SearchResult::Vector(hit) => hit.record.created_at,
            SearchResult::Hybrid(hit) => hit.memory.created_at,
        }
    }

    /// Name of the pipeline that produced this result
    pub fn search_type(&self) -> &'static str {
        match self {
            SearchResult::Keyword(_) => "keyword",
            SearchResult::Vector(_) => "vector",
            SearchResult::Hybrid(_) => "hybrid",
        }
    }

    /// Natural key of the matched content, for identity across paths
    pub fn content_key(&self) -> String {
        content_key(self.content())
    }
}

/// Statistics for a user's lexical memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: i64,
    pub by_category: HashMap<String, i64>,
}

/// Statistics for a user's vector records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreStats {
    /// Total records stored for the user
    pub total: i64,
    /// Records carrying an embedding of the expected dimension
    pub vectorized: i64,
    /// Records excluded from similarity scans due to a stale dimension
    pub dimension_mismatches: i64,
    /// Average embedding dimension across records
    pub avg_dimension: f64,
    pub categories: HashMap<String, i64>,
}

/// Storage engine configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// SQLite database path, or ":memory:"
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
        }
    }
}

/// Embedding backend configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Backend name: "openai" (OpenAI-compatible HTTP API) or "chargram" (local)
    pub backend: String,
    /// API key for HTTP backends
    pub api_key: Option<String>,
    /// API base URL override
    pub base_url: Option<String>,
    /// Model name override
    pub model: Option<String>,
    /// Expected embedding dimension
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "chargram".to_string(),
            api_key: None,
            base_url: None,
            model: None,
            dimensions: 1536,
        }
    }
}
