//! Domain types shared by the keyword, vector, and hybrid engines.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub type ChunkId = String;
pub type Meta = HashMap<String, String>;

/// A chunk of a source document that is independently indexed.
///
/// - `id`: globally unique chunk identifier, content-addressed
/// - `doc_id`: stable document identity (file stem or external id)
/// - `content`: the text payload of the chunk
/// - `start_offset`/`end_offset`: character positions in the source document
/// - `metadata`: free-form string pairs (source file name, content type, ...)
///
/// Chunks are immutable. When a source document changes, its old chunks are
/// retired and new ones created with fresh ids; `derive_id` folds the content
/// into the id so a re-ingest of changed text never reuses an old identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(default)]
    pub metadata: Meta,
}

impl Chunk {
    pub fn new(doc_id: impl Into<String>, content: impl Into<String>, start_offset: usize, end_offset: usize) -> Self {
        let doc_id = doc_id.into();
        let content = content.into();
        let id = Self::derive_id(&doc_id, start_offset, &content);
        Self { id, doc_id, content, start_offset, end_offset, metadata: Meta::new() }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Content-addressed chunk id: `<doc_id>:<start>:<fingerprint>`.
    pub fn derive_id(doc_id: &str, start_offset: usize, content: &str) -> ChunkId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(doc_id.as_bytes());
        hasher.update(&start_offset.to_le_bytes());
        hasher.update(content.as_bytes());
        let digest = hasher.finalize().to_hex();
        format!("{}:{}:{}", doc_id, start_offset, &digest.as_str()[..16])
    }
}

/// Indicates which engine produced a result list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    Keyword,
    Vector,
}

/// Whether a result list came from the user's own query or from a
/// machine-generated variant of it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryOrigin {
    Original,
    Expanded,
}

/// One result from a single index, for a single query variant.
///
/// `rank` is the 1-based position within that index's result list.
/// `raw_score` is index-specific and never comparable across index kinds:
/// the keyword engine reports its own normalized relevance in [0, 1], the
/// vector engine reports cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub rank: usize,
    pub raw_score: f32,
}

/// Which (engine, query variant) pair contributed a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceTag {
    pub source: SourceKind,
    pub origin: QueryOrigin,
    pub variant: String,
}

/// A chunk after rank fusion, aggregated over every list it appeared in.
///
/// One candidate per unique chunk id per fusion run. `best_original_rank`
/// is the best (lowest) rank the chunk achieved in any original-query list;
/// absent if it only surfaced through expansion variants.
#[derive(Debug, Clone)]
pub struct FusionCandidate {
    pub chunk: Chunk,
    pub fused_score: f32,
    pub sources: BTreeSet<SourceTag>,
    pub best_original_rank: Option<usize>,
}

/// The pipeline's output record.
///
/// `retrieval_rank` is the 1-based position in the fused (pre-rerank)
/// ordering and is never recomputed after reranking shuffles the list.
/// `rerank_score` is absent when reranking was skipped or failed for this
/// candidate, in which case `final_score` equals the normalized fused score.
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub chunk: Chunk,
    pub retrieval_rank: usize,
    pub fused_score: f32,
    pub rerank_score: Option<f32>,
    pub final_score: f32,
}

/// How the returned ranking was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RetrievalProvenance {
    /// Full pipeline: fan-out, rank fusion, optional rerank + blend.
    Fused,
    /// The keyword engine's top hit was decisive; expansion, vector search,
    /// and reranking were skipped and the raw keyword list returned as-is.
    StrongSignalKeyword,
}

#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub results: Vec<RankedResult>,
    pub provenance: RetrievalProvenance,
}

/// Query variants produced by an expander.
///
/// `lex_variants` are keyword-search phrasings, `vec_variants` are semantic
/// phrasings, `hyde` is an optional hypothetical answer passage whose
/// embedding serves as an extra vector-search probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpandedQuery {
    pub original: String,
    #[serde(default)]
    pub lex_variants: Vec<String>,
    #[serde(default)]
    pub vec_variants: Vec<String>,
    #[serde(default)]
    pub hyde: Option<String>,
}

impl ExpandedQuery {
    /// An expansion that adds nothing: the original query only.
    pub fn unexpanded(original: impl Into<String>) -> Self {
        Self { original: original.into(), ..Self::default() }
    }

    pub fn keyword_queries(&self) -> Vec<&str> {
        let mut queries = vec![self.original.as_str()];
        queries.extend(self.lex_variants.iter().map(String::as_str));
        queries
    }

    pub fn vector_queries(&self) -> Vec<&str> {
        let mut queries = vec![self.original.as_str()];
        queries.extend(self.vec_variants.iter().map(String::as_str));
        if let Some(hyde) = &self.hyde {
            queries.push(hyde.as_str());
        }
        queries
    }
}
