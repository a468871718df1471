//! Capability contracts between the hybrid engine and its collaborators.
//!
//! Index handles are externally owned and injected per call site; the engine
//! holds no process-wide state. Implementations are swappable without
//! touching fusion or blending.

use async_trait::async_trait;

use crate::types::{ExpandedQuery, SearchHit};

/// Converts text into fixed-dimension vectors. Opaque capability: model
/// loading, pooling, and quantization are the implementation's business.
///
/// Providers that cannot run concurrent inference are protected by their
/// callers: vector indexes serialize query embedding behind a gate rather
/// than invoking one instance from several tasks at once.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Exact-match / BM25-style search over indexed chunks.
///
/// Results come back sorted by the index's own relevance, most relevant
/// first, with `raw_score` normalized to [0, 1]. No matches is an empty
/// list, never an error.
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// Nearest-neighbor search over chunk embeddings.
///
/// Same result contract as [`KeywordIndex`]: sorted, most relevant first,
/// empty list when nothing is close enough.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// Scores a bounded set of candidate texts against a query.
///
/// Returns one score in [0, 1] per candidate, aligned with the input order;
/// higher is more relevant. Must be deterministic for identical
/// (query, text) pairs under a fixed model. Callers bound the candidate set
/// and treat failure as non-fatal.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: &[String]) -> anyhow::Result<Vec<f32>>;
}

/// Produces query variants: keyword phrasings, semantic phrasings, and an
/// optional hypothetical answer passage.
///
/// Expansion is best-effort. Implementations parse model output defensively
/// and degrade to [`ExpandedQuery::unexpanded`] rather than failing; callers
/// additionally treat any `Err` as "no expansion".
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str) -> anyhow::Result<ExpandedQuery>;
}
