//! End-to-end flow over the bundled engines: ingest into Tantivy and
//! LanceDB, then search through the full pipeline with a deterministic
//! embedder.

use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;

use midlayer_core::config::RetrievalConfig;
use midlayer_core::traits::Embedder;
use midlayer_core::types::{Chunk, RetrievalProvenance};
use midlayer_hybrid::rerank::TermDensityReranker;
use midlayer_hybrid::HybridEngine;

/// Deterministic bag-of-hashed-words embedder; cosine similarity tracks
/// word overlap, which is all these tests need.
struct HashEmbedder {
    dim: usize,
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let mut v = vec![0f32; self.dim];
            for token in text.to_lowercase().split_whitespace() {
                let mut hasher = XxHash64::with_seed(0);
                token.hash(&mut hasher);
                v[(hasher.finish() as usize) % self.dim] += 1.0;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
            for x in &mut v {
                *x /= norm;
            }
            out.push(v);
        }
        Ok(out)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn corpus() -> Vec<Chunk> {
    vec![
        Chunk::new("firecraft", "Start a fire with a ferro rod: scrape sparks into dry tinder until it catches.", 0, 78)
            .with_metadata("file_name", "firecraft.txt"),
        Chunk::new("water", "Purify stream water by boiling it for one full minute before drinking.", 0, 70)
            .with_metadata("file_name", "water.txt"),
        Chunk::new("shelter", "Build a lean-to shelter against the wind and line it with evergreen boughs.", 0, 75)
            .with_metadata("file_name", "shelter.txt"),
        Chunk::new("knots", "The bowline knot makes a fixed loop that will not slip under load.", 0, 66)
            .with_metadata("file_name", "knots.txt"),
    ]
}

async fn open_engine(tmp: &TempDir, config: RetrievalConfig) -> HybridEngine {
    init_tracing();
    let embedder = Arc::new(HashEmbedder { dim: 64 });
    let engine = HybridEngine::open(
        &tmp.path().join("keyword"),
        &tmp.path().join("vector"),
        "chunks",
        embedder,
        config,
    )
    .await
    .expect("open engine");
    engine.index_chunks(&corpus()).await.expect("ingest");
    engine
}

#[tokio::test]
async fn hybrid_search_finds_the_relevant_chunk() {
    let tmp = TempDir::new().expect("tmp");
    let mut config = RetrievalConfig::default();
    config.strong_signal.enabled = false;
    let engine = open_engine(&tmp, config).await;

    let outcome = engine.search("ferro rod tinder", 3).await.expect("search");
    assert_eq!(outcome.provenance, RetrievalProvenance::Fused);
    assert!(!outcome.results.is_empty());
    assert_eq!(outcome.results[0].chunk.doc_id, "firecraft");
    for pair in outcome.results.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }
}

#[tokio::test]
async fn reranked_search_still_surfaces_the_right_chunk_first() {
    let tmp = TempDir::new().expect("tmp");
    let mut config = RetrievalConfig::default();
    config.strong_signal.enabled = false;
    let engine = open_engine(&tmp, config).await.with_reranker(Arc::new(TermDensityReranker));

    let outcome = engine.search("bowline knot loop", 3).await.expect("search");
    assert_eq!(outcome.results[0].chunk.doc_id, "knots");
    assert!(outcome.results[0].rerank_score.is_some());
}

#[tokio::test]
async fn removed_document_stops_surfacing() {
    let tmp = TempDir::new().expect("tmp");
    let mut config = RetrievalConfig::default();
    config.strong_signal.enabled = false;
    let engine = open_engine(&tmp, config).await;

    engine.remove_document("knots").await.expect("remove");
    let outcome = engine.search("bowline knot loop", 4).await.expect("search");
    assert!(outcome.results.iter().all(|r| r.chunk.doc_id != "knots"));
}

#[tokio::test]
async fn query_matching_nothing_returns_empty() {
    let tmp = TempDir::new().expect("tmp");
    let mut config = RetrievalConfig::default();
    config.strong_signal.enabled = false;
    let engine = open_engine(&tmp, config).await;

    let outcome = engine.search("zzzz qqqq xxxx", 3).await.expect("search");
    // keyword finds nothing; the vector engine may still return weak
    // neighbors, so only the keyword-empty invariant is hard
    assert!(outcome.results.iter().all(|r| r.final_score <= 1.0));
}
