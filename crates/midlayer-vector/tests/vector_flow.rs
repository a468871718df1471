use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use midlayer_core::traits::Embedder;
use midlayer_core::types::Chunk;
use midlayer_vector::{LanceVectorIndex, LanceVectorWriter};

/// Deterministic bag-of-hashed-words embedder. Texts sharing words land on
/// shared dimensions, so cosine similarity tracks word overlap.
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
                let h = hasher.finish();
                v[(h as usize) % self.dim] += 1.0;
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

fn fixture_chunks() -> Vec<Chunk> {
    vec![
        Chunk::new("firecraft", "starting a fire with flint and dry tinder", 0, 41)
            .with_metadata("file_name", "firecraft.txt"),
        Chunk::new("water", "boil stream water before drinking it", 0, 36),
        Chunk::new("knots", "tie a bowline knot to secure a rope loop", 0, 40),
    ]
}

async fn ingest(db_path: &PathBuf, table: &str) -> Arc<HashEmbedder> {
    let embedder = Arc::new(HashEmbedder { dim: 64 });
    let writer = LanceVectorWriter::new(db_path, table, embedder.clone())
        .await
        .expect("writer");
    writer.index_chunks(&fixture_chunks()).await.expect("ingest");
    embedder
}

#[tokio::test]
async fn index_then_search_ranks_overlapping_text_first() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().to_path_buf();
    let embedder = ingest(&db_path, "chunks").await;

    let index = LanceVectorIndex::new(&db_path, "chunks", embedder).await.expect("index");
    let hits = index.search_text("fire flint tinder", 3).await.expect("search");

    assert!(!hits.is_empty());
    assert_eq!(hits[0].chunk.doc_id, "firecraft");
    for (i, hit) in hits.iter().enumerate() {
        assert_eq!(hit.rank, i + 1);
    }
    for pair in hits.windows(2) {
        assert!(pair[0].raw_score >= pair[1].raw_score);
    }
    assert_eq!(
        hits[0].chunk.metadata.get("file_name").map(String::as_str),
        Some("firecraft.txt"),
        "metadata survives the arrow round-trip"
    );
    assert_eq!(hits[0].chunk.start_offset, 0);
    assert_eq!(hits[0].chunk.end_offset, 41);
}

#[tokio::test]
async fn search_before_any_ingest_is_empty_not_an_error() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().to_path_buf();
    let embedder = Arc::new(HashEmbedder { dim: 64 });

    let index = LanceVectorIndex::new(&db_path, "chunks", embedder).await.expect("index");
    let hits = index.search_text("anything", 5).await.expect("search");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn reingest_same_ids_does_not_duplicate_rows() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().to_path_buf();
    let embedder = ingest(&db_path, "chunks").await;

    // same chunk ids again: merge-insert must replace, not append
    let writer = LanceVectorWriter::new(&db_path, "chunks", embedder.clone()).await.expect("writer");
    writer.index_chunks(&fixture_chunks()).await.expect("re-ingest");

    let index = LanceVectorIndex::new(&db_path, "chunks", embedder).await.expect("index");
    let hits = index.search_text("fire flint tinder", 10).await.expect("search");
    let firecraft_rows = hits.iter().filter(|h| h.chunk.doc_id == "firecraft").count();
    assert_eq!(firecraft_rows, 1);
}

#[tokio::test]
async fn remove_document_retires_its_rows() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().to_path_buf();
    let embedder = ingest(&db_path, "chunks").await;

    let writer = LanceVectorWriter::new(&db_path, "chunks", embedder.clone()).await.expect("writer");
    writer.remove_document("firecraft").await.expect("remove");

    let index = LanceVectorIndex::new(&db_path, "chunks", embedder).await.expect("index");
    let hits = index.search_text("fire flint tinder", 10).await.expect("search");
    assert!(hits.iter().all(|h| h.chunk.doc_id != "firecraft"));
}
