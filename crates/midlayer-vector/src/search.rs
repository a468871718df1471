use anyhow::{anyhow, Result};
use arrow_array::{Float32Array, Int64Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use midlayer_core::traits::{Embedder, VectorIndex};
use midlayer_core::types::{Chunk, Meta, SearchHit};

use crate::table::open_db;

/// Nearest-neighbor search over the chunk table.
///
/// The embedder gate serializes query embedding: providers that cannot run
/// concurrent inference are called one request at a time even when many
/// query variants fan out in parallel. The LanceDB read path has no such
/// constraint.
pub struct LanceVectorIndex {
    db: Connection,
    table_name: String,
    embedder: Arc<dyn Embedder>,
    embed_gate: tokio::sync::Mutex<()>,
}

impl LanceVectorIndex {
    pub async fn new(db_path: &Path, table_name: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let db = open_db(db_path.to_string_lossy().as_ref()).await?;
        Ok(Self { db, table_name: table_name.to_string(), embedder, embed_gate: tokio::sync::Mutex::new(()) })
    }

    pub async fn search_text(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        assert!(top_k >= 1, "top_k must be at least 1");
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let names = self.db.table_names().execute().await?;
        if !names.contains(&self.table_name) {
            warn!(table = %self.table_name, "vector table missing, returning no hits");
            return Ok(Vec::new());
        }

        let query_vec = {
            let _serialized = self.embed_gate.lock().await;
            self.embedder
                .embed_batch(&[query.to_string()])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("embedder returned no vector for query"))?
        };

        let table = self.db.open_table(&self.table_name).execute().await?;
        let mut stream = table
            .vector_search(query_vec)?
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await?;

        let mut hits = Vec::new();
        while let Some(batch) = TryStreamExt::try_next(&mut stream).await? {
            for i in 0..batch.num_rows() {
                let similarity = distance_col(&batch)?.map_or(0.5, |col| 1.0 - col.value(i));
                hits.push((self.chunk_from_batch(&batch, i)?, similarity));
            }
        }
        // lancedb streams in distance order already; keep it explicit
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, (chunk, similarity))| SearchHit { chunk, rank: i + 1, raw_score: similarity })
            .collect())
    }

    fn chunk_from_batch(&self, batch: &RecordBatch, row: usize) -> Result<Chunk> {
        let metadata: Meta =
            serde_json::from_str(string_col(batch, "metadata")?.value(row)).unwrap_or_default();
        Ok(Chunk {
            id: string_col(batch, "id")?.value(row).to_string(),
            doc_id: string_col(batch, "doc_id")?.value(row).to_string(),
            content: string_col(batch, "content")?.value(row).to_string(),
            start_offset: int_col(batch, "start_offset")?.value(row) as usize,
            end_offset: int_col(batch, "end_offset")?.value(row) as usize,
            metadata,
        })
    }
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("column '{}' missing or not Utf8", name))
}

fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow!("column '{}' missing or not Int64", name))
}

fn distance_col(batch: &RecordBatch) -> Result<Option<&Float32Array>> {
    let Some(col) = batch.column_by_name("_distance") else {
        return Ok(None);
    };
    col.as_any()
        .downcast_ref::<Float32Array>()
        .map(Some)
        .ok_or_else(|| anyhow!("_distance column is not Float32"))
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        self.search_text(query, top_k).await
    }
}
