use anyhow::Result;
use arrow_array::{FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use midlayer_core::traits::Embedder;
use midlayer_core::types::Chunk;

use crate::schema::build_chunk_schema;
use crate::table::{ensure_table, open_db, set_meta};

const INSERT_BATCH_SIZE: usize = 1000;
const EMBED_BATCH_SIZE: usize = 64;

/// Writes chunk rows (text + embedding) into a LanceDB table.
///
/// Rows are keyed by chunk id and upserted via merge-insert, so re-ingesting
/// the same chunk identity replaces rather than duplicates. Changed content
/// arrives under a fresh id; retire the old rows with [`remove_document`]
/// first.
///
/// [`remove_document`]: LanceVectorWriter::remove_document
pub struct LanceVectorWriter {
    db: Connection,
    table_name: String,
    embedder: Arc<dyn Embedder>,
    dim: i32,
}

impl LanceVectorWriter {
    pub async fn new(db_path: &Path, table_name: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let db = open_db(db_path.to_string_lossy().as_ref()).await?;
        let dim = i32::try_from(embedder.dim())?;
        Ok(Self { db, table_name: table_name.to_string(), embedder, dim })
    }

    /// Embed and store chunks. Embedding runs in bounded sequential batches;
    /// the provider is never invoked concurrently from here.
    pub async fn index_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            embeddings.extend(self.embedder.embed_batch(&texts).await?);
        }
        self.index_with_embeddings(chunks, &embeddings).await
    }

    /// Store chunks whose embeddings were computed elsewhere.
    pub async fn index_with_embeddings(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        assert_eq!(chunks.len(), embeddings.len(), "chunks and embeddings length must match");
        for e in embeddings {
            assert_eq!(e.len(), self.embedder.dim(), "embedding width must match the provider dim");
        }
        ensure_table(&self.db, &self.table_name, build_chunk_schema(self.dim)).await?;

        for (chunk_rows, embedding_rows) in
            chunks.chunks(INSERT_BATCH_SIZE).zip(embeddings.chunks(INSERT_BATCH_SIZE))
        {
            self.upsert_batch(chunk_rows, embedding_rows).await?;
            debug!(rows = chunk_rows.len(), table = %self.table_name, "upserted chunk batch");
        }
        set_meta(&self.db, &format!("last_ingest_at:{}", self.table_name), &chrono::Utc::now().to_rfc3339())
            .await?;
        info!(chunks = chunks.len(), table = %self.table_name, "vector ingest complete");
        Ok(())
    }

    /// Retire every row belonging to a document.
    pub async fn remove_document(&self, doc_id: &str) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if !names.contains(&self.table_name) {
            return Ok(());
        }
        let table = self.db.open_table(&self.table_name).execute().await?;
        table.delete(&format!("doc_id = '{}'", doc_id.replace('\'', "''"))).await?;
        Ok(())
    }

    async fn upsert_batch(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        let record_batch = self.rows_to_record_batch(chunks, embeddings)?;
        let schema = record_batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
        let table = self.db.open_table(&self.table_name).execute().await?;
        let mut mi = table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        let _ = mi.execute(reader).await?;
        Ok(())
    }

    fn rows_to_record_batch(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
        let schema = build_chunk_schema(self.dim);
        let mut ids = Vec::new();
        let mut doc_ids = Vec::new();
        let mut contents = Vec::new();
        let mut starts = Vec::new();
        let mut ends = Vec::new();
        let mut metadatas = Vec::new();
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            ids.push(chunk.id.clone());
            doc_ids.push(chunk.doc_id.clone());
            contents.push(chunk.content.clone());
            starts.push(chunk.start_offset as i64);
            ends.push(chunk.end_offset as i64);
            metadatas.push(serde_json::to_string(&chunk.metadata)?);
            vectors.push(Some(embedding.iter().map(|&x| Some(x)).collect()));
        }
        let record_batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(doc_ids)),
                Arc::new(StringArray::from(contents)),
                Arc::new(Int64Array::from(starts)),
                Arc::new(Int64Array::from(ends)),
                Arc::new(StringArray::from(metadatas)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
                    vectors.into_iter(),
                    self.dim,
                )),
            ],
        )?;
        Ok(record_batch)
    }
}
