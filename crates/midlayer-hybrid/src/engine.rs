//! Convenience wiring of the bundled Tantivy and LanceDB engines behind
//! the pipeline. Chunks arrive ready-made from the ingestion service and
//! are written to both indexes; queries run through [`HybridPipeline`].

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use midlayer_core::config::RetrievalConfig;
use midlayer_core::traits::{Embedder, KeywordIndex, QueryExpander, Reranker};
use midlayer_core::types::{Chunk, RetrievalOutcome};
use midlayer_text::TantivyKeywordIndex;
use midlayer_vector::{LanceVectorIndex, LanceVectorWriter};

use crate::pipeline::HybridPipeline;

pub struct HybridEngine {
    keyword: Arc<TantivyKeywordIndex>,
    vector_writer: LanceVectorWriter,
    pipeline: HybridPipeline,
}

impl HybridEngine {
    pub async fn open(
        keyword_dir: &Path,
        vector_db: &Path,
        table_name: &str,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        let keyword = Arc::new(TantivyKeywordIndex::open_or_create(keyword_dir)?);
        let vector_index =
            Arc::new(LanceVectorIndex::new(vector_db, table_name, Arc::clone(&embedder)).await?);
        let vector_writer = LanceVectorWriter::new(vector_db, table_name, embedder).await?;
        let keyword_handle: Arc<dyn KeywordIndex> = keyword.clone();
        let pipeline = HybridPipeline::new(keyword_handle, vector_index, config)?;
        Ok(Self { keyword, vector_writer, pipeline })
    }

    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.pipeline = self.pipeline.with_expander(expander);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.pipeline = self.pipeline.with_reranker(reranker);
        self
    }

    /// Write chunks into both indexes. Either index may be queried while
    /// this runs; readers observe the pre- or post-ingest state, never a
    /// torn one.
    pub async fn index_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        self.vector_writer.index_chunks(chunks).await?;
        self.keyword.index_chunks(chunks)
    }

    /// Retire a document from both indexes, ahead of re-ingesting its
    /// freshly chunked replacement.
    pub async fn remove_document(&self, doc_id: &str) -> Result<()> {
        self.vector_writer.remove_document(doc_id).await?;
        self.keyword.remove_document(doc_id)
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<RetrievalOutcome> {
        Ok(self.pipeline.search(query, top_k).await?)
    }
}
