use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::{QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, TantivyDocument, Term};
use tracing::warn;

use midlayer_core::traits::KeywordIndex;
use midlayer_core::types::{Chunk, Meta, SearchHit};

use crate::tantivy_utils::{build_schema, register_tokenizer, sanitize_query};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// BM25 keyword index over document chunks.
///
/// Raw BM25 scores are unbounded, so hits leave this index squashed to
/// [0, 1) via `s / (1 + s)`. The mapping is monotonic: ordering is exactly
/// tantivy's BM25 ordering, only the scale changes.
pub struct TantivyKeywordIndex {
    index: Index,
    reader: IndexReader,
    id_field: tantivy::schema::Field,
    doc_id_field: tantivy::schema::Field,
    content_field: tantivy::schema::Field,
    start_field: tantivy::schema::Field,
    end_field: tantivy::schema::Field,
    metadata_field: tantivy::schema::Field,
}

impl TantivyKeywordIndex {
    /// Open an existing index directory, or create a fresh one.
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir)?
        } else {
            std::fs::create_dir_all(index_dir)?;
            Index::create_in_dir(index_dir, build_schema())?
        };
        register_tokenizer(&index);
        let reader = index.reader()?;
        let schema = index.schema();
        let id_field = schema.get_field("id")?;
        let doc_id_field = schema.get_field("doc_id")?;
        let content_field = schema.get_field("content")?;
        let start_field = schema.get_field("start_offset")?;
        let end_field = schema.get_field("end_offset")?;
        let metadata_field = schema.get_field("metadata")?;
        Ok(Self { index, reader, id_field, doc_id_field, content_field, start_field, end_field, metadata_field })
    }

    /// Add chunks to the index. Re-ingesting a chunk id replaces the old
    /// posting, so ingest is idempotent per chunk identity.
    pub fn index_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut index_writer = self.index.writer(WRITER_HEAP_BYTES)?;
        for c in chunks {
            index_writer.delete_term(Term::from_field_text(self.id_field, &c.id));
            let metadata_json = serde_json::to_string(&c.metadata)?;
            let doc = doc!(
                self.id_field => c.id.clone(),
                self.doc_id_field => c.doc_id.clone(),
                self.content_field => c.content.clone(),
                self.start_field => c.start_offset as u64,
                self.end_field => c.end_offset as u64,
                self.metadata_field => metadata_json,
            );
            index_writer.add_document(doc)?;
        }
        index_writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Retire every chunk of a document. Called before re-ingesting a
    /// changed document with freshly derived chunk ids.
    pub fn remove_document(&self, doc_id: &str) -> Result<()> {
        let mut index_writer = self.index.writer::<TantivyDocument>(WRITER_HEAP_BYTES)?;
        index_writer.delete_term(Term::from_field_text(self.doc_id_field, doc_id));
        index_writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn num_chunks(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// BM25 search. No matches is an empty list; an unparsable query is
    /// treated the same way rather than surfaced as an error.
    pub fn search_sync(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        assert!(top_k >= 1, "top_k must be at least 1");
        let Some(sanitized) = sanitize_query(query) else {
            return Ok(Vec::new());
        };
        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.content_field]);
        let parsed = match query_parser.parse_query(&sanitized) {
            Ok(q) => q,
            Err(e) => {
                warn!(query = %sanitized, error = %e, "keyword query failed to parse");
                return Ok(Vec::new());
            }
        };
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(top_k))?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (i, (score, addr)) in top_docs.into_iter().enumerate() {
            let doc: TantivyDocument = searcher.doc(addr)?;
            hits.push(SearchHit {
                chunk: self.chunk_from_doc(&doc)?,
                rank: i + 1,
                raw_score: score / (1.0 + score),
            });
        }
        Ok(hits)
    }

    /// All stored chunks of one document, in offset order. Backs full-document
    /// retrieval without touching the raw file store.
    pub fn chunks_for_document(&self, doc_id: &str, limit: usize) -> Result<Vec<Chunk>> {
        assert!(limit >= 1, "limit must be at least 1");
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.doc_id_field, doc_id),
            IndexRecordOption::Basic,
        );
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;
        let mut chunks = Vec::with_capacity(top_docs.len());
        for (_score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr)?;
            chunks.push(self.chunk_from_doc(&doc)?);
        }
        chunks.sort_by_key(|c| c.start_offset);
        Ok(chunks)
    }

    fn chunk_from_doc(&self, doc: &TantivyDocument) -> Result<Chunk> {
        let text = |field| -> Result<String> {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("stored text field missing"))
        };
        let offset = |field| -> Result<usize> {
            doc.get_first(field)
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .ok_or_else(|| anyhow::anyhow!("stored offset field missing"))
        };
        let metadata: Meta = doc
            .get_first(self.metadata_field)
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        Ok(Chunk {
            id: text(self.id_field)?,
            doc_id: text(self.doc_id_field)?,
            content: text(self.content_field)?,
            start_offset: offset(self.start_field)?,
            end_offset: offset(self.end_field)?,
            metadata,
        })
    }
}

#[async_trait]
impl KeywordIndex for TantivyKeywordIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        self.search_sync(query, top_k)
    }
}
