//! midlayer-text
//!
//! Tantivy-based keyword indexing and BM25 search over document chunks.
//! Scores leaving this crate are normalized to [0, 1] so downstream
//! strong-signal thresholds have a stable scale to work against.

pub mod index;
pub mod tantivy_utils;

pub use index::TantivyKeywordIndex;
