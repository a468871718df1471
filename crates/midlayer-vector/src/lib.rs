//! midlayer-vector
//!
//! LanceDB-based nearest-neighbor search over chunk embeddings. Writes go
//! through [`writer::LanceVectorWriter`], queries through
//! [`search::LanceVectorIndex`]. Query embedding is serialized per embedder
//! instance; see `search::LanceVectorIndex`.

pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use search::LanceVectorIndex;
pub use writer::LanceVectorWriter;
