pub mod embeddings;
pub mod index;

pub use embeddings::{cosine_similarity, EmbeddingProvider, HttpEmbeddingProvider};
pub use index::{NullEntityIndex, SqliteEntityIndex};
