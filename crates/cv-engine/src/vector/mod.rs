pub mod embedding;
pub mod store;
pub mod writer;

pub use embedding::{EmbeddingProvider, ProviderChain};
pub use store::{VectorHit, VectorPoint, VectorStore};
pub use writer::{VectorWriter, CODE_CHUNKS_COLLECTION};
