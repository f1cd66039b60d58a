//! Product catalog mirror and vector similarity index, backing the
//! recommendations workflow's k-NN product lookup.

pub mod encoder;
pub mod index;
pub mod model;

pub use encoder::{EmbeddingEncoder, HashEmbeddingEncoder, HttpEmbeddingEncoder, EMBEDDING_DIM};
pub use index::{ProductIndex, ScoredProduct};
pub use model::Product;
