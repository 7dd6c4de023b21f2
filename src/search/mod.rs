//! Exact dense retrieval: similarity scoring and top-k selection.

pub mod similarity;
pub mod topk;

pub use similarity::{dot_product, EmbeddingMatrix, ScoreFunction, ScoreMatrix, SimilarityEngine};
pub use topk::{select_top_k, Hit, TopK};
