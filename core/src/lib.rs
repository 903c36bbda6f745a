//! Hybrid movie retrieval: BM25 keyword ranking, embedding ranking, and their
//! fusion by weighted score blending or Reciprocal Rank Fusion.

pub mod catalog;
pub mod config;
pub mod enhance;
pub mod error;
pub mod evaluation;
pub mod fusion;
pub mod index;
pub mod keyword;
pub mod persist;
pub mod pipeline;
pub mod rerank;
pub mod semantic;
pub mod tokenizer;
pub mod topk;
pub mod types;

pub use error::{Result, SearchError};
pub use index::{DocId, Document, InvertedIndex};
pub use types::{Ranker, SearchResult};
