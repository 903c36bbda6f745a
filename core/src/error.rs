//! Error type shared by every part of the core library.

use crate::index::DocId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Debug, Error)]
pub enum SearchError {
    /// Statistics were requested from an index holding zero documents.
    #[error("index holds no documents")]
    EmptyIndex,

    #[error("unknown document id {0}")]
    UnknownDocument(DocId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A persisted index is absent or incomplete; callers should rebuild.
    #[error("index cache missing: {0}")]
    MissingCache(String),

    /// The persisted parts decoded but do not describe the same index.
    #[error("index cache corrupt: {0}")]
    CorruptCache(String),

    /// An injected collaborator (embedder, reranker, query enhancer) failed.
    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        SearchError::InvalidArgument(msg.into())
    }

    pub fn collaborator<S: Into<String>>(msg: S) -> Self {
        SearchError::Collaborator(msg.into())
    }
}
