use crate::config::SCORE_PRECISION;
use crate::error::Result;
use crate::index::{DocId, Document};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Algorithm-specific diagnostics attached to a result. Never used for ordering.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: DocId,
    pub title: String,
    pub document: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl SearchResult {
    /// `score` is rounded to `SCORE_PRECISION` digits; order results before building them.
    pub fn new(id: DocId, title: impl Into<String>, document: impl Into<String>, score: f64) -> Self {
        Self { id, title: title.into(), document: document.into(), score: round_score(score), metadata: Metadata::new() }
    }

    pub fn from_document(doc: &Document, score: f64) -> Self {
        Self::new(doc.id, doc.title.clone(), doc.body.clone(), score)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// First `max_chars` characters of the document text.
    pub fn preview(&self, max_chars: usize) -> String {
        self.document.chars().take(max_chars).collect()
    }
}

pub fn round_score(score: f64) -> f64 {
    let factor = 10f64.powi(SCORE_PRECISION);
    (score * factor).round() / factor
}

/// A ranked result producer. Keyword and semantic rankers both satisfy this contract:
/// results come back sorted by descending score, at most `limit` of them, and an
/// empty list is a valid answer rather than an error.
pub trait Ranker: Send + Sync {
    fn rank(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;
}
