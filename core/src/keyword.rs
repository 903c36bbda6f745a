//! BM25 keyword ranking over an [`InvertedIndex`].

use crate::config::{BM25_B, BM25_K1};
use crate::error::{Result, SearchError};
use crate::index::{bm25_idf_for, bm25_tf_for, DocId, InvertedIndex};
use crate::tokenizer::Tokenizer;
use crate::topk::top_k;
use crate::types::{Ranker, SearchResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: BM25_K1, b: BM25_B }
    }
}

impl Bm25Params {
    pub fn new(k1: f64, b: f64) -> Result<Self> {
        let params = Self { k1, b };
        params.validate()?;
        Ok(params)
    }

    /// `k1` must be finite and non-negative, `b` must lie in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(SearchError::invalid_argument(format!("k1 must be a non-negative number, got {}", self.k1)));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(SearchError::invalid_argument(format!("b must lie in [0, 1], got {}", self.b)));
        }
        Ok(())
    }
}

/// Scores every indexed document against a query with BM25.
///
/// Scoring is exhaustive: each document sums `bm25(doc, token)` over the query
/// tokens, so documents sharing no token with the query score 0 and still take
/// part in the ranking.
#[derive(Clone)]
pub struct KeywordRanker {
    index: Arc<InvertedIndex>,
    tokenizer: Arc<dyn Tokenizer>,
    params: Bm25Params,
    diagnostics: bool,
}

impl KeywordRanker {
    pub fn new(index: Arc<InvertedIndex>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { index, tokenizer, params: Bm25Params::default(), diagnostics: false }
    }

    pub fn with_params(mut self, params: Bm25Params) -> Self {
        self.params = params;
        self
    }

    /// Attach per-token BM25 contributions (`bm25:<token>`) to each result's metadata.
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Normalize a raw term; it must produce exactly one token.
    pub fn single_token(&self, term: &str) -> Result<String> {
        let mut tokens = self.tokenizer.normalize(term);
        match tokens.len() {
            1 => Ok(tokens.remove(0)),
            0 => Err(SearchError::invalid_argument(format!("{term:?} has no indexable token"))),
            n => Err(SearchError::invalid_argument(format!("{term:?} normalizes to {n} tokens, expected one"))),
        }
    }

    pub fn term_frequency(&self, doc_id: DocId, term: &str) -> Result<u32> {
        self.index.term_frequency(doc_id, &self.single_token(term)?)
    }

    pub fn inverse_document_frequency(&self, term: &str) -> Result<f64> {
        self.index.inverse_document_frequency(&self.single_token(term)?)
    }

    /// TF-IDF summed over every token of `term`.
    pub fn tf_idf(&self, doc_id: DocId, term: &str) -> Result<f64> {
        if self.index.document(doc_id).is_none() {
            return Err(SearchError::UnknownDocument(doc_id));
        }
        self.tokenizer
            .normalize(term)
            .iter()
            .try_fold(0.0, |acc, token| Ok(acc + self.index.tf_idf(doc_id, token)?))
    }

    pub fn bm25_idf(&self, term: &str) -> Result<f64> {
        self.index.bm25_idf(&self.single_token(term)?)
    }

    pub fn bm25_tf(&self, doc_id: DocId, term: &str, params: Bm25Params) -> Result<f64> {
        self.index.bm25_tf(doc_id, &self.single_token(term)?, params)
    }

    pub fn bm25(&self, doc_id: DocId, term: &str) -> Result<f64> {
        self.index.bm25_with(doc_id, &self.single_token(term)?, self.params)
    }

    /// Top `limit` documents for `query`, best first, ties by ascending id.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.params.validate()?;
        let tokens = self.tokenizer.normalize(query);
        if tokens.is_empty() || limit == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let num_docs = self.index.num_documents();
        let avg_len = self.index.average_document_length();
        let idfs: HashMap<&str, f64> =
            tokens.iter().map(|t| (t.as_str(), bm25_idf_for(num_docs, self.index.document_frequency(t)))).collect();

        let mut per_token: HashMap<DocId, Vec<(&str, f64)>> = HashMap::new();
        let mut scores: Vec<(DocId, f64)> = Vec::with_capacity(num_docs);
        for doc in self.index.documents() {
            let len = self.index.document_length(doc.id)?;
            let mut total = 0.0;
            for token in tokens.iter() {
                let tf = self.index.term_frequency(doc.id, token)?;
                let contribution = bm25_tf_for(tf, len, avg_len, self.params) * idfs[token.as_str()];
                total += contribution;
                if self.diagnostics {
                    per_token.entry(doc.id).or_default().push((token.as_str(), contribution));
                }
            }
            scores.push((doc.id, total));
        }

        let ranked = top_k(scores, limit);
        debug!(query, tokens = tokens.len(), candidates = num_docs, returned = ranked.len(), "bm25 search");

        let mut results = Vec::with_capacity(ranked.len());
        for (doc_id, score) in ranked {
            let doc = self.index.document(doc_id).ok_or(SearchError::UnknownDocument(doc_id))?;
            let mut result = SearchResult::from_document(doc, score);
            if let Some(contributions) = per_token.remove(&doc_id) {
                for (token, value) in contributions {
                    let key = format!("bm25:{token}");
                    let prior = result.metadata.get(&key).and_then(|v| v.as_f64()).unwrap_or(0.0);
                    result = result.with_metadata(key, prior + value);
                }
            }
            results.push(result);
        }
        Ok(results)
    }
}

impl Ranker for KeywordRanker {
    fn rank(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.search(query, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Document;
    use crate::tokenizer::TextNormalizer;

    fn ranker() -> KeywordRanker {
        let docs = vec![
            Document::new(1, "Lost in Space", "A family is lost among the stars."),
            Document::new(2, "Lost City", "Explorers search the jungle."),
            Document::new(3, "Space Odyssey", "A voyage to Jupiter."),
            Document::new(4, "Paddington", "A bear in London loves marmalade."),
        ];
        let index = InvertedIndex::from_documents(docs, &TextNormalizer).unwrap();
        KeywordRanker::new(Arc::new(index), Arc::new(TextNormalizer))
    }

    #[test]
    fn empty_query_returns_nothing() {
        assert!(ranker().search("the and of", 5).unwrap().is_empty());
        assert!(ranker().search("", 5).unwrap().is_empty());
    }

    #[test]
    fn zero_overlap_documents_are_candidates() {
        let results = ranker().search("bear", 10).unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].id, 4);
        // remaining documents tie at zero, ascending id
        assert_eq!(results[1..].iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(results[1..].iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn search_score_is_sum_of_token_bm25() {
        let r = ranker();
        let results = r.search("lost space", 1).unwrap();
        assert_eq!(results[0].id, 1);
        let expected = r.bm25(1, "lost").unwrap() + r.bm25(1, "space").unwrap();
        assert!((crate::types::round_score(expected) - results[0].score).abs() < 1e-9);
        assert!(matches!(r.bm25(99, "lost"), Err(SearchError::UnknownDocument(99))));
    }

    #[test]
    fn huge_limit_returns_every_document() {
        let results = ranker().search("lost", 1usize << 40).unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].id, 1);
    }

    #[test]
    fn metadata_is_empty_without_diagnostics() {
        let results = ranker().search("lost", 2).unwrap();
        assert!(results.iter().all(|r| r.metadata.is_empty()));
    }

    #[test]
    fn diagnostics_sum_to_score() {
        let ranker = ranker().with_diagnostics(true);
        let results = ranker.search("lost space", 1).unwrap();
        let top = &results[0];
        assert_eq!(top.id, 1);
        let sum: f64 = top.metadata.values().filter_map(|v| v.as_f64()).sum();
        assert!((crate::types::round_score(sum) - top.score).abs() < 1e-9);
        assert!(top.metadata.contains_key("bm25:lost"));
    }

    #[test]
    fn raw_term_statistics() {
        let r = ranker();
        assert_eq!(r.term_frequency(1, "LOST").unwrap(), 2);
        assert!(matches!(r.term_frequency(1, "lost city"), Err(SearchError::InvalidArgument(_))));
        assert!(matches!(r.term_frequency(1, "the"), Err(SearchError::InvalidArgument(_))));
        assert!(matches!(r.tf_idf(99, "lost"), Err(SearchError::UnknownDocument(99))));
        let tfidf = r.tf_idf(1, "lost").unwrap();
        assert!((tfidf - 2.0 * (5.0f64 / 3.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(Bm25Params::new(-1.0, 0.5).is_err());
        assert!(Bm25Params::new(1.2, 1.5).is_err());
        let r = ranker().with_params(Bm25Params { k1: 1.2, b: f64::NAN });
        assert!(matches!(r.search("lost", 3), Err(SearchError::InvalidArgument(_))));
    }
}
