//! Rerank slot applied to fused candidates.
//!
//! The three methods differ in how they consult their backend:
//! - `individual`: one relevance score per candidate (0-10 scale)
//! - `batch`: one call orders the whole candidate list
//! - `cross_encoder`: pair scores for all candidates in one batch
//!
//! Backends are injected. [`OverlapScorer`] is a local token-overlap backend that
//! implements both backend traits.

use crate::error::{Result, SearchError};
use crate::index::DocId;
use crate::tokenizer::Tokenizer;
use crate::types::SearchResult;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankMethod {
    Individual,
    Batch,
    CrossEncoder,
}

impl RerankMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RerankMethod::Individual => "individual",
            RerankMethod::Batch => "batch",
            RerankMethod::CrossEncoder => "cross_encoder",
        }
    }
}

impl fmt::Display for RerankMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RerankMethod {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "individual" => Ok(RerankMethod::Individual),
            "batch" => Ok(RerankMethod::Batch),
            "cross_encoder" => Ok(RerankMethod::CrossEncoder),
            other => Err(SearchError::invalid_argument(format!("unknown rerank method {other:?}"))),
        }
    }
}

/// Reorders and truncates a candidate list for a query.
pub trait Reranker: Send + Sync {
    fn method(&self) -> RerankMethod;
    fn rerank(&self, query: &str, candidates: Vec<SearchResult>, limit: usize) -> Result<Vec<SearchResult>>;
}

/// Scores (query, candidate) pairs.
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, query: &str, candidate: &SearchResult) -> Result<f64>;

    fn score_batch(&self, query: &str, candidates: &[SearchResult]) -> Result<Vec<f64>> {
        candidates.iter().map(|c| self.score(query, c)).collect()
    }
}

/// Orders a whole candidate list, best first, returning document ids.
pub trait ListRanker: Send + Sync {
    fn rank_ids(&self, query: &str, candidates: &[SearchResult]) -> Result<Vec<DocId>>;
}

/// Stable descending sort by `scores`, so equal scores keep the fused order.
fn order_by_scores(candidates: Vec<SearchResult>, scores: Vec<f64>, key: &str, limit: usize) -> Result<Vec<SearchResult>> {
    if scores.len() != candidates.len() {
        return Err(SearchError::collaborator(format!(
            "reranker returned {} scores for {} candidates",
            scores.len(),
            candidates.len()
        )));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(SearchError::collaborator(format!("reranker returned a non-finite score {bad}")));
    }
    let mut scored: Vec<(f64, SearchResult)> = scores.into_iter().zip(candidates).collect();
    scored.sort_by(|a, b| OrderedFloat(b.0).cmp(&OrderedFloat(a.0)));
    Ok(scored.into_iter().take(limit).map(|(score, result)| result.with_metadata(key, score)).collect())
}

pub struct IndividualReranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl IndividualReranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }
}

impl Reranker for IndividualReranker {
    fn method(&self) -> RerankMethod {
        RerankMethod::Individual
    }

    fn rerank(&self, query: &str, candidates: Vec<SearchResult>, limit: usize) -> Result<Vec<SearchResult>> {
        let scores = candidates
            .iter()
            .map(|c| self.scorer.score(query, c).map(|s| s.clamp(0.0, 10.0)))
            .collect::<Result<Vec<_>>>()?;
        order_by_scores(candidates, scores, "individual_score", limit)
    }
}

pub struct CrossEncoderReranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl CrossEncoderReranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }
}

impl Reranker for CrossEncoderReranker {
    fn method(&self) -> RerankMethod {
        RerankMethod::CrossEncoder
    }

    fn rerank(&self, query: &str, candidates: Vec<SearchResult>, limit: usize) -> Result<Vec<SearchResult>> {
        let scores = self.scorer.score_batch(query, &candidates)?;
        order_by_scores(candidates, scores, "cross_encoder_score", limit)
    }
}

pub struct BatchReranker {
    ranker: Arc<dyn ListRanker>,
}

impl BatchReranker {
    pub fn new(ranker: Arc<dyn ListRanker>) -> Self {
        Self { ranker }
    }
}

impl Reranker for BatchReranker {
    fn method(&self) -> RerankMethod {
        RerankMethod::Batch
    }

    /// Candidates the backend leaves out are dropped; unknown or repeated ids are ignored.
    fn rerank(&self, query: &str, candidates: Vec<SearchResult>, limit: usize) -> Result<Vec<SearchResult>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let order = self.ranker.rank_ids(query, &candidates)?;
        let mut by_id: HashMap<DocId, SearchResult> = HashMap::with_capacity(candidates.len());
        for candidate in candidates {
            by_id.entry(candidate.id).or_insert(candidate);
        }
        let returned = order.len();
        let mut reranked = Vec::with_capacity(limit.min(by_id.len()));
        for id in order {
            if reranked.len() == limit {
                break;
            }
            if let Some(result) = by_id.remove(&id) {
                let rank = reranked.len() + 1;
                reranked.push(result.with_metadata("batch_rank", rank));
            }
        }
        debug!(returned, kept = reranked.len(), "batch rerank");
        Ok(reranked)
    }
}

/// Build the reranker for `method` on top of a backend serving all three methods.
pub fn reranker_for<B>(method: RerankMethod, backend: Arc<B>) -> Arc<dyn Reranker>
where
    B: RelevanceScorer + ListRanker + 'static,
{
    match method {
        RerankMethod::Individual => Arc::new(IndividualReranker::new(backend)),
        RerankMethod::Batch => Arc::new(BatchReranker::new(backend)),
        RerankMethod::CrossEncoder => Arc::new(CrossEncoderReranker::new(backend)),
    }
}

/// Fraction of the distinct query tokens found in a candidate's title and text, on a 0-10 scale.
pub struct OverlapScorer {
    tokenizer: Arc<dyn Tokenizer>,
}

impl OverlapScorer {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }
}

impl RelevanceScorer for OverlapScorer {
    fn score(&self, query: &str, candidate: &SearchResult) -> Result<f64> {
        let query_tokens: HashSet<String> = self.tokenizer.normalize(query).into_iter().collect();
        if query_tokens.is_empty() {
            return Ok(0.0);
        }
        let text = format!("{} {}", candidate.title, candidate.document);
        let doc_tokens: HashSet<String> = self.tokenizer.normalize(&text).into_iter().collect();
        let matched = query_tokens.iter().filter(|t| doc_tokens.contains(*t)).count();
        Ok(10.0 * matched as f64 / query_tokens.len() as f64)
    }
}

impl ListRanker for OverlapScorer {
    fn rank_ids(&self, query: &str, candidates: &[SearchResult]) -> Result<Vec<DocId>> {
        let scores = self.score_batch(query, candidates)?;
        let mut order: Vec<(f64, DocId)> = scores.into_iter().zip(candidates.iter().map(|c| c.id)).collect();
        order.sort_by(|a, b| OrderedFloat(b.0).cmp(&OrderedFloat(a.0)));
        Ok(order.into_iter().map(|(_, id)| id).collect())
    }
}
