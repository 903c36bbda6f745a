//! Hybrid fusion of a keyword result list and a semantic result list.
//!
//! Two strategies are available:
//! - **Weighted**: min-max normalize each list, then blend with `alpha`.
//! - **RRF** (Reciprocal Rank Fusion): sum `1 / (k + rank)` over the lists a
//!   document appears in; raw scores are ignored.
//!
//! Both are pure functions of the two lists they receive. [`HybridSearch`] drives
//! them: it asks each ranker for `limit * candidate_multiplier` candidates and
//! fuses the two lists.

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::index::DocId;
use crate::topk::top_k;
use crate::types::{Ranker, SearchResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Min-max normalize to `[0, 1]`. When every score is equal (including a single
/// score) each maps to 1.0.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let (min, max) = scores.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = max - min;
    if range <= 0.0 {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Scores handed to fusion must be finite; NaN would otherwise rank first.
fn check_finite(side: &str, results: &[SearchResult]) -> Result<()> {
    match results.iter().find(|r| !r.score.is_finite()) {
        Some(r) => Err(SearchError::collaborator(format!("{side} ranker returned score {} for document {}", r.score, r.id))),
        None => Ok(()),
    }
}

pub fn validate_alpha(alpha: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(SearchError::invalid_argument(format!("alpha must lie in [0, 1], got {alpha}")));
    }
    Ok(())
}

pub fn hybrid_score(keyword: f64, semantic: f64, alpha: f64) -> f64 {
    alpha * keyword + (1.0 - alpha) * semantic
}

/// Contribution of one list to a document's RRF score; `rank` starts at 1.
pub fn rrf_score(rank: usize, k: u32) -> f64 {
    1.0 / (k as f64 + rank as f64)
}

struct WeightedEntry<'a> {
    source: &'a SearchResult,
    keyword: f64,
    semantic: f64,
}

/// Blend normalized keyword and semantic scores:
/// `alpha * keyword + (1 - alpha) * semantic`, a missing side counting 0.0.
///
/// Metadata: `kw_score`, `sm_score`, `hybrid_score`.
pub fn weighted_fusion(
    keyword: &[SearchResult],
    semantic: &[SearchResult],
    alpha: f64,
    limit: usize,
) -> Result<Vec<SearchResult>> {
    validate_alpha(alpha)?;
    check_finite("keyword", keyword)?;
    check_finite("semantic", semantic)?;
    let kw_norm = normalize_scores(&keyword.iter().map(|r| r.score).collect::<Vec<_>>());
    let sm_norm = normalize_scores(&semantic.iter().map(|r| r.score).collect::<Vec<_>>());

    let mut entries: HashMap<DocId, WeightedEntry> = HashMap::with_capacity(keyword.len() + semantic.len());
    for (result, norm) in keyword.iter().zip(kw_norm) {
        let entry = entries.entry(result.id).or_insert(WeightedEntry { source: result, keyword: 0.0, semantic: 0.0 });
        entry.keyword = entry.keyword.max(norm);
    }
    for (result, norm) in semantic.iter().zip(sm_norm) {
        let entry = entries.entry(result.id).or_insert(WeightedEntry { source: result, keyword: 0.0, semantic: 0.0 });
        entry.semantic = entry.semantic.max(norm);
    }

    let combined = entries.iter().map(|(&id, e)| (id, hybrid_score(e.keyword, e.semantic, alpha)));
    let ranked = top_k(combined, limit);
    debug!(keyword = keyword.len(), semantic = semantic.len(), fused = entries.len(), alpha, "weighted fusion");

    Ok(ranked
        .into_iter()
        .map(|(id, score)| {
            let e = &entries[&id];
            SearchResult::new(id, e.source.title.clone(), e.source.document.clone(), score)
                .with_metadata("kw_score", e.keyword)
                .with_metadata("sm_score", e.semantic)
                .with_metadata("hybrid_score", score)
        })
        .collect())
}

struct RrfEntry<'a> {
    source: &'a SearchResult,
    score: f64,
    keyword_rank: Option<usize>,
    semantic_rank: Option<usize>,
}

/// Reciprocal Rank Fusion. Only a document's first occurrence in each list counts.
///
/// Metadata: `rrf_score`, `kw_rank`, `sm_rank` (null when absent from that list).
pub fn rrf_fusion(keyword: &[SearchResult], semantic: &[SearchResult], k: u32, limit: usize) -> Vec<SearchResult> {
    let mut entries: HashMap<DocId, RrfEntry> = HashMap::with_capacity(keyword.len() + semantic.len());
    for (rank, result) in (1..).zip(keyword) {
        let entry = entries.entry(result.id).or_insert(RrfEntry { source: result, score: 0.0, keyword_rank: None, semantic_rank: None });
        if entry.keyword_rank.is_none() {
            entry.keyword_rank = Some(rank);
            entry.score += rrf_score(rank, k);
        }
    }
    for (rank, result) in (1..).zip(semantic) {
        let entry = entries.entry(result.id).or_insert(RrfEntry { source: result, score: 0.0, keyword_rank: None, semantic_rank: None });
        if entry.semantic_rank.is_none() {
            entry.semantic_rank = Some(rank);
            entry.score += rrf_score(rank, k);
        }
    }

    let ranked = top_k(entries.iter().map(|(&id, e)| (id, e.score)), limit);
    debug!(keyword = keyword.len(), semantic = semantic.len(), fused = entries.len(), k, "rrf fusion");

    ranked
        .into_iter()
        .map(|(id, score)| {
            let e = &entries[&id];
            SearchResult::new(id, e.source.title.clone(), e.source.document.clone(), score)
                .with_metadata("rrf_score", score)
                .with_metadata("kw_rank", e.keyword_rank)
                .with_metadata("sm_rank", e.semantic_rank)
        })
        .collect()
}

/// Runs a keyword ranker and a semantic ranker for one query and fuses their lists.
#[derive(Clone)]
pub struct HybridSearch {
    keyword: Arc<dyn Ranker>,
    semantic: Arc<dyn Ranker>,
    config: SearchConfig,
}

impl HybridSearch {
    pub fn new(keyword: Arc<dyn Ranker>, semantic: Arc<dyn Ranker>) -> Self {
        Self { keyword, semantic, config: SearchConfig::default() }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn weighted_search(&self, query: &str, alpha: f64, limit: usize) -> Result<Vec<SearchResult>> {
        validate_alpha(alpha)?;
        let (keyword, semantic) = self.candidates(query, limit)?;
        weighted_fusion(&keyword, &semantic, alpha, limit)
    }

    pub fn rrf_search(&self, query: &str, k: u32, limit: usize) -> Result<Vec<SearchResult>> {
        let (keyword, semantic) = self.candidates(query, limit)?;
        Ok(rrf_fusion(&keyword, &semantic, k, limit))
    }

    /// Both candidate lists, ranked concurrently. A blank query has no candidates.
    fn candidates(&self, query: &str, limit: usize) -> Result<(Vec<SearchResult>, Vec<SearchResult>)> {
        if limit == 0 || query.trim().is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let candidate_limit = self.config.candidate_limit(limit);
        let (keyword, semantic) = std::thread::scope(|s| {
            let keyword = s.spawn(|| self.keyword.rank(query, candidate_limit));
            let semantic = self.semantic.rank(query, candidate_limit);
            let keyword = keyword.join().unwrap_or_else(|_| Err(SearchError::collaborator("keyword ranker panicked")));
            (keyword, semantic)
        });
        let (keyword, semantic) = (keyword?, semantic?);
        check_finite("keyword", &keyword)?;
        check_finite("semantic", &semantic)?;
        Ok((keyword, semantic))
    }
}
