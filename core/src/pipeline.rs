//! RRF search with optional query enhancement and reranking.
//!
//! A run is an ordered list of named [`Stage`]s sharing one shape,
//! `(query, candidates) -> candidates`:
//!
//! ```text
//! rrf_fuse(limit * rerank_multiplier) -> rerank(limit) -> truncate(limit)
//! ```
//!
//! The rerank stage is present only when a reranker is configured. Enhancement
//! rewrites the query text before any stage runs.

use crate::config::DEFAULT_RRF_K;
use crate::enhance::{EnhanceMethod, QueryEnhancer};
use crate::error::Result;
use crate::fusion::HybridSearch;
use crate::rerank::{RerankMethod, Reranker};
use crate::types::SearchResult;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, query: &str, candidates: Vec<SearchResult>) -> Result<Vec<SearchResult>>;
}

/// Produces the fused candidate list. Incoming candidates are replaced.
pub struct RrfFuseStage {
    hybrid: HybridSearch,
    k: u32,
    limit: usize,
}

impl RrfFuseStage {
    pub fn new(hybrid: HybridSearch, k: u32, limit: usize) -> Self {
        Self { hybrid, k, limit }
    }
}

impl Stage for RrfFuseStage {
    fn name(&self) -> &'static str {
        "rrf_fuse"
    }

    fn apply(&self, query: &str, _candidates: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        self.hybrid.rrf_search(query, self.k, self.limit)
    }
}

pub struct RerankStage {
    reranker: Arc<dyn Reranker>,
    limit: usize,
}

impl RerankStage {
    pub fn new(reranker: Arc<dyn Reranker>, limit: usize) -> Self {
        Self { reranker, limit }
    }
}

impl Stage for RerankStage {
    fn name(&self) -> &'static str {
        "rerank"
    }

    fn apply(&self, query: &str, candidates: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        self.reranker.rerank(query, candidates, self.limit)
    }
}

pub struct TruncateStage {
    limit: usize,
}

impl TruncateStage {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Stage for TruncateStage {
    fn name(&self) -> &'static str {
        "truncate"
    }

    fn apply(&self, _query: &str, mut candidates: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        candidates.truncate(self.limit);
        Ok(candidates)
    }
}

/// Apply `stages` in order, returning the final list and the names of the stages that ran.
pub fn run_stages(stages: &[Box<dyn Stage>], query: &str) -> Result<(Vec<SearchResult>, Vec<String>)> {
    let mut candidates = Vec::new();
    let mut ran = Vec::with_capacity(stages.len());
    for stage in stages {
        candidates = stage.apply(query, candidates)?;
        debug!(stage = stage.name(), candidates = candidates.len(), "stage complete");
        ran.push(stage.name().to_string());
    }
    Ok((candidates, ran))
}

/// Result envelope of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RrfSearchOutcome {
    pub original_query: String,
    pub enhanced_query: Option<String>,
    pub enhance_method: Option<EnhanceMethod>,
    /// Query text the rankers saw.
    pub query: String,
    pub k: u32,
    pub limit: usize,
    pub rerank_method: Option<RerankMethod>,
    pub reranked: bool,
    pub stages: Vec<String>,
    pub results: Vec<SearchResult>,
}

#[derive(Clone)]
pub struct RrfPipeline {
    hybrid: HybridSearch,
    k: u32,
    enhancer: Option<(Arc<dyn QueryEnhancer>, EnhanceMethod)>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RrfPipeline {
    pub fn new(hybrid: HybridSearch) -> Self {
        Self { hybrid, k: DEFAULT_RRF_K, enhancer: None, reranker: None }
    }

    pub fn with_k(mut self, k: u32) -> Self {
        self.k = k;
        self
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn QueryEnhancer>, method: EnhanceMethod) -> Self {
        self.enhancer = Some((enhancer, method));
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Stages for a run returning `limit` results.
    pub fn stages(&self, limit: usize) -> Vec<Box<dyn Stage>> {
        let fused_limit = match self.reranker {
            Some(_) => limit.saturating_mul(self.hybrid.config().rerank_multiplier.max(1)),
            None => limit,
        };
        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(RrfFuseStage::new(self.hybrid.clone(), self.k, fused_limit))];
        if let Some(reranker) = &self.reranker {
            stages.push(Box::new(RerankStage::new(Arc::clone(reranker), limit)));
        }
        stages.push(Box::new(TruncateStage::new(limit)));
        stages
    }

    pub fn run(&self, query: &str, limit: usize) -> Result<RrfSearchOutcome> {
        let (effective, enhanced_query, enhance_method) = match &self.enhancer {
            Some((enhancer, method)) => {
                let enhanced = enhancer.enhance(query, *method)?;
                debug!(original = query, enhanced = %enhanced, method = %method, "query enhanced");
                (enhanced.clone(), Some(enhanced), Some(*method))
            }
            None => (query.to_string(), None, None),
        };

        let (results, stages) = run_stages(&self.stages(limit), &effective)?;
        let reranked = stages.iter().any(|s| s == "rerank");
        Ok(RrfSearchOutcome {
            original_query: query.to_string(),
            enhanced_query,
            enhance_method,
            query: effective,
            k: self.k,
            limit,
            rerank_method: self.reranker.as_ref().map(|r| r.method()),
            reranked,
            stages,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::index::DocId;
    use crate::types::Ranker;
    use std::sync::Mutex;

    /// Returns `ids` in order and records every limit it was asked for.
    struct FakeRanker {
        ids: Vec<DocId>,
        limits: Mutex<Vec<usize>>,
    }

    impl FakeRanker {
        fn new(ids: &[DocId]) -> Arc<Self> {
            Arc::new(Self { ids: ids.to_vec(), limits: Mutex::new(Vec::new()) })
        }
    }

    impl Ranker for FakeRanker {
        fn rank(&self, _query: &str, limit: usize) -> Result<Vec<SearchResult>> {
            self.limits.lock().unwrap().push(limit);
            Ok(self
                .ids
                .iter()
                .take(limit)
                .map(|&id| SearchResult::new(id, format!("doc {id}"), "", 1.0))
                .collect())
        }
    }

    /// Reverses the fused order.
    struct Reverse;

    impl Reranker for Reverse {
        fn method(&self) -> RerankMethod {
            RerankMethod::Batch
        }
        fn rerank(&self, _query: &str, mut candidates: Vec<SearchResult>, limit: usize) -> Result<Vec<SearchResult>> {
            candidates.reverse();
            candidates.truncate(limit);
            Ok(candidates)
        }
    }

    struct Upper;

    impl QueryEnhancer for Upper {
        fn enhance(&self, query: &str, _method: EnhanceMethod) -> Result<String> {
            Ok(query.to_uppercase())
        }
    }

    struct Failing;

    impl QueryEnhancer for Failing {
        fn enhance(&self, _query: &str, _method: EnhanceMethod) -> Result<String> {
            Err(SearchError::collaborator("enhancer offline"))
        }
    }

    fn hybrid(kw: &Arc<FakeRanker>, sm: &Arc<FakeRanker>) -> HybridSearch {
        HybridSearch::new(kw.clone(), sm.clone())
    }

    #[test]
    fn plain_run_fuses_and_truncates() {
        let kw = FakeRanker::new(&[1, 2, 3]);
        let sm = FakeRanker::new(&[2, 3, 4]);
        let outcome = RrfPipeline::new(hybrid(&kw, &sm)).run("space", 2).unwrap();
        assert_eq!(outcome.stages, vec!["rrf_fuse", "truncate"]);
        assert!(!outcome.reranked);
        assert!(outcome.enhanced_query.is_none());
        assert_eq!(outcome.query, "space");
        assert_eq!(outcome.results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(*kw.limits.lock().unwrap(), vec![2 * 500]);
    }

    #[test]
    fn reranker_widens_the_fused_list() {
        let ids: Vec<DocId> = (1..=20).collect();
        let kw = FakeRanker::new(&ids);
        let sm = FakeRanker::new(&ids);
        let pipeline = RrfPipeline::new(hybrid(&kw, &sm)).with_reranker(Arc::new(Reverse));
        let outcome = pipeline.run("space", 2).unwrap();
        assert_eq!(outcome.stages, vec!["rrf_fuse", "rerank", "truncate"]);
        assert!(outcome.reranked);
        assert_eq!(outcome.rerank_method, Some(RerankMethod::Batch));
        // ten fused candidates reversed, then cut to two
        assert_eq!(outcome.results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![10, 9]);
        assert_eq!(*kw.limits.lock().unwrap(), vec![2 * 5 * 500]);
    }

    #[test]
    fn enhancer_keeps_both_queries() {
        let kw = FakeRanker::new(&[1]);
        let sm = FakeRanker::new(&[1]);
        let pipeline = RrfPipeline::new(hybrid(&kw, &sm)).with_k(10).with_enhancer(Arc::new(Upper), EnhanceMethod::Rewrite);
        let outcome = pipeline.run("lost space", 5).unwrap();
        assert_eq!(outcome.original_query, "lost space");
        assert_eq!(outcome.enhanced_query.as_deref(), Some("LOST SPACE"));
        assert_eq!(outcome.query, "LOST SPACE");
        assert_eq!(outcome.enhance_method, Some(EnhanceMethod::Rewrite));
        assert_eq!(outcome.k, 10);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["enhance_method"], "rewrite");
        assert!(json["rerank_method"].is_null());
    }

    #[test]
    fn enhancer_failure_stops_the_run() {
        let kw = FakeRanker::new(&[1]);
        let sm = FakeRanker::new(&[1]);
        let pipeline = RrfPipeline::new(hybrid(&kw, &sm)).with_enhancer(Arc::new(Failing), EnhanceMethod::Spell);
        assert!(matches!(pipeline.run("q", 5), Err(SearchError::Collaborator(_))));
        assert!(kw.limits.lock().unwrap().is_empty());
    }

    #[test]
    fn truncate_stage_in_isolation() {
        let stage = TruncateStage::new(1);
        let input = vec![SearchResult::new(1, "a", "", 1.0), SearchResult::new(2, "b", "", 0.5)];
        let out = stage.apply("q", input).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(stage.name(), "truncate");
    }
}
