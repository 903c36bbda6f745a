//! Tunable constants and the search configuration bundle.

use crate::keyword::Bm25Params;

/// Term frequency saturation.
pub const BM25_K1: f64 = 1.5;
/// Document length normalization strength.
pub const BM25_B: f64 = 0.75;

pub const DEFAULT_ALPHA: f64 = 0.5;
pub const DEFAULT_RRF_K: u32 = 60;
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Decimal digits kept in `SearchResult::score`.
pub const SCORE_PRECISION: i32 = 3;

/// Candidates requested from each ranker per requested result before fusing.
pub const CANDIDATE_MULTIPLIER: usize = 500;
/// Fused results handed to a reranker per requested result.
pub const RERANK_MULTIPLIER: usize = 5;

pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    pub bm25: Bm25Params,
    pub candidate_multiplier: usize,
    pub rerank_multiplier: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bm25: Bm25Params::default(),
            candidate_multiplier: CANDIDATE_MULTIPLIER,
            rerank_multiplier: RERANK_MULTIPLIER,
        }
    }
}

impl SearchConfig {
    /// Number of candidates each ranker should produce for a fused result list of `limit`.
    pub fn candidate_limit(&self, limit: usize) -> usize {
        limit.saturating_mul(self.candidate_multiplier.max(1))
    }
}
