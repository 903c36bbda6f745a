use reelsearch_core::config::SearchConfig;
use reelsearch_core::fusion::{normalize_scores, rrf_fusion, rrf_score, weighted_fusion, HybridSearch};
use reelsearch_core::keyword::KeywordRanker;
use reelsearch_core::semantic::{EmbeddingRanker, HashEmbedder};
use reelsearch_core::tokenizer::TextNormalizer;
use reelsearch_core::{DocId, Document, InvertedIndex, Ranker, Result, SearchError, SearchResult};
use std::sync::Arc;

fn list(ids: &[DocId]) -> Vec<SearchResult> {
    ids.iter().enumerate().map(|(i, &id)| SearchResult::new(id, format!("doc {id}"), "", 10.0 - i as f64)).collect()
}

#[test]
fn rrf_worked_example() {
    // A = 1, B = 2, C = 3
    let fused = rrf_fusion(&list(&[1, 2]), &list(&[2, 3]), 60, 10);
    assert_eq!(fused.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1, 3]);
    let score = |id: DocId| fused.iter().find(|r| r.id == id).unwrap().metadata["rrf_score"].as_f64().unwrap();
    assert!((score(1) - 1.0 / 61.0).abs() < 1e-12);
    assert!((score(2) - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
    assert!((score(3) - 1.0 / 62.0).abs() < 1e-12);
}

#[test]
fn rank_one_on_both_sides_beats_rank_one_on_one_side() {
    for k in [1, 2, 10, 60, 1000] {
        let both = rrf_fusion(&list(&[1]), &list(&[1]), k, 1);
        let one = rrf_fusion(&list(&[1]), &[], k, 1);
        let score = |r: &[SearchResult]| r[0].metadata["rrf_score"].as_f64().unwrap();
        assert!(score(&both) > score(&one));
    }
}

#[test]
fn equal_scores_normalize_to_one() {
    for scores in [vec![0.0], vec![4.2, 4.2], vec![-1.0, -1.0, -1.0]] {
        assert!(normalize_scores(&scores).iter().all(|&s| s == 1.0));
    }
}

#[test]
fn weighted_fusion_with_flat_lists() {
    let kw = vec![SearchResult::new(1, "a", "", 2.0), SearchResult::new(2, "b", "", 2.0)];
    let fused = weighted_fusion(&kw, &[], 0.5, 5).unwrap();
    assert!(fused.iter().all(|r| r.score == 0.5));
    assert_eq!(fused.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
}

struct Fixed(Vec<DocId>);

impl Ranker for Fixed {
    fn rank(&self, _query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        Ok(list(&self.0).into_iter().take(limit).collect())
    }
}

struct Broken;

impl Ranker for Broken {
    fn rank(&self, _query: &str, _limit: usize) -> Result<Vec<SearchResult>> {
        Err(SearchError::collaborator("embedding service unavailable"))
    }
}

struct NotANumber;

impl Ranker for NotANumber {
    fn rank(&self, _query: &str, _limit: usize) -> Result<Vec<SearchResult>> {
        Ok(vec![SearchResult::new(9, "doc 9", "", f64::NAN)])
    }
}

#[test]
fn hybrid_search_with_fake_rankers() {
    let hybrid = HybridSearch::new(Arc::new(Fixed(vec![1, 2])), Arc::new(Fixed(vec![2, 3])));
    let rrf = hybrid.rrf_search("anything", 60, 2).unwrap();
    assert_eq!(rrf.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1]);
    // 1 and 2 tie at 0.5 after normalization, 3 scores 0
    let weighted = hybrid.weighted_search("anything", 0.5, 3).unwrap();
    assert_eq!(weighted.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(matches!(hybrid.weighted_search("anything", 2.0, 3), Err(SearchError::InvalidArgument(_))));
    assert!(hybrid.rrf_search("anything", 60, 0).unwrap().is_empty());
}

#[test]
fn hybrid_search_surfaces_ranker_failures() {
    let hybrid = HybridSearch::new(Arc::new(Fixed(vec![1])), Arc::new(Broken));
    assert!(matches!(hybrid.rrf_search("q", 60, 5), Err(SearchError::Collaborator(_))));
}

#[test]
fn hybrid_search_rejects_non_finite_scores() {
    let hybrid = HybridSearch::new(Arc::new(Fixed(vec![1, 2])), Arc::new(NotANumber));
    assert!(matches!(hybrid.rrf_search("q", 60, 5), Err(SearchError::Collaborator(_))));
    assert!(matches!(hybrid.weighted_search("q", 0.5, 5), Err(SearchError::Collaborator(_))));
}

#[test]
fn blank_query_has_no_results() {
    let hybrid = HybridSearch::new(Arc::new(Fixed(vec![1])), Arc::new(Broken));
    assert!(hybrid.rrf_search("   ", 60, 5).unwrap().is_empty());
    assert!(hybrid.weighted_search("", 0.5, 5).unwrap().is_empty());
}

#[test]
fn candidate_limit_is_oversampled() {
    let config = SearchConfig::default();
    assert_eq!(config.candidate_limit(5), 2500);
    assert_eq!(config.candidate_limit(usize::MAX), usize::MAX);
}

#[test]
fn real_rankers_agree_on_an_obvious_match() {
    let docs = vec![
        Document::new(1, "Paddington", "A bear moves to London. He loves marmalade sandwiches."),
        Document::new(2, "Alien", "The crew of a space tug meets a deadly creature."),
        Document::new(3, "Heat", "A detective hunts a crew of professional thieves."),
    ];
    let index = InvertedIndex::from_documents(docs.clone(), &TextNormalizer).unwrap();
    let keyword = KeywordRanker::new(Arc::new(index), Arc::new(TextNormalizer));
    let semantic = EmbeddingRanker::build(&docs, Arc::new(HashEmbedder::default())).unwrap();
    let hybrid = HybridSearch::new(Arc::new(keyword), Arc::new(semantic));
    let results = hybrid.rrf_search("bear marmalade", 60, 2).unwrap();
    assert_eq!(results[0].id, 1);
    assert_eq!(results[0].metadata["kw_rank"], 1);
    assert_eq!(results[0].metadata["sm_rank"], 1);

    let everything = hybrid.rrf_search("bear", 60, 1usize << 40).unwrap();
    assert_eq!(everything.len(), 3);
}
