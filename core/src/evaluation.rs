//! Retrieval quality against a golden dataset of queries and relevant titles.

use crate::error::{Result, SearchError};
use crate::types::SearchResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub query: String,
    /// Titles of the movies that should be retrieved.
    pub relevant_docs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenDataset {
    pub test_cases: Vec<TestCase>,
}

pub fn load_golden_dataset<P: AsRef<Path>>(path: P) -> Result<GoldenDataset> {
    let f = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(f))?)
}

/// Relevant titles among the first `k` retrieved, divided by `k`.
pub fn precision_at_k(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let hits = retrieved.iter().take(k).filter(|t| relevant.contains(*t)).count();
    hits as f64 / k as f64
}

/// Relevant titles among the first `k` retrieved, divided by the number of relevant titles.
pub fn recall_at_k(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let found: HashSet<&String> = retrieved.iter().take(k).filter(|t| relevant.contains(*t)).collect();
    found.len() as f64 / relevant.len() as f64
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryEvaluation {
    pub query: String,
    pub precision: f64,
    pub recall: f64,
    pub retrieved: Vec<String>,
    pub relevant: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub test_cases_count: usize,
    pub limit: usize,
    pub mean_precision: f64,
    pub mean_recall: f64,
    pub results: Vec<QueryEvaluation>,
}

/// Run `search` for every test case and score the returned titles at `limit`.
pub fn evaluate<F>(dataset: &GoldenDataset, limit: usize, mut search: F) -> Result<EvaluationReport>
where
    F: FnMut(&str, usize) -> Result<Vec<SearchResult>>,
{
    if limit == 0 {
        return Err(SearchError::invalid_argument("evaluation limit must be positive"));
    }
    let mut results = Vec::with_capacity(dataset.test_cases.len());
    for case in &dataset.test_cases {
        let retrieved: Vec<String> = search(&case.query, limit)?.into_iter().take(limit).map(|r| r.title).collect();
        let relevant: HashSet<String> = case.relevant_docs.iter().cloned().collect();
        let evaluation = QueryEvaluation {
            query: case.query.clone(),
            precision: precision_at_k(&retrieved, &relevant, limit),
            recall: recall_at_k(&retrieved, &relevant, limit),
            retrieved,
            relevant: case.relevant_docs.clone(),
        };
        debug!(query = %case.query, precision = evaluation.precision, recall = evaluation.recall, "evaluated query");
        results.push(evaluation);
    }
    let n = results.len();
    let mean = |f: fn(&QueryEvaluation) -> f64| if n == 0 { 0.0 } else { results.iter().map(f).sum::<f64>() / n as f64 };
    Ok(EvaluationReport {
        test_cases_count: n,
        limit,
        mean_precision: mean(|e| e.precision),
        mean_recall: mean(|e| e.recall),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(ts: &[&str]) -> Vec<String> {
        ts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn precision_divides_by_k() {
        let relevant: HashSet<String> = titles(&["Heat", "Ronin"]).into_iter().collect();
        let retrieved = titles(&["Heat", "Alien"]);
        assert_eq!(precision_at_k(&retrieved, &relevant, 5), 0.2);
        assert_eq!(precision_at_k(&retrieved, &relevant, 1), 1.0);
        assert_eq!(recall_at_k(&retrieved, &relevant, 5), 0.5);
        assert_eq!(recall_at_k(&retrieved, &HashSet::new(), 5), 0.0);
    }

    #[test]
    fn evaluate_reports_means() {
        let dataset = GoldenDataset {
            test_cases: vec![
                TestCase { query: "heist".into(), relevant_docs: titles(&["Heat"]) },
                TestCase { query: "space".into(), relevant_docs: titles(&["Alien"]) },
            ],
        };
        let report = evaluate(&dataset, 2, |query, _limit| {
            let title = if query == "heist" { "Heat" } else { "Paddington" };
            Ok(vec![SearchResult::new(1, title, "", 1.0)])
        })
        .unwrap();
        assert_eq!(report.test_cases_count, 2);
        assert_eq!(report.results[0].precision, 0.5);
        assert_eq!(report.results[1].recall, 0.0);
        assert_eq!(report.mean_precision, 0.25);
        assert_eq!(report.mean_recall, 0.5);
    }

    #[test]
    fn dataset_json_shape() {
        let json = r#"{"test_cases": [{"query": "bear", "relevant_docs": ["Paddington"]}]}"#;
        let dataset: GoldenDataset = serde_json::from_str(json).unwrap();
        assert_eq!(dataset.test_cases[0].relevant_docs, vec!["Paddington"]);
    }
}
