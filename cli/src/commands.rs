use crate::app::{build, AppContext};
use crate::args::{Cli, Commands};
use anyhow::{ensure, Result};
use reelsearch_core::evaluation::{evaluate, load_golden_dataset, EvaluationReport};
use reelsearch_core::fusion::{normalize_scores, validate_alpha};
use reelsearch_core::keyword::Bm25Params;
use reelsearch_core::pipeline::{RrfPipeline, RrfSearchOutcome};
use reelsearch_core::semantic::{chunk_sentences, Embedder, HashEmbedder};
use reelsearch_core::SearchResult;
use serde::Serialize;
use serde_json::json;
use std::fmt::Write;
use std::sync::Arc;

/// Characters of each document shown under a result.
const PREVIEW_CHARS: usize = 100;

/// Execute a parsed command line. `None` means no subcommand was given.
pub fn run(cli: Cli) -> Result<Option<String>> {
    let Some(command) = cli.command else {
        return Ok(None);
    };
    let json = cli.json;
    let output = match command {
        Commands::Build => {
            let summary = build(&cli.catalog, &cli.cache_dir)?;
            let value = json!({
                "num_docs": summary.num_docs,
                "num_terms": summary.num_terms,
                "cache_dir": summary.cache_dir.display().to_string(),
            });
            render(json, &value, || {
                format!(
                    "Built index of {} documents ({} terms) in {}",
                    summary.num_docs,
                    summary.num_terms,
                    summary.cache_dir.display()
                )
            })?
        }
        Commands::Search { query, limit } => {
            ensure!(limit > 0, "limit must be positive");
            let ctx = AppContext::load(&cli.catalog, &cli.cache_dir)?;
            let results = ctx.keyword().search(&query, limit)?;
            render(json, &results, || keyword_text(&query, &results))?
        }
        Commands::SemanticSearch { query, limit } => {
            ensure!(limit > 0, "limit must be positive");
            let ctx = AppContext::load(&cli.catalog, &cli.cache_dir)?;
            let results = ctx.semantic()?.search(&query, limit)?;
            render(json, &results, || semantic_text(&results))?
        }
        Commands::SemanticChunk { text, max_chunk_size, overlap } => {
            ensure!(max_chunk_size > 0, "max chunk size must be positive");
            ensure!(overlap < max_chunk_size, "overlap must be smaller than the max chunk size");
            let chunks = chunk_sentences(&text, max_chunk_size, overlap);
            render(json, &chunks, || {
                let mut out = format!("Semantically chunking {} characters", text.chars().count());
                for (i, chunk) in chunks.iter().enumerate() {
                    let _ = write!(out, "\n{}. {chunk}", i + 1);
                }
                out
            })?
        }
        Commands::EmbedText { text } => {
            let embedder = HashEmbedder::default();
            let embedding = embedder.embed(&text)?;
            let value = json!({ "text": text, "dimensions": embedding.len(), "embedding": embedding });
            render(json, &value, || {
                format!(
                    "Text: {text}\nFirst 3 dimensions: {:?}\nDimensions: {}",
                    &embedding[..embedding.len().min(3)],
                    embedding.len()
                )
            })?
        }
        Commands::WeightedSearch { query, alpha, limit } => {
            ensure!(limit > 0, "limit must be positive");
            validate_alpha(alpha)?;
            let ctx = AppContext::load(&cli.catalog, &cli.cache_dir)?;
            let results = ctx.hybrid()?.weighted_search(&query, alpha, limit)?;
            render(json, &results, || weighted_text(&results))?
        }
        Commands::RrfSearch { query, k, limit, enhance, rerank_method } => {
            ensure!(limit > 0, "limit must be positive");
            let ctx = AppContext::load(&cli.catalog, &cli.cache_dir)?;
            let mut pipeline = RrfPipeline::new(ctx.hybrid()?).with_k(k);
            if let Some(method) = enhance {
                pipeline = pipeline.with_enhancer(Arc::new(ctx.enhancer()), method);
            }
            if let Some(method) = rerank_method {
                pipeline = pipeline.with_reranker(ctx.reranker(method));
            }
            let outcome = pipeline.run(&query, limit)?;
            render(json, &outcome, || rrf_text(&outcome))?
        }
        Commands::Tf { doc_id, term } => {
            let ctx = AppContext::load(&cli.catalog, &cli.cache_dir)?;
            let tf = ctx.keyword().term_frequency(doc_id, &term)?;
            let value = json!({ "doc_id": doc_id, "term": term, "tf": tf });
            render(json, &value, || format!("Term frequency of '{term}' in document '{doc_id}': {tf}"))?
        }
        Commands::Idf { term } => {
            let ctx = AppContext::load(&cli.catalog, &cli.cache_dir)?;
            let idf = ctx.keyword().inverse_document_frequency(&term)?;
            let value = json!({ "term": term, "idf": idf });
            render(json, &value, || format!("Inverse document frequency of '{term}': {idf:.2}"))?
        }
        Commands::Tfidf { doc_id, term } => {
            let ctx = AppContext::load(&cli.catalog, &cli.cache_dir)?;
            let tf_idf = ctx.keyword().tf_idf(doc_id, &term)?;
            let value = json!({ "doc_id": doc_id, "term": term, "tf_idf": tf_idf });
            render(json, &value, || format!("TF-IDF score of '{term}' in document '{doc_id}': {tf_idf:.2}"))?
        }
        Commands::Bm25idf { term } => {
            let ctx = AppContext::load(&cli.catalog, &cli.cache_dir)?;
            let bm25_idf = ctx.keyword().bm25_idf(&term)?;
            let value = json!({ "term": term, "bm25_idf": bm25_idf });
            render(json, &value, || format!("BM25 IDF score of '{term}': {bm25_idf:.2}"))?
        }
        Commands::Bm25tf { doc_id, term, k1, b } => {
            let params = Bm25Params::new(k1, b)?;
            let ctx = AppContext::load(&cli.catalog, &cli.cache_dir)?;
            let bm25_tf = ctx.keyword().bm25_tf(doc_id, &term, params)?;
            let value = json!({ "doc_id": doc_id, "term": term, "k1": k1, "b": b, "bm25_tf": bm25_tf });
            render(json, &value, || format!("BM25 TF score of '{term}' in document '{doc_id}': {bm25_tf:.2}"))?
        }
        Commands::Normalize { scores } => {
            ensure!(scores.iter().all(|s| s.is_finite()), "scores must be finite numbers");
            let normalized = normalize_scores(&scores);
            render(json, &normalized, || normalized.iter().map(|s| format!("* {s:.4}")).collect::<Vec<_>>().join("\n"))?
        }
        Commands::Evaluate { dataset, limit } => {
            ensure!(limit > 0, "limit must be positive");
            let golden = load_golden_dataset(&dataset)?;
            let ctx = AppContext::load(&cli.catalog, &cli.cache_dir)?;
            let pipeline = RrfPipeline::new(ctx.hybrid()?);
            let report = evaluate(&golden, limit, |query, limit| Ok(pipeline.run(query, limit)?.results))?;
            render(json, &report, || evaluation_text(&report))?
        }
    };
    Ok(Some(output))
}

fn render<T, F>(json: bool, value: &T, text: F) -> Result<String>
where
    T: Serialize + ?Sized,
    F: FnOnce() -> String,
{
    if json {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(text())
    }
}

fn metadata_f64(result: &SearchResult, key: &str) -> Option<f64> {
    result.metadata.get(key).and_then(|v| v.as_f64())
}

fn metadata_u64(result: &SearchResult, key: &str) -> Option<u64> {
    result.metadata.get(key).and_then(|v| v.as_u64())
}

fn keyword_text(query: &str, results: &[SearchResult]) -> String {
    let mut out = format!("Searching for: {query}");
    for (i, r) in results.iter().enumerate() {
        let _ = write!(out, "\n{}. {} {}\n   BM25: {:.3}", i + 1, r.id, r.title, r.score);
    }
    out
}

fn semantic_text(results: &[SearchResult]) -> String {
    let mut out = String::new();
    for (i, r) in results.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{}. {} (score: {:.4})\n   {}...", i + 1, r.title, r.score, r.preview(PREVIEW_CHARS));
    }
    out
}

fn weighted_text(results: &[SearchResult]) -> String {
    let mut out = String::new();
    for (i, r) in results.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(
            out,
            "{}. {}\n\tHybrid Score: {:.4}\n\tBM25: {:.4}, Semantic: {:.4}\n\t{}...",
            i + 1,
            r.title,
            r.score,
            metadata_f64(r, "kw_score").unwrap_or(0.0),
            metadata_f64(r, "sm_score").unwrap_or(0.0),
            r.preview(PREVIEW_CHARS)
        );
    }
    out
}

fn rrf_text(outcome: &RrfSearchOutcome) -> String {
    let mut out = String::new();
    if let (Some(method), Some(enhanced)) = (outcome.enhance_method, &outcome.enhanced_query) {
        let _ = writeln!(out, "Enhanced query ({method}): '{}' -> '{enhanced}'\n", outcome.original_query);
    }
    if let (true, Some(method)) = (outcome.reranked, outcome.rerank_method) {
        let _ = writeln!(out, "Reranking top {} results using {method} method...\n", outcome.results.len());
    }
    let _ = write!(out, "Reciprocal Rank Fusion Results for '{}' (k={}):", outcome.query, outcome.k);
    for (i, r) in outcome.results.iter().enumerate() {
        let _ = write!(out, "\n{}. {}", i + 1, r.title);
        if let Some(score) = metadata_f64(r, "individual_score") {
            let _ = write!(out, "\n   Rerank Score: {score:.3}/10");
        }
        if let Some(rank) = metadata_u64(r, "batch_rank") {
            let _ = write!(out, "\n   Rerank Rank: {rank}");
        }
        if let Some(score) = metadata_f64(r, "cross_encoder_score") {
            let _ = write!(out, "\n   Cross Encoder Score: {score:.4}");
        }
        let _ = write!(out, "\n   RRF Score: {:.3}", r.score);
        let ranks: Vec<String> = [("BM25 Rank", "kw_rank"), ("Semantic Rank", "sm_rank")]
            .iter()
            .filter_map(|(label, key)| metadata_u64(r, key).map(|rank| format!("{label}: {rank}")))
            .collect();
        if !ranks.is_empty() {
            let _ = write!(out, "\n   {}", ranks.join(", "));
        }
        let _ = write!(out, "\n   {}...", r.preview(PREVIEW_CHARS));
    }
    out
}

fn evaluation_text(report: &EvaluationReport) -> String {
    let mut out = format!("k={}", report.limit);
    for case in &report.results {
        let _ = write!(
            out,
            "\n\n- Query: {}\n\t- Precision@{k}: {:.4}\n\t- Recall@{k}: {:.4}\n\t- Retrieved: {}\n\t- Relevant: {}",
            case.query,
            case.precision,
            case.recall,
            case.retrieved.join(", "),
            case.relevant.join(", "),
            k = report.limit
        );
    }
    let _ = write!(
        out,
        "\n\nMean Precision@{k}: {:.4}\nMean Recall@{k}: {:.4}",
        report.mean_precision,
        report.mean_recall,
        k = report.limit
    );
    out
}
