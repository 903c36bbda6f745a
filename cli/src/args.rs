use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use reelsearch_core::config::{BM25_B, BM25_K1, DEFAULT_ALPHA, DEFAULT_RRF_K, DEFAULT_SEARCH_LIMIT};
use reelsearch_core::enhance::EnhanceMethod;
use reelsearch_core::rerank::RerankMethod;
use reelsearch_core::semantic::CHUNK_MAX_SENTENCES;
use reelsearch_core::DocId;
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "reelsearch")]
#[command(about = "Hybrid keyword and semantic movie search", long_about = None)]
pub struct Cli {
    /// Movie catalog: a JSON file or a directory of JSON files
    #[arg(long, global = true, env = "REELSEARCH_CATALOG", default_value = "data/movies.json")]
    pub catalog: PathBuf,
    /// Directory holding the persisted index
    #[arg(long, global = true, env = "REELSEARCH_CACHE_DIR", default_value = "cache")]
    pub cache_dir: PathBuf,
    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rebuild the index from the catalog and persist it
    Build,
    /// BM25 keyword search
    Search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Semantic search over sentence chunks, each document scoring its best chunk
    SemanticSearch {
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Split text into sentence chunks
    SemanticChunk {
        text: String,
        /// Sentences per chunk
        #[arg(long, default_value_t = CHUNK_MAX_SENTENCES)]
        max_chunk_size: usize,
        /// Sentences shared by consecutive chunks
        #[arg(long, default_value_t = 0)]
        overlap: usize,
    },
    /// Embed text with the local embedder
    EmbedText { text: String },
    /// Blend normalized BM25 and semantic scores
    WeightedSearch {
        query: String,
        /// Weight of the keyword side, in [0, 1]
        #[arg(long, default_value_t = DEFAULT_ALPHA)]
        alpha: f64,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Reciprocal Rank Fusion of BM25 and semantic rankings
    RrfSearch {
        query: String,
        /// Smaller values give top ranks more weight
        #[arg(long, default_value_t = DEFAULT_RRF_K)]
        k: u32,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
        /// Query enhancement: spell, rewrite or expand
        #[arg(long)]
        enhance: Option<EnhanceMethod>,
        /// Rerank method: individual, batch or cross_encoder
        #[arg(long)]
        rerank_method: Option<RerankMethod>,
    },
    /// Term frequency of a term in a document
    Tf { doc_id: DocId, term: String },
    /// Inverse document frequency of a term
    Idf { term: String },
    /// TF-IDF of a term in a document
    Tfidf { doc_id: DocId, term: String },
    /// BM25 IDF of a term
    Bm25idf { term: String },
    /// BM25 saturated term frequency of a term in a document
    Bm25tf {
        doc_id: DocId,
        term: String,
        #[arg(default_value_t = BM25_K1)]
        k1: f64,
        #[arg(default_value_t = BM25_B)]
        b: f64,
    },
    /// Min-max normalize a list of scores
    Normalize {
        #[arg(required = true, allow_negative_numbers = true)]
        scores: Vec<f64>,
    },
    /// Precision@k and recall@k of RRF search over a golden dataset
    Evaluate {
        #[arg(long, default_value = "data/golden_dataset.json")]
        dataset: PathBuf,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
}

/// What the command line asks for.
#[derive(Debug)]
pub enum Invocation {
    Run(Cli),
    /// Unknown subcommand: show the help and exit successfully.
    Help,
}

/// Parse arguments, mapping an unknown subcommand to [`Invocation::Help`].
pub fn parse_args<I, T>(args: I) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(Invocation::Run(cli)),
        Err(e) if e.kind() == ErrorKind::InvalidSubcommand => Ok(Invocation::Help),
        Err(e) => Err(e),
    }
}

pub fn help_text() -> String {
    Cli::command().render_help().to_string()
}
