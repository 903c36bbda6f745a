//! Vector-similarity ranking.
//!
//! The embedding model is an injected [`Embedder`]; [`HashEmbedder`] is a
//! deterministic, model-free implementation used when no real model is wired in
//! and in tests. Documents are split into sentence chunks and a document scores
//! the best cosine similarity of any of its chunks.

use crate::error::{Result, SearchError};
use crate::index::{DocId, DocMap, Document};
use crate::tokenizer::tokenize;
use crate::topk::top_k;
use crate::types::{Ranker, SearchResult};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const DEFAULT_EMBEDDING_DIM: usize = 384;
pub const CHUNK_MAX_SENTENCES: usize = 4;
pub const CHUNK_OVERLAP_SENTENCES: usize = 1;

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?]\s+").expect("valid regex");
}

/// Maps text to a fixed-size vector.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Feature-hashing embedder: each normalized token is hashed with FNV-1a into one
/// of `dim` buckets with a hash-derived sign, and the result is L2-normalized.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dim: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dim: DEFAULT_EMBEDDING_DIM }
    }
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(SearchError::invalid_argument("embedding dimension must be positive"));
        }
        Ok(Self { dim })
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(SearchError::invalid_argument("cannot embed empty or whitespace-only text"));
        }
        let mut vector = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dim as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

/// Cosine similarity; 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|y| y * y).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Split `text` into chunks of at most `max_sentences` sentences, consecutive
/// chunks sharing `overlap` sentences. A trailing window made only of already
/// covered overlap sentences is dropped.
pub fn chunk_sentences(text: &str, max_sentences: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        sentences.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    let max_sentences = max_sentences.max(1);
    let step = max_sentences.saturating_sub(overlap).max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut i = 0;
    while i < sentences.len() {
        let window = &sentences[i..(i + max_sentences).min(sentences.len())];
        if !chunks.is_empty() && window.len() <= overlap {
            break;
        }
        let chunk = window.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        i += step;
    }
    chunks
}

struct ChunkVector {
    doc_id: DocId,
    vector: Vec<f32>,
}

/// Ranks documents by the best cosine similarity between the query and any chunk.
pub struct EmbeddingRanker {
    embedder: Arc<dyn Embedder>,
    docs: DocMap,
    chunks: Vec<ChunkVector>,
}

impl EmbeddingRanker {
    /// Embed every chunk of every document. Documents with no text at all are not searchable.
    #[instrument(skip_all, fields(num_docs = documents.len()))]
    pub fn build(documents: &[Document], embedder: Arc<dyn Embedder>) -> Result<Self> {
        let mut docs = DocMap::new();
        let mut chunks = Vec::new();
        for doc in documents {
            let mut texts = chunk_sentences(&doc.body, CHUNK_MAX_SENTENCES, CHUNK_OVERLAP_SENTENCES);
            if texts.is_empty() && !doc.title.trim().is_empty() {
                texts.push(doc.title.trim().to_string());
            } else if !doc.title.trim().is_empty() {
                texts = texts.into_iter().map(|c| format!("{}: {}", doc.title.trim(), c)).collect();
            }
            for text in texts {
                let vector = embedder.embed(&text)?;
                check_dimension(&vector, embedder.dimension())?;
                chunks.push(ChunkVector { doc_id: doc.id, vector });
            }
            docs.insert(doc.id, doc.clone());
        }
        info!(num_chunks = chunks.len(), "embedded document chunks");
        Ok(Self { embedder, docs, chunks })
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(SearchError::invalid_argument("query must not be blank"));
        }
        if limit == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query)?;
        check_dimension(&query_vector, self.embedder.dimension())?;

        let mut best: HashMap<DocId, f64> = HashMap::new();
        for chunk in &self.chunks {
            let score = cosine_similarity(&query_vector, &chunk.vector) as f64;
            best.entry(chunk.doc_id).and_modify(|s| *s = s.max(score)).or_insert(score);
        }
        debug!(query, candidates = best.len(), "semantic search");

        top_k(best, limit)
            .into_iter()
            .map(|(doc_id, score)| {
                let doc = self.docs.get(&doc_id).ok_or(SearchError::UnknownDocument(doc_id))?;
                Ok(SearchResult::from_document(doc, score))
            })
            .collect()
    }
}

impl Ranker for EmbeddingRanker {
    fn rank(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.search(query, limit)
    }
}

fn check_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(SearchError::collaborator(format!(
            "embedder returned {} dimensions, expected {expected}",
            vector.len()
        )));
    }
    Ok(())
}
