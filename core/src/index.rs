use crate::error::{Result, SearchError};
use crate::keyword::Bm25Params;
use crate::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

pub type DocId = u32;

/// Token -> ids of the documents containing it at least once.
pub type Postings = HashMap<String, BTreeSet<DocId>>;
/// Document id -> token -> raw occurrence count.
pub type TermFrequencies = HashMap<DocId, HashMap<String, u32>>;
/// Document id -> number of tokens after normalization.
pub type DocLengths = HashMap<DocId, u32>;
pub type DocMap = BTreeMap<DocId, Document>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub body: String,
}

impl Document {
    pub fn new(id: DocId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { id, title: title.into(), body: body.into() }
    }

    /// Title and body joined by a space; empty fields are skipped.
    pub fn text(&self) -> String {
        [self.title.trim(), self.body.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Keyword index over a fixed document set.
///
/// Owns the posting sets, the per-document term counts, the document lengths and
/// the documents themselves. These four always describe the same document set;
/// `persist` saves and loads them together.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InvertedIndex {
    postings: Postings,
    term_frequencies: TermFrequencies,
    doc_lengths: DocLengths,
    docs: DocMap,
    total_length: u64,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh index from `documents`.
    pub fn from_documents<I>(documents: I, tokenizer: &dyn Tokenizer) -> Result<Self>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut index = Self::new();
        index.build(documents, tokenizer)?;
        Ok(index)
    }

    /// Index every document. Only valid on a pristine index: building twice into
    /// the same instance is rejected instead of merging the two document sets.
    pub fn build<I>(&mut self, documents: I, tokenizer: &dyn Tokenizer) -> Result<()>
    where
        I: IntoIterator<Item = Document>,
    {
        if !self.is_empty() {
            return Err(SearchError::invalid_argument("index is already built; create a new index to rebuild"));
        }
        let documents: Vec<Document> = documents.into_iter().collect();
        let mut seen: HashSet<DocId> = HashSet::with_capacity(documents.len());
        for doc in &documents {
            if !seen.insert(doc.id) {
                return Err(SearchError::invalid_argument(format!("duplicate document id {}", doc.id)));
            }
        }

        for doc in documents {
            self.add_document(doc, tokenizer);
        }
        info!(num_docs = self.docs.len(), num_terms = self.postings.len(), "built inverted index");
        Ok(())
    }

    fn add_document(&mut self, doc: Document, tokenizer: &dyn Tokenizer) {
        let tokens = tokenizer.normalize(&doc.text());
        let doc_id = doc.id;

        let mut tf_counts: HashMap<String, u32> = HashMap::new();
        for token in tokens.iter() {
            *tf_counts.entry(token.clone()).or_insert(0) += 1;
        }
        for token in tf_counts.keys() {
            self.postings.entry(token.clone()).or_default().insert(doc_id);
        }
        debug!(doc_id, len = tokens.len(), distinct = tf_counts.len(), "indexed document");

        self.doc_lengths.insert(doc_id, tokens.len() as u32);
        self.total_length += tokens.len() as u64;
        self.term_frequencies.insert(doc_id, tf_counts);
        self.docs.insert(doc_id, doc);
    }

    /// Reassemble an index from its persisted parts, checking they agree.
    pub fn from_parts(postings: Postings, term_frequencies: TermFrequencies, doc_lengths: DocLengths, docs: DocMap) -> Result<Self> {
        let doc_ids: BTreeSet<DocId> = docs.keys().copied().collect();
        if doc_lengths.keys().copied().collect::<BTreeSet<_>>() != doc_ids {
            return Err(SearchError::CorruptCache("document lengths do not cover the document map".into()));
        }
        if term_frequencies.keys().copied().collect::<BTreeSet<_>>() != doc_ids {
            return Err(SearchError::CorruptCache("term frequencies do not cover the document map".into()));
        }
        if let Some(id) = postings.values().flatten().find(|id| !doc_ids.contains(id)) {
            return Err(SearchError::CorruptCache(format!("posting references unknown document {id}")));
        }
        let total_length = doc_lengths.values().map(|&l| l as u64).sum();
        Ok(Self { postings, term_frequencies, doc_lengths, docs, total_length })
    }

    pub fn postings(&self) -> &Postings {
        &self.postings
    }

    pub fn term_frequencies(&self) -> &TermFrequencies {
        &self.term_frequencies
    }

    pub fn doc_lengths(&self) -> &DocLengths {
        &self.doc_lengths
    }

    pub fn docs(&self) -> &DocMap {
        &self.docs
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn num_documents(&self) -> usize {
        self.docs.len()
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    pub fn document(&self, doc_id: DocId) -> Option<&Document> {
        self.docs.get(&doc_id)
    }

    /// Documents in ascending id order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub fn document_length(&self, doc_id: DocId) -> Result<u32> {
        self.doc_lengths.get(&doc_id).copied().ok_or(SearchError::UnknownDocument(doc_id))
    }

    /// Mean document length; 0.0 for an empty index.
    pub fn average_document_length(&self) -> f64 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        self.total_length as f64 / self.doc_lengths.len() as f64
    }

    /// Ids of the documents containing `token`, ascending. Unknown tokens yield nothing.
    pub fn documents_containing(&self, token: &str) -> Vec<DocId> {
        self.postings.get(token).map(|ids| ids.iter().copied().collect()).unwrap_or_default()
    }

    pub fn document_frequency(&self, token: &str) -> usize {
        self.postings.get(token).map_or(0, BTreeSet::len)
    }

    /// Raw count of `token` in `doc_id`.
    pub fn term_frequency(&self, doc_id: DocId, token: &str) -> Result<u32> {
        check_single_token(token)?;
        let counts = self.term_frequencies.get(&doc_id).ok_or(SearchError::UnknownDocument(doc_id))?;
        Ok(counts.get(token).copied().unwrap_or(0))
    }

    /// Smoothed IDF: `ln((N + 1) / (df + 1))`.
    pub fn inverse_document_frequency(&self, token: &str) -> Result<f64> {
        check_single_token(token)?;
        let n = self.num_documents() as f64;
        let df = self.document_frequency(token) as f64;
        Ok(((n + 1.0) / (df + 1.0)).ln())
    }

    pub fn tf_idf(&self, doc_id: DocId, token: &str) -> Result<f64> {
        let tf = self.term_frequency(doc_id, token)? as f64;
        Ok(tf * self.inverse_document_frequency(token)?)
    }

    /// BM25 IDF: `ln((N - df + 0.5) / (df + 0.5) + 1)`.
    ///
    /// Shrinks toward zero as `df` approaches `N`; unknown tokens (df = 0) score highest.
    pub fn bm25_idf(&self, token: &str) -> Result<f64> {
        check_single_token(token)?;
        Ok(bm25_idf_for(self.num_documents(), self.document_frequency(token)))
    }

    /// Saturated, length-normalized term frequency.
    pub fn bm25_tf(&self, doc_id: DocId, token: &str, params: Bm25Params) -> Result<f64> {
        params.validate()?;
        if self.is_empty() {
            return Err(SearchError::EmptyIndex);
        }
        let tf = self.term_frequency(doc_id, token)?;
        let len = self.document_length(doc_id)?;
        Ok(bm25_tf_for(tf, len, self.average_document_length(), params))
    }

    pub fn bm25(&self, doc_id: DocId, token: &str) -> Result<f64> {
        self.bm25_with(doc_id, token, Bm25Params::default())
    }

    pub fn bm25_with(&self, doc_id: DocId, token: &str, params: Bm25Params) -> Result<f64> {
        Ok(self.bm25_tf(doc_id, token, params)? * self.bm25_idf(token)?)
    }
}

/// A token passed to the statistics calls must be a single normalized token.
fn check_single_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(SearchError::invalid_argument("expected a single token, got an empty string"));
    }
    if token.chars().any(char::is_whitespace) {
        return Err(SearchError::invalid_argument(format!("expected a single token, got {token:?}")));
    }
    Ok(())
}

pub(crate) fn bm25_idf_for(num_docs: usize, df: usize) -> f64 {
    let n = num_docs as f64;
    let df = df as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

pub(crate) fn bm25_tf_for(tf: u32, doc_len: u32, avg_len: f64, params: Bm25Params) -> f64 {
    let tf = tf as f64;
    // all-empty corpus: every length equals the (zero) mean
    let length_ratio = if avg_len > 0.0 { doc_len as f64 / avg_len } else { 1.0 };
    let denom = tf + params.k1 * (1.0 - params.b + params.b * length_ratio);
    if denom <= 0.0 {
        return 0.0;
    }
    (tf * (params.k1 + 1.0)) / denom
}
