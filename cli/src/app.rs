use anyhow::{Context, Result};
use reelsearch_core::catalog::load_catalog;
use reelsearch_core::config::SearchConfig;
use reelsearch_core::enhance::LexiconEnhancer;
use reelsearch_core::fusion::HybridSearch;
use reelsearch_core::keyword::KeywordRanker;
use reelsearch_core::persist::{load_or_build, save_index, IndexPaths};
use reelsearch_core::rerank::{reranker_for, OverlapScorer, RerankMethod, Reranker};
use reelsearch_core::semantic::{EmbeddingRanker, HashEmbedder};
use reelsearch_core::tokenizer::{TextNormalizer, Tokenizer};
use reelsearch_core::{Document, InvertedIndex};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Index and collaborators shared by every search command.
pub struct AppContext {
    index: Arc<InvertedIndex>,
    tokenizer: Arc<dyn Tokenizer>,
    config: SearchConfig,
}

impl AppContext {
    /// Load the cached index, building it from the catalog when the cache is missing.
    pub fn load(catalog: &Path, cache_dir: &Path) -> Result<Self> {
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(TextNormalizer);
        let paths = IndexPaths::new(cache_dir);
        let index = load_or_build(&paths, tokenizer.as_ref(), || load_catalog(catalog))
            .with_context(|| format!("loading index from {}", cache_dir.display()))?;
        tracing::info!(num_docs = index.num_documents(), cache_dir = %cache_dir.display(), "index ready");
        Ok(Self { index: Arc::new(index), tokenizer, config: SearchConfig::default() })
    }

    pub fn documents(&self) -> Vec<Document> {
        self.index.documents().cloned().collect()
    }

    pub fn keyword(&self) -> KeywordRanker {
        KeywordRanker::new(Arc::clone(&self.index), Arc::clone(&self.tokenizer)).with_params(self.config.bm25)
    }

    pub fn semantic(&self) -> Result<EmbeddingRanker> {
        Ok(EmbeddingRanker::build(&self.documents(), Arc::new(HashEmbedder::default()))?)
    }

    pub fn hybrid(&self) -> Result<HybridSearch> {
        Ok(HybridSearch::new(Arc::new(self.keyword()), Arc::new(self.semantic()?)).with_config(self.config))
    }

    pub fn enhancer(&self) -> LexiconEnhancer {
        LexiconEnhancer::from_documents(self.index.documents())
    }

    pub fn reranker(&self, method: RerankMethod) -> Arc<dyn Reranker> {
        reranker_for(method, Arc::new(OverlapScorer::new(Arc::clone(&self.tokenizer))))
    }
}

pub struct BuildSummary {
    pub num_docs: usize,
    pub num_terms: usize,
    pub cache_dir: PathBuf,
}

/// Rebuild the index from the catalog and overwrite the cache.
pub fn build(catalog: &Path, cache_dir: &Path) -> Result<BuildSummary> {
    let documents = load_catalog(catalog).with_context(|| format!("reading catalog {}", catalog.display()))?;
    let index = InvertedIndex::from_documents(documents, &TextNormalizer)?;
    let meta = save_index(&IndexPaths::new(cache_dir), &index)?;
    tracing::info!(num_docs = meta.num_docs, num_terms = meta.num_terms, "index build complete");
    Ok(BuildSummary { num_docs: meta.num_docs, num_terms: meta.num_terms, cache_dir: cache_dir.to_path_buf() })
}
