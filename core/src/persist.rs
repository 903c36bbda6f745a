use crate::config::INDEX_FORMAT_VERSION;
use crate::error::{Result, SearchError};
use crate::index::{DocLengths, DocMap, Document, InvertedIndex, Postings, TermFrequencies};
use crate::tokenizer::Tokenizer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, remove_file, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: usize,
    pub num_terms: usize,
    pub created_at: String,
    pub version: u32,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn postings(&self) -> PathBuf { self.root.join("postings.bin") }
    pub fn term_frequencies(&self) -> PathBuf { self.root.join("term_frequencies.bin") }
    pub fn doc_lengths(&self) -> PathBuf { self.root.join("doc_lengths.bin") }
    pub fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }

    /// Every file of one persisted index; the manifest is last.
    pub fn all(&self) -> [PathBuf; 5] {
        [self.postings(), self.term_frequencies(), self.doc_lengths(), self.docs(), self.meta()]
    }

    pub fn exists(&self) -> bool {
        self.all().iter().all(|p| p.is_file())
    }
}

fn save_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut w, value)?;
    w.flush()?;
    Ok(())
}

fn load_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let r = BufReader::new(File::open(path)?);
    bincode::deserialize_from(r).map_err(|e| SearchError::CorruptCache(format!("{}: {e}", path.display())))
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let f = File::open(paths.meta())?;
    serde_json::from_reader(BufReader::new(f))
        .map_err(|e| SearchError::CorruptCache(format!("{}: {e}", paths.meta().display())))
}

/// Write the four index structures and the manifest. Any previous manifest is
/// removed first and the new one written last, so a crash mid-save leaves an
/// index that reports as missing rather than half written.
pub fn save_index(paths: &IndexPaths, index: &InvertedIndex) -> Result<MetaFile> {
    create_dir_all(&paths.root)?;
    match remove_file(paths.meta()) {
        Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }
    save_bin(&paths.postings(), index.postings())?;
    save_bin(&paths.term_frequencies(), index.term_frequencies())?;
    save_bin(&paths.doc_lengths(), index.doc_lengths())?;
    save_bin(&paths.docs(), index.docs())?;
    let meta = MetaFile {
        num_docs: index.num_documents(),
        num_terms: index.num_terms(),
        created_at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        version: INDEX_FORMAT_VERSION,
    };
    save_meta(paths, &meta)?;
    info!(root = %paths.root.display(), num_docs = meta.num_docs, num_terms = meta.num_terms, "saved index");
    Ok(meta)
}

pub fn load_index(paths: &IndexPaths) -> Result<InvertedIndex> {
    if let Some(missing) = paths.all().iter().find(|p| !p.is_file()) {
        return Err(SearchError::MissingCache(format!("{} not found", missing.display())));
    }
    let meta = load_meta(paths)?;
    if meta.version != INDEX_FORMAT_VERSION {
        return Err(SearchError::MissingCache(format!(
            "index format version {} does not match {INDEX_FORMAT_VERSION}",
            meta.version
        )));
    }
    let postings: Postings = load_bin(&paths.postings())?;
    let term_frequencies: TermFrequencies = load_bin(&paths.term_frequencies())?;
    let doc_lengths: DocLengths = load_bin(&paths.doc_lengths())?;
    let docs: DocMap = load_bin(&paths.docs())?;
    let index = InvertedIndex::from_parts(postings, term_frequencies, doc_lengths, docs)?;
    if index.num_documents() != meta.num_docs {
        return Err(SearchError::CorruptCache(format!(
            "manifest lists {} documents, index holds {}",
            meta.num_docs,
            index.num_documents()
        )));
    }
    info!(root = %paths.root.display(), num_docs = meta.num_docs, num_terms = meta.num_terms, "loaded index");
    Ok(index)
}

/// Load the persisted index. When the cache is missing, `documents` supplies the
/// catalog and the rebuilt index is saved before it is returned.
pub fn load_or_build<F>(paths: &IndexPaths, tokenizer: &dyn Tokenizer, documents: F) -> Result<InvertedIndex>
where
    F: FnOnce() -> Result<Vec<Document>>,
{
    match load_index(paths) {
        Ok(index) => Ok(index),
        Err(SearchError::MissingCache(reason)) => {
            warn!(%reason, "index cache missing, rebuilding");
            let index = InvertedIndex::from_documents(documents()?, tokenizer)?;
            save_index(paths, &index)?;
            Ok(index)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::TextNormalizer;
    use tempfile::tempdir;

    fn docs() -> Vec<Document> {
        vec![Document::new(1, "Heat", "A heist in Los Angeles."), Document::new(2, "Ronin", "A heist in France.")]
    }

    #[test]
    fn meta_records_counts_and_version() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let index = InvertedIndex::from_documents(docs(), &TextNormalizer).unwrap();
        let meta = save_index(&paths, &index).unwrap();
        assert_eq!(meta.num_docs, 2);
        assert_eq!(meta.version, INDEX_FORMAT_VERSION);
        assert!(OffsetDateTime::parse(&meta.created_at, &Rfc3339).is_ok());
        assert_eq!(load_meta(&paths).unwrap(), meta);
    }

    #[test]
    fn load_or_build_rebuilds_once() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path().join("cache"));
        assert!(!paths.exists());
        let built = load_or_build(&paths, &TextNormalizer, || Ok(docs())).unwrap();
        assert!(paths.exists());
        // second call reads the cache and never asks for the catalog
        let loaded = load_or_build(&paths, &TextNormalizer, || panic!("catalog requested")).unwrap();
        assert_eq!(built, loaded);
    }

    #[test]
    fn failed_overwrite_reports_missing() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let index = InvertedIndex::from_documents(docs(), &TextNormalizer).unwrap();
        save_index(&paths, &index).unwrap();
        // a directory where a part file belongs makes the second save fail midway
        std::fs::remove_file(paths.docs()).unwrap();
        std::fs::create_dir(paths.docs()).unwrap();
        assert!(save_index(&paths, &index).is_err());
        assert!(!paths.meta().exists());
        assert!(matches!(load_index(&paths), Err(SearchError::MissingCache(_))));
    }

    #[test]
    fn garbage_part_is_corrupt() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let index = InvertedIndex::from_documents(docs(), &TextNormalizer).unwrap();
        save_index(&paths, &index).unwrap();
        std::fs::write(paths.doc_lengths(), b"\xff").unwrap();
        assert!(matches!(load_index(&paths), Err(SearchError::CorruptCache(_))));
    }
}
