//! Movie catalog loading.
//!
//! Accepts `{"movies": [...]}` or a bare array of `{id, title, description}`
//! records. A directory is walked for `*.json` files, read in path order.

use crate::error::{Result, SearchError};
use crate::index::{DocId, Document};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

#[derive(Debug, Deserialize)]
struct MovieRecord {
    id: DocId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "body")]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Wrapped { movies: Vec<MovieRecord> },
    Bare(Vec<MovieRecord>),
}

impl From<MovieRecord> for Document {
    fn from(r: MovieRecord) -> Self {
        Document::new(r.id, r.title.unwrap_or_default(), r.description.unwrap_or_default())
    }
}

pub fn parse_catalog(json: &str) -> Result<Vec<Document>> {
    let file: CatalogFile = serde_json::from_str(json)?;
    Ok(into_documents(file))
}

fn into_documents(file: CatalogFile) -> Vec<Document> {
    let records = match file {
        CatalogFile::Wrapped { movies } => movies,
        CatalogFile::Bare(movies) => movies,
    };
    records.into_iter().map(Document::from).collect()
}

fn catalog_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(SearchError::invalid_argument(format!("catalog {} does not exist", path.display())));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Load every movie under `path`. Document ids must be unique across files.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let mut documents = Vec::new();
    let mut seen = HashSet::new();
    let files = catalog_files(path)?;
    for file in &files {
        let parsed: CatalogFile = serde_json::from_reader(BufReader::new(File::open(file)?))?;
        for doc in into_documents(parsed) {
            if !seen.insert(doc.id) {
                return Err(SearchError::invalid_argument(format!(
                    "duplicate document id {} in {}",
                    doc.id,
                    file.display()
                )));
            }
            documents.push(doc);
        }
    }
    info!(path = %path.display(), files = files.len(), num_docs = documents.len(), "loaded catalog");
    Ok(documents)
}
