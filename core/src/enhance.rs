//! Query enhancement applied before retrieval.
//!
//! The enhancer is an injected collaborator. [`LexiconEnhancer`] works from the
//! vocabulary of the catalog itself so it needs no model or network.

use crate::error::{Result, SearchError};
use crate::index::Document;
use crate::tokenizer::{is_stopword, stem, words};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhanceMethod {
    Spell,
    Rewrite,
    Expand,
}

impl EnhanceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnhanceMethod::Spell => "spell",
            EnhanceMethod::Rewrite => "rewrite",
            EnhanceMethod::Expand => "expand",
        }
    }
}

impl fmt::Display for EnhanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnhanceMethod {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spell" => Ok(EnhanceMethod::Spell),
            "rewrite" => Ok(EnhanceMethod::Rewrite),
            "expand" => Ok(EnhanceMethod::Expand),
            other => Err(SearchError::invalid_argument(format!("unknown enhance method {other:?}"))),
        }
    }
}

/// Rewrites a query before it is ranked.
pub trait QueryEnhancer: Send + Sync {
    fn enhance(&self, query: &str, method: EnhanceMethod) -> Result<String>;
}

/// Expansions appended per query word.
const MAX_EXPANSIONS_PER_WORD: usize = 3;

pub struct LexiconEnhancer {
    lexicon: BTreeSet<String>,
    by_stem: BTreeMap<String, BTreeSet<String>>,
}

impl LexiconEnhancer {
    pub fn from_documents<'a, I>(documents: I) -> Self
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut lexicon = BTreeSet::new();
        let mut by_stem: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for doc in documents {
            for word in words(&doc.text()) {
                if is_stopword(&word) || word.chars().all(|c| c.is_numeric()) {
                    continue;
                }
                by_stem.entry(stem(&word)).or_default().insert(word.clone());
                lexicon.insert(word);
            }
        }
        Self { lexicon, by_stem }
    }

    pub fn lexicon_size(&self) -> usize {
        self.lexicon.len()
    }

    /// Replace words missing from the lexicon with the closest lexicon word.
    fn spell(&self, query: &str) -> String {
        query
            .split_whitespace()
            .map(|raw| {
                let word: String = words(raw).concat();
                if word.is_empty() || is_stopword(&word) || self.lexicon.contains(&word) {
                    return raw.to_string();
                }
                self.closest(&word).map(str::to_string).unwrap_or_else(|| raw.to_string())
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn closest(&self, word: &str) -> Option<&str> {
        let budget = max_edits(word);
        let mut best: Option<(usize, &str)> = None;
        for candidate in &self.lexicon {
            let len_gap = candidate.chars().count().abs_diff(word.chars().count());
            if len_gap > budget {
                continue;
            }
            let distance = levenshtein(word, candidate);
            if distance <= budget && best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, candidate.as_str()));
            }
        }
        best.map(|(_, w)| w)
    }

    /// Lowercase, stopwords and duplicate words removed.
    fn rewrite(&self, query: &str) -> String {
        let mut seen = HashSet::new();
        words(query)
            .into_iter()
            .filter(|w| !is_stopword(w) && seen.insert(w.clone()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Append lexicon words that share a stem with a query word.
    fn expand(&self, query: &str) -> String {
        let query_words: Vec<String> = words(query);
        let present: HashSet<&str> = query_words.iter().map(String::as_str).collect();
        let mut extra: Vec<&str> = Vec::new();
        for word in query_words.iter().filter(|w| !is_stopword(w)) {
            let Some(variants) = self.by_stem.get(&stem(word)) else {
                continue;
            };
            let mut added = 0;
            for variant in variants.iter().map(String::as_str) {
                if added == MAX_EXPANSIONS_PER_WORD {
                    break;
                }
                if !present.contains(variant) && !extra.contains(&variant) {
                    extra.push(variant);
                    added += 1;
                }
            }
        }
        let mut expanded = query.trim().to_string();
        for word in extra {
            expanded.push(' ');
            expanded.push_str(word);
        }
        expanded
    }
}

impl QueryEnhancer for LexiconEnhancer {
    fn enhance(&self, query: &str, method: EnhanceMethod) -> Result<String> {
        let enhanced = match method {
            EnhanceMethod::Spell => self.spell(query),
            EnhanceMethod::Rewrite => self.rewrite(query),
            EnhanceMethod::Expand => self.expand(query),
        };
        if enhanced.trim().is_empty() {
            return Ok(query.trim().to_string());
        }
        Ok(enhanced)
    }
}

fn max_edits(word: &str) -> usize {
    match word.chars().count() {
        0..=3 => 0,
        4..=6 => 1,
        _ => 2,
    }
}

/// Edit distance over chars, two rows.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enhancer() -> LexiconEnhancer {
        let docs = vec![
            Document::new(1, "Paddington", "A bear moves to London and loves marmalade."),
            Document::new(2, "The Revenant", "A frontiersman is mauled by a bear while hunting."),
            Document::new(3, "Bears", "A documentary following bears in Alaska."),
        ];
        LexiconEnhancer::from_documents(docs.iter())
    }

    #[test]
    fn lexicon_skips_stopwords() {
        let e = enhancer();
        assert!(e.lexicon.contains("marmalade"));
        assert!(!e.lexicon.contains("the"));
        assert_eq!(e.lexicon_size(), e.lexicon.len());
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("bear", "bear"), 0);
    }

    #[test]
    fn spell_fixes_close_typos_only() {
        let e = enhancer();
        assert_eq!(e.enhance("paddingtn marmalade", EnhanceMethod::Spell).unwrap(), "paddington marmalade");
        // too far from anything in the lexicon
        assert_eq!(e.enhance("zzzzzzzz", EnhanceMethod::Spell).unwrap(), "zzzzzzzz");
        // short words are never corrected
        assert_eq!(e.enhance("bea", EnhanceMethod::Spell).unwrap(), "bea");
    }

    #[test]
    fn rewrite_drops_stopwords_and_duplicates() {
        let e = enhancer();
        assert_eq!(e.enhance("The bear, the BEAR and London", EnhanceMethod::Rewrite).unwrap(), "bear london");
        assert_eq!(e.enhance("the and of", EnhanceMethod::Rewrite).unwrap(), "the and of");
    }

    #[test]
    fn expand_appends_shared_stem_variants() {
        let e = enhancer();
        let expanded = e.enhance("bear movie", EnhanceMethod::Expand).unwrap();
        assert_eq!(expanded, "bear movie bears");
    }

    #[test]
    fn method_names_round_trip() {
        for m in [EnhanceMethod::Spell, EnhanceMethod::Rewrite, EnhanceMethod::Expand] {
            assert_eq!(m.as_str().parse::<EnhanceMethod>().unwrap(), m);
        }
    }
}
