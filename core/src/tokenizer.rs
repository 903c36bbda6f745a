use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","arent","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cant","cannot","could","couldnt",
            "did","didnt","do","does","doesnt","doing","dont","down","during",
            "each","few","for","from","further",
            "had","hadnt","has","hasnt","have","havent","having","he","hes","her","here","heres","hers","herself","him","himself","his","how","hows",
            "i","im","ive","if","in","into","is","isnt","it","its","itself",
            "lets","me","more","most","mustnt","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","shes","should","shouldnt","so","some","such",
            "than","that","thats","the","their","theirs","them","themselves","then","there","theres","these","they","theyd","theyll","theyre","theyve","this","those","through","to","too",
            "under","until","up","very",
            "was","wasnt","we","were","weve","werent","what","whats","when","whens","where","wheres","which","while","who","whos","whom","why","whys","with","wont","would","wouldnt",
            "you","youd","youll","youre","youve","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Turns free text into the token sequence the index stores.
///
/// Implementations must be deterministic and pure: the same text always yields
/// the same tokens, otherwise queries stop matching the indexed postings.
pub trait Tokenizer: Send + Sync {
    fn normalize(&self, text: &str) -> Vec<String>;
}

/// NFKD with diacritics dropped, lowercase, punctuation stripped, English stopwords removed, Snowball stemming.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextNormalizer;

impl Tokenizer for TextNormalizer {
    fn normalize(&self, text: &str) -> Vec<String> {
        tokenize(text)
    }
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word)
}

/// Stem a single lowercase word.
pub fn stem(word: &str) -> String {
    STEMMER.stem(word).to_string()
}

/// Lowercased words with punctuation removed, before stopword filtering and stemming.
///
/// Apostrophes and other punctuation inside a word are dropped rather than
/// splitting it, so "café's" becomes "cafes".
pub fn words(text: &str) -> Vec<String> {
    let normalized = text.nfkd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase();
    normalized
        .split_whitespace()
        .map(|chunk| RE.find_iter(chunk).map(|m| m.as_str()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Tokenize text: normalize, drop stopwords, stem.
pub fn tokenize(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| !is_stopword(w))
        .map(|w| stem(&w))
        .collect()
}
