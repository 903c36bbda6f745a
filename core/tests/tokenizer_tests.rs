use reelsearch_core::tokenizer::{tokenize, words, TextNormalizer, Tokenizer};

#[test]
fn it_normalizes_and_stems() {
    let toks = tokenize("Running Runners RUN! The café's menu.");
    // Stemming to "run" should appear
    assert!(toks.contains(&"run".to_string()));
    // Unicode normalization: café -> cafe
    assert!(toks.contains(&"cafe".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let toks = tokenize("The quick brown fox and the lazy dog");
    assert!(!toks.contains(&"the".to_string()));
    assert!(!toks.contains(&"and".to_string()));
    assert_eq!(toks.len(), 5);
}

#[test]
fn it_keeps_repeated_tokens() {
    // term frequency depends on every occurrence surviving
    assert_eq!(tokenize("Lost, lost and LOST"), vec!["lost", "lost", "lost"]);
}

#[test]
fn words_keep_stopwords_unstemmed() {
    assert_eq!(words("The Running Man"), vec!["the", "running", "man"]);
}

#[test]
fn normalizer_is_deterministic() {
    let text = "Amélie: a whimsical depiction of contemporary Parisian life.";
    assert_eq!(TextNormalizer.normalize(text), TextNormalizer.normalize(text));
    assert!(TextNormalizer.normalize("   ").is_empty());
}
