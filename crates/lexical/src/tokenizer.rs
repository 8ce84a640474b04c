use bm25::Tokenizer as Bm25Tokenizer;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
  [
    "the", "a", "an", "and", "or", "of", "to", "in", "is", "it", "for", "on", "with", "as", "this",
    "that", "be", "by", "at", "from", "are", "was", "were", "not",
  ]
  .into_iter()
  .collect()
});

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("invalid regex"));
static SNAKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").expect("invalid regex"));
static CAMEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("invalid regex"));
static ACRONYM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("invalid regex"));

/// Splits a raw identifier into its constituent sub-words, e.g.
/// `getUserById` -> `["get", "user", "by", "id"]`, `max_chunk_tokens` ->
/// `["max", "chunk", "tokens"]`. Returns an empty vec if the identifier has
/// no internal boundaries worth splitting on.
fn split_identifier(raw: &str) -> Vec<String> {
  let with_camel_spaces = CAMEL_RE.replace_all(raw, "$1 $2");
  let with_acronym_spaces = ACRONYM_RE.replace_all(&with_camel_spaces, "$1 $2");
  let with_snake_spaces = SNAKE_RE.replace_all(&with_acronym_spaces, " ");
  with_snake_spaces
    .split_whitespace()
    .filter(|s| !s.is_empty())
    .map(|s| s.to_lowercase())
    .collect()
}

/// Tokenizer used for both chunk content and query text. Applies Unicode
/// word segmentation (approximated with a word-character regex), case
/// folding, stop-word filtering, and code-aware identifier splitting: a
/// compound identifier yields both its folded whole-token form and its
/// constituent sub-words, so `getUserById` indexes as
/// `[getuserbyid, get, user, by, id]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeTokenizer {
  pub filter_stopwords: bool,
}

impl CodeTokenizer {
  pub fn new() -> Self {
    Self { filter_stopwords: true }
  }

  pub fn tokenize_str(&self, text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in WORD_RE.find_iter(text).map(|m| m.as_str()) {
      let folded = raw.to_lowercase();
      if self.filter_stopwords && STOPWORDS.contains(folded.as_str()) {
        continue;
      }
      out.push(folded.clone());
      for sub in split_identifier(raw) {
        if sub != folded && !(self.filter_stopwords && STOPWORDS.contains(sub.as_str())) {
          out.push(sub);
        }
      }
    }
    out
  }
}

impl Bm25Tokenizer for CodeTokenizer {
  fn tokenize(&self, input_text: &str) -> Vec<String> {
    self.tokenize_str(input_text)
  }
}
