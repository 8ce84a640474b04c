//! Pattern-based query decomposition.
//!
//! Splits a handful of recognized generic-question shapes ("compare X and
//! Y", "X vs Y", "difference between X and Y") into independent sub-queries
//! that are searched and merged before fusion. Anything that doesn't match
//! a recognized pattern passes through unchanged.

const COMPARISON_KEYWORDS: [&str; 2] = [" vs ", " versus "];

/// Returns `Some(sub_queries)` when `query` matches a recognized pattern,
/// `None` when it should be searched as-is.
pub fn decompose(query: &str) -> Option<Vec<String>> {
  let trimmed = query.trim();
  if trimmed.is_empty() {
    return None;
  }

  if let Some(parts) = split_on_any_keyword(trimmed, &COMPARISON_KEYWORDS) {
    return Some(parts);
  }

  if let Some(rest) = strip_prefix_ci(trimmed, "compare ") {
    return split_on_keyword(rest, " and ");
  }

  if let Some(rest) = strip_prefix_ci(trimmed, "difference between ") {
    return split_on_keyword(rest, " and ");
  }

  None
}

fn split_on_any_keyword(text: &str, keywords: &[&str]) -> Option<Vec<String>> {
  for keyword in keywords {
    if let Some(parts) = split_on_keyword(text, keyword) {
      return Some(parts);
    }
  }
  None
}

fn split_on_keyword(text: &str, keyword: &str) -> Option<Vec<String>> {
  let lower = text.to_lowercase();
  let idx = lower.find(keyword)?;
  let left = text[..idx].trim();
  let right = text[idx + keyword.len()..].trim();
  if left.is_empty() || right.is_empty() {
    return None;
  }
  Some(vec![left.to_string(), right.to_string()])
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
  if text.len() < prefix.len() {
    return None;
  }
  if text[..prefix.len()].eq_ignore_ascii_case(prefix) { Some(&text[prefix.len()..]) } else { None }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_query_is_not_decomposed() {
    assert_eq!(decompose("how does the scanner walk files"), None);
  }

  #[test]
  fn vs_pattern_splits_in_two() {
    let parts = decompose("tokio vs async-std").unwrap();
    assert_eq!(parts, vec!["tokio", "async-std"]);
  }

  #[test]
  fn compare_and_pattern_splits_in_two() {
    let parts = decompose("compare BM25 and vector search").unwrap();
    assert_eq!(parts, vec!["BM25", "vector search"]);
  }

  #[test]
  fn difference_between_pattern_splits_in_two() {
    let parts = decompose("difference between Local and Remote embedders").unwrap();
    assert_eq!(parts, vec!["Local", "Remote embedders"]);
  }

  #[test]
  fn dangling_keyword_does_not_decompose() {
    assert_eq!(decompose("compare and contrast"), None);
  }
}
