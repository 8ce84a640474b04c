use amanmcp_core::{ContentType, Language};
use serde::{Deserialize, Serialize};

/// Restricts results to a broad content class before the final truncate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentTypeFilter {
  #[default]
  All,
  Code,
  Docs,
}

impl ContentTypeFilter {
  fn matches(self, content_type: ContentType) -> bool {
    match self {
      ContentTypeFilter::All => true,
      ContentTypeFilter::Code => matches!(content_type, ContentType::Code | ContentType::Comment),
      ContentTypeFilter::Docs => matches!(content_type, ContentType::Docs),
    }
  }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
  pub limit: usize,
  pub content_type_filter: ContentTypeFilter,
  pub language: Option<Language>,
  pub scopes: Option<Vec<String>>,
  pub bm25_only: bool,
  pub explain: bool,
}

impl Default for SearchOptions {
  fn default() -> Self {
    Self {
      limit: 10,
      content_type_filter: ContentTypeFilter::All,
      language: None,
      scopes: None,
      bm25_only: false,
      explain: false,
    }
  }
}

impl SearchOptions {
  pub(crate) fn passes_filters(&self, file_path: &str, content_type: ContentType, language: Language) -> bool {
    if !self.content_type_filter.matches(content_type) {
      return false;
    }
    if let Some(want) = self.language
      && want != language
    {
      return false;
    }
    if let Some(scopes) = &self.scopes
      && !scopes.is_empty()
      && !scopes.iter().any(|scope| file_path.starts_with(scope.as_str()))
    {
      return false;
    }
    true
  }
}

/// Per-result retrieval breakdown, attached when `SearchOptions::explain` is set.
#[derive(Debug, Clone, Serialize)]
pub struct HitExplain {
  pub bm25_rank: Option<usize>,
  pub bm25_score: Option<f32>,
  pub vec_rank: Option<usize>,
  pub vec_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hit {
  pub chunk_id: String,
  pub file_path: String,
  pub start_line: u32,
  pub end_line: u32,
  pub content: String,
  pub content_type: ContentType,
  pub language: Language,
  pub score: f32,
  pub explain: Option<HitExplain>,
}

/// Header attached to the response when `SearchOptions::explain` is set.
#[derive(Debug, Clone, Serialize)]
pub struct SearchExplain {
  pub mode: &'static str,
  pub bm25_weight: f64,
  pub vector_weight: f64,
  pub rrf_constant: u32,
  pub sub_queries: Option<Vec<String>>,
  pub bm25_result_count: usize,
  pub vector_result_count: usize,
  pub dimension_mismatch: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
  pub hits: Vec<Hit>,
  pub explain: Option<SearchExplain>,
}
