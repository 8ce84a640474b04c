use crate::error::Result;

/// A single document offered to a lexical backend for indexing.
pub struct LexicalDoc<'a> {
  pub id: &'a str,
  pub file_path: &'a str,
  pub content: &'a str,
}

/// Common surface both concrete backends (single-file and legacy
/// directory-based) implement, so the search engine and pipeline never
/// branch on which one is open.
pub trait LexicalBackend: Send + Sync {
  fn index(&self, docs: &[LexicalDoc<'_>]) -> Result<()>;
  fn remove(&self, ids: &[String]) -> Result<()>;
  fn search(&self, query: &str, top_k: usize, scopes: Option<&[String]>) -> Result<Vec<(String, f32)>>;
  fn doc_count(&self) -> usize;
  fn flush(&self) -> Result<()>;
  fn close(&self) -> Result<()> {
    self.flush()
  }
}
