use crate::backend::{LexicalBackend, LexicalDoc};
use crate::error::Result;
use crate::tokenizer::CodeTokenizer;
use bm25::{Embedder, EmbedderBuilder, Scorer};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DEFAULT_K1: f32 = 0.8;
const DEFAULT_B: f32 = 0.5;
const DEFAULT_AVGDL: f32 = 100.0;

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
  pub k1: f32,
  pub b: f32,
}

impl Default for Bm25Params {
  fn default() -> Self {
    Self { k1: DEFAULT_K1, b: DEFAULT_B }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDoc {
  file_path: String,
  content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Snapshot {
  avgdl: f32,
  docs: HashMap<String, StoredDoc>,
}

fn build_embedder(avgdl: f32, params: Bm25Params) -> Embedder<u32, CodeTokenizer> {
  EmbedderBuilder::<u32, CodeTokenizer>::with_avgdl(avgdl).b(params.b).k1(params.k1).build()
}

struct Inner {
  embedder: Embedder<u32, CodeTokenizer>,
  scorer: Scorer<String, u32>,
  docs: HashMap<String, StoredDoc>,
  avgdl: f32,
}

/// The single-file BM25 backend: a `bm25`-crate scorer whose whole state is
/// snapshotted to one JSON file on `flush`/`close`. Supports concurrent
/// readers during writes via an `RwLock` — writers take it briefly per
/// batch, readers hold it only for the duration of a search.
pub struct SingleFileBackend {
  path: PathBuf,
  params: Bm25Params,
  inner: RwLock<Inner>,
}

impl SingleFileBackend {
  pub fn open(path: impl Into<PathBuf>, params: Bm25Params) -> Result<Self> {
    let path = path.into();
    let (docs, avgdl) = if path.exists() {
      let bytes = std::fs::read(&path)?;
      let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
      (snapshot.docs, snapshot.avgdl)
    } else {
      (HashMap::new(), DEFAULT_AVGDL)
    };

    let embedder = build_embedder(avgdl, params);
    let mut scorer = Scorer::new();
    for (id, doc) in &docs {
      scorer.upsert(id, embedder.embed(&doc.content));
    }

    Ok(Self {
      path,
      params,
      inner: RwLock::new(Inner { embedder, scorer, docs, avgdl }),
    })
  }

  fn recalculate_avgdl(&self, inner: &mut Inner) {
    if inner.docs.is_empty() {
      return;
    }
    let tokenizer = CodeTokenizer::new();
    let total: usize = inner.docs.values().map(|d| tokenizer.tokenize_str(&d.content).len()).sum();
    inner.avgdl = total as f32 / inner.docs.len() as f32;
    inner.embedder = build_embedder(inner.avgdl, self.params);
    let ids: Vec<String> = inner.docs.keys().cloned().collect();
    let mut scorer = Scorer::new();
    for id in ids {
      let content = inner.docs[&id].content.clone();
      scorer.upsert(&id, inner.embedder.embed(&content));
    }
    inner.scorer = scorer;
  }
}

impl LexicalBackend for SingleFileBackend {
  fn index(&self, docs: &[LexicalDoc<'_>]) -> Result<()> {
    let mut inner = self.inner.write();
    let previous_count = inner.docs.len();
    for doc in docs {
      let embedding = inner.embedder.embed(doc.content);
      inner.scorer.upsert(&doc.id.to_string(), embedding);
      inner.docs.insert(
        doc.id.to_string(),
        StoredDoc { file_path: doc.file_path.to_string(), content: doc.content.to_string() },
      );
    }
    let change_ratio = (inner.docs.len() as f32 - previous_count as f32).abs() / previous_count.max(1) as f32;
    if previous_count == 0 || change_ratio > 0.1 {
      self.recalculate_avgdl(&mut inner);
    }
    Ok(())
  }

  fn remove(&self, ids: &[String]) -> Result<()> {
    let mut inner = self.inner.write();
    for id in ids {
      inner.docs.remove(id);
    }
    self.recalculate_avgdl(&mut inner);
    Ok(())
  }

  fn search(&self, query: &str, top_k: usize, scopes: Option<&[String]>) -> Result<Vec<(String, f32)>> {
    let inner = self.inner.read();
    let query_embedding = inner.embedder.embed(query);
    let matches = inner.scorer.matches(&query_embedding);

    let mut results: Vec<(String, f32)> = matches
      .into_iter()
      .filter(|doc| {
        scopes.map(|scopes| {
          inner
            .docs
            .get(&doc.id)
            .map(|stored| scopes.iter().any(|scope| stored.file_path.starts_with(scope.as_str())))
            .unwrap_or(false)
        }).unwrap_or(true)
      })
      .map(|doc| (doc.id, doc.score))
      .collect();
    results.truncate(top_k);
    Ok(results)
  }

  fn doc_count(&self) -> usize {
    self.inner.read().docs.len()
  }

  fn flush(&self) -> Result<()> {
    let inner = self.inner.read();
    let snapshot = Snapshot { avgdl: inner.avgdl, docs: inner.docs.clone() };
    let bytes = serde_json::to_vec(&snapshot)?;
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let tmp_path = self.path.with_extension("tmp");
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, &self.path)?;
    Ok(())
  }
}

/// True if the on-disk artifact looks like a single-file snapshot.
pub fn looks_like_single_file(path: &Path) -> bool {
  path.is_file()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn index_and_search_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SingleFileBackend::open(dir.path().join("bm25.db"), Bm25Params::default()).unwrap();

    backend
      .index(&[
        LexicalDoc { id: "1", file_path: "a.rs", content: "fn get_user_by_id(id: i32) -> User" },
        LexicalDoc { id: "2", file_path: "b.rs", content: "fn delete_user(id: i32)" },
      ])
      .unwrap();

    let results = backend.search("get user", 10, None).unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].0, "1");
  }

  #[test]
  fn flush_and_reopen_preserves_docs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bm25.db");
    {
      let backend = SingleFileBackend::open(&path, Bm25Params::default()).unwrap();
      backend.index(&[LexicalDoc { id: "1", file_path: "a.rs", content: "struct Widget" }]).unwrap();
      backend.flush().unwrap();
    }
    let reopened = SingleFileBackend::open(&path, Bm25Params::default()).unwrap();
    assert_eq!(reopened.doc_count(), 1);
    let results = reopened.search("widget", 10, None).unwrap();
    assert_eq!(results[0].0, "1");
  }

  #[test]
  fn scope_filter_excludes_non_matching_paths() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SingleFileBackend::open(dir.path().join("bm25.db"), Bm25Params::default()).unwrap();
    backend
      .index(&[
        LexicalDoc { id: "1", file_path: "src/a.rs", content: "fn widget_factory()" },
        LexicalDoc { id: "2", file_path: "tests/b.rs", content: "fn widget_factory()" },
      ])
      .unwrap();

    let results = backend.search("widget", 10, Some(&["src/".to_string()])).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "1");
  }

  #[test]
  fn remove_drops_doc_from_future_searches() {
    let dir = tempfile::tempdir().unwrap();
    let backend = SingleFileBackend::open(dir.path().join("bm25.db"), Bm25Params::default()).unwrap();
    backend.index(&[LexicalDoc { id: "1", file_path: "a.rs", content: "fn gadget()" }]).unwrap();
    backend.remove(&["1".to_string()]).unwrap();
    assert_eq!(backend.doc_count(), 0);
  }
}
