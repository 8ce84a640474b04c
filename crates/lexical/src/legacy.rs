use crate::backend::{LexicalBackend, LexicalDoc};
use crate::error::{LexicalError, Result};
use crate::single_file::Bm25Params;
use crate::tokenizer::CodeTokenizer;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File as FsFile;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "write.lock";
const POSTINGS_FILE: &str = "postings.json";
const DOCS_FILE: &str = "docs.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct DocEntry {
  file_path: String,
  length: u32,
}

#[derive(Debug, Default)]
struct Inner {
  /// term -> (doc_id -> term frequency)
  postings: HashMap<String, HashMap<String, u32>>,
  docs: HashMap<String, DocEntry>,
}

/// The legacy directory-based inverted index, retained for indexes created
/// before the single-file backend existed. Classic Okapi BM25 scoring
/// computed directly over postings rather than a packed embedding, and a
/// filesystem lock file serializes writers — a second writer opening the
/// same directory blocks until the first releases it.
pub struct LegacyBackend {
  dir: PathBuf,
  params: Bm25Params,
  inner: RwLock<Inner>,
  _lock: FsFile,
}

impl LegacyBackend {
  pub fn open(dir: impl Into<PathBuf>, params: Bm25Params) -> Result<Self> {
    let dir = dir.into();
    std::fs::create_dir_all(&dir)?;
    let lock = acquire_lock(&dir)?;

    let postings = read_json(&dir.join(POSTINGS_FILE))?.unwrap_or_default();
    let docs = read_json(&dir.join(DOCS_FILE))?.unwrap_or_default();

    Ok(Self {
      dir,
      params,
      inner: RwLock::new(Inner { postings, docs }),
      _lock: lock,
    })
  }

  fn avgdl(inner: &Inner) -> f32 {
    if inner.docs.is_empty() {
      return 1.0;
    }
    let total: u64 = inner.docs.values().map(|d| d.length as u64).sum();
    total as f32 / inner.docs.len() as f32
  }
}

fn acquire_lock(dir: &Path) -> Result<FsFile> {
  let path = dir.join(LOCK_FILE);
  match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
    Ok(f) => Ok(f),
    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(LexicalError::Locked),
    Err(e) => Err(e.into()),
  }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
  if !path.exists() {
    return Ok(None);
  }
  let mut buf = String::new();
  FsFile::open(path)?.read_to_string(&mut buf)?;
  Ok(Some(serde_json::from_str(&buf)?))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
  let bytes = serde_json::to_vec(value)?;
  let tmp = path.with_extension("tmp");
  FsFile::create(&tmp)?.write_all(&bytes)?;
  std::fs::rename(&tmp, path)?;
  Ok(())
}

impl LexicalBackend for LegacyBackend {
  fn index(&self, docs: &[LexicalDoc<'_>]) -> Result<()> {
    let tokenizer = CodeTokenizer::new();
    let mut inner = self.inner.write();
    for doc in docs {
      let tokens = tokenizer.tokenize_str(doc.content);
      let mut term_freq: HashMap<String, u32> = HashMap::new();
      for token in &tokens {
        *term_freq.entry(token.clone()).or_insert(0) += 1;
      }
      for (term, tf) in &term_freq {
        inner
          .postings
          .entry(term.clone())
          .or_default()
          .insert(doc.id.to_string(), *tf);
      }
      inner
        .docs
        .insert(doc.id.to_string(), DocEntry { file_path: doc.file_path.to_string(), length: tokens.len() as u32 });
    }
    Ok(())
  }

  fn remove(&self, ids: &[String]) -> Result<()> {
    let mut inner = self.inner.write();
    for id in ids {
      inner.docs.remove(id);
      for postings in inner.postings.values_mut() {
        postings.remove(id);
      }
    }
    inner.postings.retain(|_, postings| !postings.is_empty());
    Ok(())
  }

  fn search(&self, query: &str, top_k: usize, scopes: Option<&[String]>) -> Result<Vec<(String, f32)>> {
    let tokenizer = CodeTokenizer::new();
    let inner = self.inner.read();
    let avgdl = Self::avgdl(&inner);
    let n = inner.docs.len().max(1) as f32;

    let mut scores: HashMap<String, f32> = HashMap::new();
    for term in tokenizer.tokenize_str(query) {
      let Some(postings) = inner.postings.get(&term) else { continue };
      let df = postings.len() as f32;
      let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
      for (doc_id, &tf) in postings {
        let Some(entry) = inner.docs.get(doc_id) else { continue };
        let dl = entry.length.max(1) as f32;
        let denom = tf as f32 + self.params.k1 * (1.0 - self.params.b + self.params.b * dl / avgdl);
        let score = idf * (tf as f32 * (self.params.k1 + 1.0)) / denom;
        *scores.entry(doc_id.clone()).or_insert(0.0) += score;
      }
    }

    let mut results: Vec<(String, f32)> = scores
      .into_iter()
      .filter(|(id, _)| {
        scopes
          .map(|scopes| {
            inner.docs.get(id).map(|e| scopes.iter().any(|s| e.file_path.starts_with(s.as_str()))).unwrap_or(false)
          })
          .unwrap_or(true)
      })
      .collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
    results.truncate(top_k);
    Ok(results)
  }

  fn doc_count(&self) -> usize {
    self.inner.read().docs.len()
  }

  fn flush(&self) -> Result<()> {
    let inner = self.inner.read();
    write_json(&self.dir.join(POSTINGS_FILE), &inner.postings)?;
    write_json(&self.dir.join(DOCS_FILE), &inner.docs)?;
    Ok(())
  }

  fn close(&self) -> Result<()> {
    self.flush()?;
    let _ = std::fs::remove_file(self.dir.join(LOCK_FILE));
    Ok(())
  }
}

/// True if the on-disk artifact looks like a legacy directory index.
pub fn looks_like_legacy(path: &Path) -> bool {
  path.is_dir() && (path.join(POSTINGS_FILE).exists() || path.join(DOCS_FILE).exists())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn index_and_search_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let backend = LegacyBackend::open(dir.path().join("bm25_legacy"), Bm25Params::default()).unwrap();
    backend
      .index(&[
        LexicalDoc { id: "1", file_path: "a.rs", content: "fn get_user_by_id(id: i32) -> User" },
        LexicalDoc { id: "2", file_path: "b.rs", content: "struct DatabaseConnection" },
      ])
      .unwrap();

    let results = backend.search("get user", 10, None).unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].0, "1");
  }

  #[test]
  fn second_writer_sees_locked_error() {
    let dir = tempfile::tempdir().unwrap();
    let first = LegacyBackend::open(dir.path().join("bm25_legacy"), Bm25Params::default()).unwrap();
    let second = LegacyBackend::open(dir.path().join("bm25_legacy"), Bm25Params::default());
    assert!(matches!(second, Err(LexicalError::Locked)));
    drop(first);
  }

  #[test]
  fn flush_and_reopen_preserves_docs() {
    let dir = tempfile::tempdir().unwrap();
    let index_dir = dir.path().join("bm25_legacy");
    {
      let backend = LegacyBackend::open(&index_dir, Bm25Params::default()).unwrap();
      backend.index(&[LexicalDoc { id: "1", file_path: "a.rs", content: "struct Widget" }]).unwrap();
      backend.close().unwrap();
    }
    let reopened = LegacyBackend::open(&index_dir, Bm25Params::default()).unwrap();
    assert_eq!(reopened.doc_count(), 1);
  }

  #[test]
  fn remove_drops_doc_from_postings() {
    let dir = tempfile::tempdir().unwrap();
    let backend = LegacyBackend::open(dir.path().join("bm25_legacy"), Bm25Params::default()).unwrap();
    backend.index(&[LexicalDoc { id: "1", file_path: "a.rs", content: "fn gadget()" }]).unwrap();
    backend.remove(&["1".to_string()]).unwrap();
    assert_eq!(backend.doc_count(), 0);
    assert!(backend.search("gadget", 10, None).unwrap().is_empty());
  }
}
