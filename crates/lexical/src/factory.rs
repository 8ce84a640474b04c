use crate::backend::LexicalBackend;
use crate::error::Result;
use crate::legacy::{self, LegacyBackend};
use crate::single_file::{self, Bm25Params, SingleFileBackend};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalBackendKind {
  SingleFile,
  Legacy,
}

/// Opens the lexical backend rooted at `dir`. `dir` contains either a single
/// `bm25.db` file or a `bm25_legacy/` subdirectory; if both are absent the
/// backend named by `preferred` is created fresh. When both artifacts exist
/// the single-file backend wins.
pub fn open(dir: &Path, preferred: LexicalBackendKind, params: Bm25Params) -> Result<Box<dyn LexicalBackend>> {
  let single_file_path = dir.join("bm25.db");
  let legacy_dir_path = dir.join("bm25_legacy");

  if single_file::looks_like_single_file(&single_file_path) {
    return Ok(Box::new(SingleFileBackend::open(single_file_path, params)?));
  }
  if legacy::looks_like_legacy(&legacy_dir_path) {
    return Ok(Box::new(LegacyBackend::open(legacy_dir_path, params)?));
  }

  match preferred {
    LexicalBackendKind::SingleFile => Ok(Box::new(SingleFileBackend::open(single_file_path, params)?)),
    LexicalBackendKind::Legacy => Ok(Box::new(LegacyBackend::open(legacy_dir_path, params)?)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::LexicalDoc;

  #[test]
  fn creates_single_file_backend_when_preferred() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open(dir.path(), LexicalBackendKind::SingleFile, Bm25Params::default()).unwrap();
    backend.index(&[LexicalDoc { id: "1", file_path: "a.rs", content: "fn foo()" }]).unwrap();
    backend.flush().unwrap();
    assert!(dir.path().join("bm25.db").is_file());
  }

  #[test]
  fn auto_detects_existing_single_file_over_preference() {
    let dir = tempfile::tempdir().unwrap();
    {
      let backend = open(dir.path(), LexicalBackendKind::SingleFile, Bm25Params::default()).unwrap();
      backend.index(&[LexicalDoc { id: "1", file_path: "a.rs", content: "fn foo()" }]).unwrap();
      backend.flush().unwrap();
    }
    let reopened = open(dir.path(), LexicalBackendKind::Legacy, Bm25Params::default()).unwrap();
    assert_eq!(reopened.doc_count(), 1);
  }
}
