use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Find the git root directory by walking upward from the given path.
pub fn find_git_root(path: &Path) -> Option<PathBuf> {
  let mut current = path.to_path_buf();

  loop {
    let git_dir = current.join(".git");
    if git_dir.exists() {
      return Some(current);
    }

    if !current.pop() {
      return None;
    }
  }
}

/// Get the project root path, preferring git root over the given path.
pub fn resolve_project_path(path: &Path) -> PathBuf {
  let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
  find_git_root(&canonical).unwrap_or(canonical)
}

/// Stable project identity: a 16-hex-character prefix of the SHA-256 of the
/// absolute project root path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
  /// Create a ProjectId from a path, preferring the git root for stability
  /// across subdirectories.
  pub fn from_path(path: &Path) -> Self {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let project_path = find_git_root(&canonical).unwrap_or(canonical);
    ProjectId(Self::hash_path(&project_path))
  }

  /// Create a ProjectId from a path without git-root resolution; differs
  /// between a repo root and its subdirectories.
  pub fn from_path_exact(path: &Path) -> Self {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    ProjectId(Self::hash_path(&canonical))
  }

  fn hash_path(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn data_dir(&self, base: &Path) -> PathBuf {
    base.join("projects").join(&self.0)
  }
}

impl std::fmt::Display for ProjectId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
  pub id: ProjectId,
  pub path: PathBuf,
  pub name: String,
  pub file_count: u64,
  pub chunk_count: u64,
  pub created_at: chrono::DateTime<chrono::Utc>,
  pub indexed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;

  #[test]
  fn test_project_id_stable_across_subdirs() {
    let temp = std::env::temp_dir().join(format!("test_{}", std::process::id()));
    fs::create_dir_all(&temp).unwrap();
    let root = temp.as_path();

    fs::create_dir_all(root.join(".git")).unwrap();
    fs::create_dir_all(root.join("src/components")).unwrap();

    let id_root = ProjectId::from_path(root);
    let id_src = ProjectId::from_path(&root.join("src"));
    let id_components = ProjectId::from_path(&root.join("src/components"));

    assert_eq!(id_root, id_src);
    assert_eq!(id_root, id_components);
    assert_eq!(id_root.as_str().len(), 16);

    let _ = fs::remove_dir_all(&temp);
  }

  #[test]
  fn test_project_id_is_sha256_prefix() {
    let temp = std::env::temp_dir().join(format!("test_sha_{}", std::process::id()));
    fs::create_dir_all(&temp).unwrap();
    let canonical = temp.canonicalize().unwrap();

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let expected = hex::encode(&hasher.finalize()[..8]);

    assert_eq!(ProjectId::from_path_exact(&temp).as_str(), expected);

    let _ = fs::remove_dir_all(&temp);
  }

  #[test]
  fn test_project_id_exact_differs() {
    let temp = std::env::temp_dir().join(format!("test_exact_{}", std::process::id()));
    fs::create_dir_all(&temp).unwrap();
    let root = temp.as_path();

    fs::create_dir_all(root.join(".git")).unwrap();
    fs::create_dir_all(root.join("src")).unwrap();

    let id_root = ProjectId::from_path_exact(root);
    let id_src = ProjectId::from_path_exact(&root.join("src"));

    assert_ne!(id_root, id_src);

    let _ = fs::remove_dir_all(&temp);
  }

  #[test]
  fn test_find_git_root() {
    let temp = std::env::temp_dir().join(format!("test_git_{}", std::process::id()));
    fs::create_dir_all(&temp).unwrap();
    let root = temp.as_path();

    assert!(find_git_root(root).is_none());

    fs::create_dir_all(root.join(".git")).unwrap();
    fs::create_dir_all(root.join("src/deep/nested")).unwrap();

    let canonical_root = root.canonicalize().unwrap();
    assert_eq!(find_git_root(root), Some(canonical_root.clone()));
    assert_eq!(find_git_root(&root.join("src")), Some(canonical_root.clone()));
    assert_eq!(find_git_root(&root.join("src/deep/nested")), Some(canonical_root));

    let _ = fs::remove_dir_all(&temp);
  }

  #[test]
  fn test_resolve_project_path_with_git() {
    let temp = std::env::temp_dir().join(format!("test_resolve_{}", std::process::id()));
    fs::create_dir_all(&temp).unwrap();
    let root = temp.as_path();

    fs::create_dir_all(root.join(".git")).unwrap();
    fs::create_dir_all(root.join("src")).unwrap();

    let resolved = resolve_project_path(&root.join("src"));
    assert_eq!(resolved, root.canonicalize().unwrap());

    let _ = fs::remove_dir_all(&temp);
  }

  #[test]
  fn test_resolve_project_path_without_git() {
    let temp = std::env::temp_dir().join(format!("test_no_git_{}", std::process::id()));
    fs::create_dir_all(&temp).unwrap();
    let root = temp.as_path();
    fs::create_dir_all(root.join("src")).unwrap();

    let resolved = resolve_project_path(&root.join("src"));
    assert_eq!(resolved, root.join("src").canonicalize().unwrap());

    let _ = fs::remove_dir_all(&temp);
  }
}
