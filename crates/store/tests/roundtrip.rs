use amanmcp_core::{Chunk, ContentType, File, Language, PipelineStage};
use store::MetadataStore;

#[test]
fn reopening_an_existing_database_preserves_data() {
  let dir = tempfile::tempdir().unwrap();
  let db_path = dir.path().join("metadata.db");

  {
    let metastore = MetadataStore::open_at_path(db_path.clone()).unwrap();
    metastore.save_project("p1", "demo", "/tmp/demo", chrono::Utc::now()).unwrap();
    let file = File {
      id: "file1".into(),
      project_id: "p1".into(),
      relative_path: "src/lib.rs".into(),
      language: Some(Language::Rust),
      size_bytes: 42,
      content_hash: "deadbeef".into(),
      last_modified: chrono::Utc::now(),
    };
    metastore.save_files("p1", &[file]).unwrap();
    let chunk = Chunk::new("file1", "src/lib.rs", 1, 5, "pub fn hi() {}", ContentType::Code, Language::Rust);
    metastore.save_chunks(&[chunk.clone()]).unwrap();
    metastore.save_embeddings(&[(chunk.id.clone(), "model-a".into(), 4, vec![0.1, 0.2, 0.3, 0.4])]).unwrap();
    metastore.save_checkpoint("p1", PipelineStage::Persisting, 1, 1, "model-a").unwrap();
  }

  let reopened = MetadataStore::open_at_path(db_path).unwrap();
  let project = reopened.get_project("p1").unwrap().unwrap();
  assert_eq!(project.name, "demo");

  let embeddings = reopened.get_all_embeddings("p1").unwrap();
  assert_eq!(embeddings.len(), 1);

  let checkpoint = reopened.load_checkpoint("p1").unwrap().unwrap();
  assert_eq!(checkpoint.stage, PipelineStage::Persisting);
}

#[test]
fn deleting_chunks_cascades_their_embeddings() {
  let metastore = MetadataStore::open_in_memory().unwrap();
  metastore.save_project("p1", "demo", "/tmp/demo", chrono::Utc::now()).unwrap();
  let file = File {
    id: "file1".into(),
    project_id: "p1".into(),
    relative_path: "a.rs".into(),
    language: Some(Language::Rust),
    size_bytes: 10,
    content_hash: "abc".into(),
    last_modified: chrono::Utc::now(),
  };
  metastore.save_files("p1", &[file]).unwrap();
  let chunk = Chunk::new("file1", "a.rs", 1, 2, "fn x() {}", ContentType::Code, Language::Rust);
  metastore.save_chunks(&[chunk.clone()]).unwrap();
  metastore.save_embeddings(&[(chunk.id.clone(), "model-a".into(), 2, vec![0.5, 0.5])]).unwrap();

  metastore.delete_chunks(&[chunk.id.clone()]).unwrap();

  assert!(metastore.get_chunk(&chunk.id).unwrap().is_none());
  assert!(metastore.get_all_embeddings("p1").unwrap().is_empty());
}

#[test]
fn deleting_a_file_cascades_its_chunks() {
  let metastore = MetadataStore::open_in_memory().unwrap();
  metastore.save_project("p1", "demo", "/tmp/demo", chrono::Utc::now()).unwrap();
  let file = File {
    id: "file1".into(),
    project_id: "p1".into(),
    relative_path: "a.rs".into(),
    language: Some(Language::Rust),
    size_bytes: 10,
    content_hash: "abc".into(),
    last_modified: chrono::Utc::now(),
  };
  metastore.save_files("p1", &[file]).unwrap();
  let chunk = Chunk::new("file1", "a.rs", 1, 2, "fn y() {}", ContentType::Code, Language::Rust);
  metastore.save_chunks(&[chunk.clone()]).unwrap();

  metastore.delete_files(&["file1".to_string()]).unwrap();

  assert!(metastore.get_chunk(&chunk.id).unwrap().is_none());
}
