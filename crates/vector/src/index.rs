use crate::error::{Result, VectorError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use usearch::ffi::{IndexOptions, MetricKind, ScalarKind};
use usearch::Index as UsearchIndex;

#[derive(Debug, Clone, Copy)]
pub struct VectorIndexConfig {
  pub dimensions: usize,
  pub connectivity: usize,
  pub expansion_add: usize,
  pub expansion_search: usize,
}

impl VectorIndexConfig {
  pub fn new(dimensions: usize) -> Self {
    Self { dimensions, connectivity: 16, expansion_add: 128, expansion_search: 64 }
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
  dimensions: usize,
  connectivity: usize,
  expansion_add: usize,
  expansion_search: usize,
  key_map: HashMap<u64, String>,
  next_key: u64,
  tombstones: HashSet<u64>,
}

struct State {
  key_map: HashMap<u64, String>,
  id_to_key: HashMap<String, u64>,
  tombstones: HashSet<u64>,
  next_key: u64,
}

/// Approximate nearest-neighbor index over unit-norm vectors, backed by a
/// usearch HNSW graph. `delete` tombstones rather than physically removing a
/// node, so `count()` over-reports live vectors until `compact` rebuilds the
/// graph from a fresh embedding source.
pub struct VectorIndex {
  index: UsearchIndex,
  config: VectorIndexConfig,
  state: RwLock<State>,
}

fn build_index(config: VectorIndexConfig) -> Result<UsearchIndex> {
  let options = IndexOptions {
    dimensions: config.dimensions,
    metric: MetricKind::Cos,
    quantization: ScalarKind::F32,
    connectivity: config.connectivity,
    expansion_add: config.expansion_add,
    expansion_search: config.expansion_search,
    multi: false,
  };
  let index = UsearchIndex::new(&options).map_err(|e| VectorError::Usearch(e.to_string()))?;
  index.reserve(1024).map_err(|e| VectorError::Usearch(e.to_string()))?;
  Ok(index)
}

impl VectorIndex {
  pub fn new(config: VectorIndexConfig) -> Result<Self> {
    Ok(Self {
      index: build_index(config)?,
      config,
      state: RwLock::new(State {
        key_map: HashMap::new(),
        id_to_key: HashMap::new(),
        tombstones: HashSet::new(),
        next_key: 0,
      }),
    })
  }

  fn sidecar_path(path: &Path) -> std::path::PathBuf {
    path.with_extension("meta.json")
  }

  pub fn load(path: &Path, config: VectorIndexConfig) -> Result<Self> {
    let sidecar_path = Self::sidecar_path(path);
    let sidecar_bytes = std::fs::read(&sidecar_path)?;
    let sidecar: Sidecar = serde_json::from_slice(&sidecar_bytes)?;

    if sidecar.dimensions != config.dimensions {
      return Err(VectorError::DimensionMismatch { expected: config.dimensions, found: sidecar.dimensions });
    }

    let index = build_index(config)?;
    index.load(path.to_string_lossy().as_ref()).map_err(|e| VectorError::Usearch(e.to_string()))?;

    let id_to_key = sidecar.key_map.iter().map(|(k, v)| (v.clone(), *k)).collect();

    Ok(Self {
      index,
      config,
      state: RwLock::new(State {
        key_map: sidecar.key_map,
        id_to_key,
        tombstones: sidecar.tombstones,
        next_key: sidecar.next_key,
      }),
    })
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    self.index.save(path.to_string_lossy().as_ref()).map_err(|e| VectorError::Usearch(e.to_string()))?;

    let state = self.state.read();
    let sidecar = Sidecar {
      dimensions: self.config.dimensions,
      connectivity: self.config.connectivity,
      expansion_add: self.config.expansion_add,
      expansion_search: self.config.expansion_search,
      key_map: state.key_map.clone(),
      next_key: state.next_key,
      tombstones: state.tombstones.clone(),
    };
    let bytes = serde_json::to_vec(&sidecar)?;
    std::fs::write(Self::sidecar_path(path), bytes)?;
    Ok(())
  }

  pub fn add(&self, ids: &[String], vectors: &[Vec<f32>]) -> Result<()> {
    let mut state = self.state.write();
    for (id, vector) in ids.iter().zip(vectors.iter()) {
      if vector.len() != self.config.dimensions {
        return Err(VectorError::DimensionMismatch { expected: self.config.dimensions, found: vector.len() });
      }

      if let Some(&existing_key) = state.id_to_key.get(id) {
        state.tombstones.insert(existing_key);
      }

      let key = state.next_key;
      state.next_key += 1;

      if self.index.size() + 1 > self.index.capacity() {
        self.index.reserve(self.index.capacity().max(1024) * 2).map_err(|e| VectorError::Usearch(e.to_string()))?;
      }
      self.index.add(key, vector).map_err(|e| VectorError::Usearch(e.to_string()))?;

      state.key_map.insert(key, id.clone());
      state.id_to_key.insert(id.clone(), key);
    }
    Ok(())
  }

  pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(String, f32)>> {
    if query.len() != self.config.dimensions {
      return Err(VectorError::DimensionMismatch { expected: self.config.dimensions, found: query.len() });
    }
    let state = self.state.read();
    if self.index.size() == 0 {
      return Ok(Vec::new());
    }

    // Over-fetch to compensate for tombstoned matches, then trim.
    let fetch = (top_k + state.tombstones.len()).max(top_k);
    let matches = self.index.search(query, fetch).map_err(|e| VectorError::Usearch(e.to_string()))?;

    let mut results = Vec::with_capacity(top_k);
    for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
      if state.tombstones.contains(key) {
        continue;
      }
      if let Some(id) = state.key_map.get(key) {
        results.push((id.clone(), 1.0 - distance));
      }
      if results.len() >= top_k {
        break;
      }
    }
    Ok(results)
  }

  pub fn delete(&self, ids: &[String]) -> Result<()> {
    let mut state = self.state.write();
    for id in ids {
      if let Some(&key) = state.id_to_key.get(id) {
        state.tombstones.insert(key);
      }
    }
    Ok(())
  }

  /// Live vector count: `count()` on the underlying graph over-reports while
  /// tombstones accumulate, so we subtract them here.
  pub fn count(&self) -> usize {
    let state = self.state.read();
    self.index.size().saturating_sub(state.tombstones.len())
  }

  /// Raw node count in the graph, including tombstoned entries.
  pub fn raw_count(&self) -> usize {
    self.index.size()
  }

  pub fn dimensions(&self) -> usize {
    self.config.dimensions
  }

  /// Rebuilds the graph from a fresh source of live embeddings, discarding
  /// tombstoned nodes. Callers supply the embedding records from the
  /// metadata store since this index does not durably own chunk content.
  /// Consumes `self`: the old graph is dropped in favor of the rebuilt one.
  pub fn compact(self, live: impl Iterator<Item = (String, Vec<f32>)>) -> Result<Self> {
    let fresh = Self::new(self.config)?;
    let mut ids = Vec::new();
    let mut vectors = Vec::new();
    for (id, vector) in live {
      ids.push(id);
      vectors.push(vector);
    }
    fresh.add(&ids, &vectors)?;
    Ok(fresh)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn unit(v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / norm).collect()
  }

  #[test]
  fn add_and_search_roundtrip() {
    let index = VectorIndex::new(VectorIndexConfig::new(4)).unwrap();
    index
      .add(
        &["a".into(), "b".into()],
        &[unit(vec![1.0, 0.0, 0.0, 0.0]), unit(vec![0.0, 1.0, 0.0, 0.0])],
      )
      .unwrap();

    let results = index.search(&unit(vec![1.0, 0.1, 0.0, 0.0]), 1).unwrap();
    assert_eq!(results[0].0, "a");
  }

  #[test]
  fn delete_tombstones_and_overreports_count() {
    let index = VectorIndex::new(VectorIndexConfig::new(4)).unwrap();
    index.add(&["a".into(), "b".into()], &[unit(vec![1.0, 0.0, 0.0, 0.0]), unit(vec![0.0, 1.0, 0.0, 0.0])]).unwrap();

    index.delete(&["a".into()]).unwrap();
    assert_eq!(index.count(), 1);
    assert_eq!(index.raw_count(), 2);

    let results = index.search(&unit(vec![1.0, 0.0, 0.0, 0.0]), 10).unwrap();
    assert!(results.iter().all(|(id, _)| id != "a"));
  }

  #[test]
  fn save_and_load_preserves_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.usearch");
    {
      let index = VectorIndex::new(VectorIndexConfig::new(4)).unwrap();
      index.add(&["a".into()], &[unit(vec![1.0, 0.0, 0.0, 0.0])]).unwrap();
      index.save(&path).unwrap();
    }

    let reloaded = VectorIndex::load(&path, VectorIndexConfig::new(4)).unwrap();
    assert_eq!(reloaded.count(), 1);
  }

  #[test]
  fn load_with_mismatched_dimensions_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.usearch");
    let index = VectorIndex::new(VectorIndexConfig::new(4)).unwrap();
    index.add(&["a".into()], &[unit(vec![1.0, 0.0, 0.0, 0.0])]).unwrap();
    index.save(&path).unwrap();

    let result = VectorIndex::load(&path, VectorIndexConfig::new(8));
    assert!(matches!(result, Err(VectorError::DimensionMismatch { .. })));
  }

  #[test]
  fn compact_discards_tombstoned_vectors() {
    let index = VectorIndex::new(VectorIndexConfig::new(4)).unwrap();
    index.add(&["a".into(), "b".into()], &[unit(vec![1.0, 0.0, 0.0, 0.0]), unit(vec![0.0, 1.0, 0.0, 0.0])]).unwrap();
    index.delete(&["a".into()]).unwrap();

    let live = vec![("b".to_string(), unit(vec![0.0, 1.0, 0.0, 0.0]))];
    let compacted = index.compact(live.into_iter()).unwrap();

    assert_eq!(compacted.count(), 1);
    assert_eq!(compacted.raw_count(), 1);
  }

  #[test]
  fn dimension_mismatch_on_add_is_rejected() {
    let index = VectorIndex::new(VectorIndexConfig::new(4)).unwrap();
    let result = index.add(&["a".into()], &[vec![1.0, 0.0]]);
    assert!(matches!(result, Err(VectorError::DimensionMismatch { .. })));
  }
}
