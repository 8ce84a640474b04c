use criterion::{Criterion, black_box, criterion_group, criterion_main};
use vector::{VectorIndex, VectorIndexConfig};

fn unit(seed: u64, dims: usize) -> Vec<f32> {
  let mut v: Vec<f32> = (0..dims).map(|i| ((seed.wrapping_mul(31).wrapping_add(i as u64)) % 997) as f32).collect();
  let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
  for x in &mut v {
    *x /= norm;
  }
  v
}

fn bench_search(c: &mut Criterion) {
  let dims = 256;
  let index = VectorIndex::new(VectorIndexConfig::new(dims)).unwrap();
  let ids: Vec<String> = (0..5000).map(|i| format!("chunk{i}")).collect();
  let vectors: Vec<Vec<f32>> = (0..5000u64).map(|i| unit(i, dims)).collect();
  index.add(&ids, &vectors).unwrap();

  let query = unit(42, dims);
  c.bench_function("hnsw_search_5000_vectors", |b| b.iter(|| index.search(black_box(&query), 10).unwrap()));
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
