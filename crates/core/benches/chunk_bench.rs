use amanmcp_core::{Chunk, ContentType, Language};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn bench_chunk_id(c: &mut Criterion) {
  let content = "fn main() {\n    println!(\"hello\");\n}\n".repeat(20);
  c.bench_function("chunk_compute_id", |b| {
    b.iter(|| Chunk::compute_id(black_box("src/main.rs"), ContentType::Code, Language::Rust, black_box(&content)))
  });
}

criterion_group!(benches, bench_chunk_id);
criterion_main!(benches);
