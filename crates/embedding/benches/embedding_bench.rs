use criterion::{Criterion, black_box, criterion_group, criterion_main};
use embedding::StaticEmbedder;

fn bench_static_embed(c: &mut Criterion) {
  let embedder = StaticEmbedder::new();
  let text = "fn compute_checksum(bytes: &[u8]) -> u32 { bytes.iter().fold(0, |a, b| a ^ *b as u32) }";
  c.bench_function("static_embed_one", |b| b.iter(|| embedder.embed_one(black_box(text))));
}

criterion_group!(benches, bench_static_embed);
criterion_main!(benches);
