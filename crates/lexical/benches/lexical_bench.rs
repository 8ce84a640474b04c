use criterion::{Criterion, black_box, criterion_group, criterion_main};
use lexical::{Bm25Params, LexicalBackend, LexicalDoc, SingleFileBackend};

fn bench_search(c: &mut Criterion) {
  let dir = tempfile::tempdir().unwrap();
  let backend = SingleFileBackend::open(dir.path().join("bm25.db"), Bm25Params::default()).unwrap();
  let docs: Vec<(String, String)> =
    (0..2000).map(|i| (format!("chunk{i}"), format!("fn handler_{i}(request: Request) -> Response"))).collect();
  let lexical_docs: Vec<LexicalDoc> =
    docs.iter().map(|(id, content)| LexicalDoc { id, file_path: "handlers.rs", content }).collect();
  backend.index(&lexical_docs).unwrap();

  c.bench_function("bm25_search_2000_docs", |b| {
    b.iter(|| backend.search(black_box("handler request"), 10, None).unwrap())
  });
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
