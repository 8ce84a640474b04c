use amanmcp_core::{CHARS_PER_TOKEN, Chunk, ContentType, Language};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
  #[error("unreadable file: {0}")]
  Io(#[from] std::io::Error),
  #[error("binary content detected, file skipped")]
  Binary,
}

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
  pub target_tokens: usize,
  pub min_tokens: usize,
  pub max_tokens: usize,
}

impl Default for ChunkerConfig {
  fn default() -> Self {
    Self {
      target_tokens: 400,
      min_tokens: 50,
      max_tokens: 800,
    }
  }
}

impl From<&amanmcp_core::IndexConfig> for ChunkerConfig {
  fn from(cfg: &amanmcp_core::IndexConfig) -> Self {
    Self {
      target_tokens: cfg.target_chunk_tokens,
      min_tokens: cfg.min_chunk_tokens,
      max_tokens: cfg.max_chunk_tokens,
    }
  }
}

/// Binary sniff: a NUL byte in the first 8KiB, or invalid UTF-8 on a
/// non-binary extension, both short-circuit to "skip with warning".
pub fn is_binary(bytes: &[u8]) -> bool {
  let window = &bytes[..bytes.len().min(8192)];
  if window.contains(&0u8) {
    return true;
  }
  std::str::from_utf8(window).is_err()
}

/// Determine a file's default content type from its language, before any
/// per-chunk sub-classification (e.g. comment runs) is applied.
pub fn classify_content_type(language: Option<Language>) -> ContentType {
  language.map(|l| l.default_content_type()).unwrap_or(ContentType::Code)
}

const COMMENT_RUN_THRESHOLD: usize = 4;

fn comment_prefixes(language: Language) -> &'static [&'static str] {
  match language {
    Language::Python | Language::Shell | Language::Toml | Language::Dockerfile | Language::Yaml => &["#"],
    Language::Sql | Language::Haskell | Language::Lua => &["--"],
    Language::Rust
    | Language::TypeScript
    | Language::JavaScript
    | Language::Tsx
    | Language::Jsx
    | Language::Go
    | Language::Java
    | Language::Kotlin
    | Language::Scala
    | Language::CSharp
    | Language::Cpp
    | Language::C
    | Language::Swift
    | Language::Php
    | Language::GraphQL
    | Language::Proto => &["//", "/*", "*"],
    Language::Ruby | Language::Elixir => &["#"],
    _ => &[],
  }
}

/// Whether a contiguous run of lines starting at `start` in `lines` is a
/// comment run at least `COMMENT_RUN_THRESHOLD` lines long; returns its
/// exclusive end index if so.
pub fn sniff_comment_run(lines: &[&str], start: usize, language: Language) -> Option<usize> {
  let prefixes = comment_prefixes(language);
  if prefixes.is_empty() {
    return None;
  }
  let mut end = start;
  while end < lines.len() {
    let trimmed = lines[end].trim_start();
    if trimmed.is_empty() || !prefixes.iter().any(|p| trimmed.starts_with(p)) {
      break;
    }
    end += 1;
  }
  if end - start >= COMMENT_RUN_THRESHOLD { Some(end) } else { None }
}

fn estimate_tokens(content: &str) -> usize {
  (content.len() / CHARS_PER_TOKEN).max(1)
}

/// Splits files into content-typed chunks. Prefers syntactic boundaries for
/// code, paragraph/heading boundaries for prose, and fixed-size windows for
/// data/config, subject to the configured token bounds.
pub struct Chunker {
  config: ChunkerConfig,
}

impl Default for Chunker {
  fn default() -> Self {
    Self::new(ChunkerConfig::default())
  }
}

impl Chunker {
  pub fn new(config: ChunkerConfig) -> Self {
    Self { config }
  }

  pub fn chunk(&self, file_id: &str, file_path: &str, bytes: &[u8], language: Option<Language>) -> Result<Vec<Chunk>, ChunkError> {
    if is_binary(bytes) {
      return Err(ChunkError::Binary);
    }
    let source = String::from_utf8_lossy(bytes);
    let language = language.unwrap_or(Language::PlainText);
    let default_type = classify_content_type(Some(language));

    let chunks = match default_type {
      ContentType::Docs => self.chunk_prose(file_id, file_path, &source, language),
      ContentType::Data => self.chunk_fixed_windows(file_id, file_path, &source, language, default_type),
      _ => self.chunk_code(file_id, file_path, &source, language),
    };
    Ok(chunks)
  }

  fn chunk_code(&self, file_id: &str, file_path: &str, source: &str, language: Language) -> Vec<Chunk> {
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
      return Vec::new();
    }
    let total = lines.len();

    if estimate_tokens(source) <= self.config.max_tokens {
      return self.emit_code_range(file_id, file_path, &lines, 0, total, language);
    }

    let boundaries = self.find_boundaries(&lines, language);
    let mut chunks = Vec::new();
    let mut current = 0usize;

    for boundary in boundaries {
      if boundary <= current {
        continue;
      }
      let chunk_tokens = estimate_tokens(&lines[current..boundary].join("\n"));
      if chunk_tokens >= self.config.target_tokens {
        chunks.extend(self.emit_code_range(file_id, file_path, &lines, current, boundary, language));
        current = boundary;
      }
    }
    if current < total {
      chunks.extend(self.emit_code_range(file_id, file_path, &lines, current, total, language));
    }
    if chunks.is_empty() {
      self.split_evenly(file_id, file_path, &lines, language)
    } else {
      chunks
    }
  }

  fn emit_code_range(&self, file_id: &str, file_path: &str, lines: &[&str], start: usize, end: usize, language: Language) -> Vec<Chunk> {
    let mut out = Vec::new();
    let mut i = start;
    while i < end {
      if let Some(run_end) = sniff_comment_run(lines, i, language) {
        let run_end = run_end.min(end);
        let content = lines[i..run_end].join("\n");
        out.push(Chunk::new(file_id, file_path, (i + 1) as u32, run_end as u32, content, ContentType::Comment, language));
        i = run_end;
      } else {
        let mut j = i;
        while j < end && sniff_comment_run(lines, j, language).is_none() {
          j += 1;
        }
        let content = lines[i..j].join("\n");
        if !content.trim().is_empty() {
          out.push(Chunk::new(file_id, file_path, (i + 1) as u32, j as u32, content, ContentType::Code, language));
        }
        i = j;
      }
    }
    out
  }

  fn find_boundaries(&self, lines: &[&str], language: Language) -> Vec<usize> {
    let mut boundaries = Vec::new();
    for (i, line) in lines.iter().enumerate() {
      let trimmed = line.trim();
      if trimmed.is_empty() {
        continue;
      }
      let is_boundary = match language {
        Language::Rust => {
          trimmed.starts_with("pub fn ")
            || trimmed.starts_with("fn ")
            || trimmed.starts_with("pub struct ")
            || trimmed.starts_with("struct ")
            || trimmed.starts_with("pub enum ")
            || trimmed.starts_with("enum ")
            || trimmed.starts_with("impl ")
            || trimmed.starts_with("pub trait ")
            || trimmed.starts_with("trait ")
            || trimmed.starts_with("pub mod ")
            || trimmed.starts_with("mod ")
        }
        Language::Python => {
          trimmed.starts_with("def ") || trimmed.starts_with("async def ") || trimmed.starts_with("class ")
        }
        Language::TypeScript | Language::JavaScript | Language::Tsx | Language::Jsx => {
          trimmed.starts_with("function ")
            || trimmed.starts_with("async function ")
            || trimmed.starts_with("export function ")
            || trimmed.starts_with("export async function ")
            || trimmed.starts_with("export default function ")
            || trimmed.starts_with("class ")
            || trimmed.starts_with("export class ")
            || trimmed.starts_with("export default class ")
            || trimmed.starts_with("interface ")
            || trimmed.starts_with("export interface ")
            || (trimmed.starts_with("const ") && (trimmed.contains(" = (") || trimmed.contains(" = async (")))
        }
        Language::Go => {
          trimmed.starts_with("func ")
            || (trimmed.starts_with("type ") && (trimmed.contains("struct") || trimmed.contains("interface")))
        }
        Language::Java | Language::Kotlin | Language::CSharp => {
          trimmed.contains("class ") || trimmed.contains("interface ") || trimmed.contains("void ") || trimmed.contains("public ")
        }
        _ => false,
      };
      if is_boundary {
        boundaries.push(i);
      }
    }
    boundaries
  }

  fn split_evenly(&self, file_id: &str, file_path: &str, lines: &[&str], language: Language) -> Vec<Chunk> {
    let total = lines.len();
    let chunk_count = (total * CHARS_PER_TOKEN / self.config.target_tokens.max(1) / 20).max(1);
    let size = (total / chunk_count).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < total {
      let end = (start + size).min(total);
      let content = lines[start..end].join("\n");
      chunks.push(Chunk::new(file_id, file_path, (start + 1) as u32, end as u32, content, ContentType::Code, language));
      start = end;
    }
    chunks
  }

  /// Prose chunking: split on blank-line paragraph breaks and markdown
  /// headings, accumulating paragraphs until the target token budget.
  fn chunk_prose(&self, file_id: &str, file_path: &str, source: &str, language: Language) -> Vec<Chunk> {
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
      return Vec::new();
    }

    let mut paragraphs: Vec<(usize, usize)> = Vec::new();
    let mut start = 0usize;
    for (i, line) in lines.iter().enumerate() {
      let is_heading = line.trim_start().starts_with('#');
      let is_blank = line.trim().is_empty();
      if (is_blank || is_heading) && i > start {
        paragraphs.push((start, i));
        start = if is_blank { i + 1 } else { i };
      }
    }
    if start < lines.len() {
      paragraphs.push((start, lines.len()));
    }
    paragraphs.retain(|(s, e)| lines[*s..*e].iter().any(|l| !l.trim().is_empty()));

    let mut chunks = Vec::new();
    let mut acc_start: Option<usize> = None;
    let mut acc_end = 0usize;

    for (p_start, p_end) in paragraphs {
      if acc_start.is_none() {
        acc_start = Some(p_start);
      }
      acc_end = p_end;
      let content = lines[acc_start.unwrap()..acc_end].join("\n");
      if estimate_tokens(&content) >= self.config.target_tokens {
        chunks.push(Chunk::new(
          file_id,
          file_path,
          (acc_start.unwrap() + 1) as u32,
          acc_end as u32,
          content,
          ContentType::Docs,
          language,
        ));
        acc_start = None;
      }
    }
    if let Some(s) = acc_start {
      let content = lines[s..acc_end].join("\n");
      if !content.trim().is_empty() {
        chunks.push(Chunk::new(file_id, file_path, (s + 1) as u32, acc_end as u32, content, ContentType::Docs, language));
      }
    }
    if chunks.is_empty() {
      chunks.push(Chunk::new(
        file_id,
        file_path,
        1,
        lines.len() as u32,
        source.to_string(),
        ContentType::Docs,
        language,
      ));
    }
    chunks
  }

  fn chunk_fixed_windows(&self, file_id: &str, file_path: &str, source: &str, language: Language, content_type: ContentType) -> Vec<Chunk> {
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
      return Vec::new();
    }
    if estimate_tokens(source) <= self.config.max_tokens {
      return vec![Chunk::new(file_id, file_path, 1, lines.len() as u32, source.to_string(), content_type, language)];
    }

    let lines_per_window = (self.config.target_tokens * CHARS_PER_TOKEN / 40).max(10);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < lines.len() {
      let end = (start + lines_per_window).min(lines.len());
      let content = lines[start..end].join("\n");
      chunks.push(Chunk::new(file_id, file_path, (start + 1) as u32, end as u32, content, content_type, language));
      start = end;
    }
    chunks
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_chunk_small_rust_file() {
    let chunker = Chunker::default();
    let source = b"fn main() {\n    println!(\"hi\");\n}\n";
    let chunks = chunker.chunk("f1", "main.rs", source, Some(Language::Rust)).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content_type, ContentType::Code);
    assert_eq!(chunks[0].start_line, 1);
  }

  #[test]
  fn test_chunk_large_rust_file_splits() {
    let chunker = Chunker::default();
    let source = (0..400).map(|i| format!("fn func{i}() {{ let _ = {i}; }}")).collect::<Vec<_>>().join("\n");
    let chunks = chunker.chunk("f1", "large.rs", source.as_bytes(), Some(Language::Rust)).unwrap();
    assert!(chunks.len() > 1);
  }

  #[test]
  fn test_content_addressed_id_stable() {
    let chunker = Chunker::default();
    let chunks_a = chunker.chunk("f1", "a.rs", b"fn a() {}", Some(Language::Rust)).unwrap();
    let chunks_b = chunker.chunk("f2", "a.rs", b"fn a() {}", Some(Language::Rust)).unwrap();
    assert_eq!(chunks_a[0].id, chunks_b[0].id);
  }

  #[test]
  fn test_binary_detected() {
    let chunker = Chunker::default();
    let bytes = [0u8, 1, 2, 3, 0, 0, 255];
    let err = chunker.chunk("f1", "bin.dat", &bytes, None).unwrap_err();
    assert!(matches!(err, ChunkError::Binary));
  }

  #[test]
  fn test_empty_file_yields_zero_chunks() {
    let chunker = Chunker::default();
    let chunks = chunker.chunk("f1", "empty.rs", b"", Some(Language::Rust)).unwrap();
    assert!(chunks.is_empty());
  }

  #[test]
  fn test_markdown_prose_chunking() {
    let chunker = Chunker::default();
    let source = "# Title\n\nSome intro text.\n\n## Section\n\nMore content here.\n";
    let chunks = chunker.chunk("f1", "doc.md", source.as_bytes(), Some(Language::Markdown)).unwrap();
    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|c| c.content_type == ContentType::Docs));
  }

  #[test]
  fn test_comment_run_detected() {
    let lines = vec!["// one", "// two", "// three", "// four", "fn x() {}"];
    let end = sniff_comment_run(&lines, 0, Language::Rust);
    assert_eq!(end, Some(4));
  }

  #[test]
  fn test_short_comment_run_not_tagged() {
    let lines = vec!["// one", "fn x() {}"];
    assert_eq!(sniff_comment_run(&lines, 0, Language::Rust), None);
  }

  #[test]
  fn test_data_file_chunked_as_data() {
    let chunker = Chunker::default();
    let source = "{\n  \"a\": 1\n}\n";
    let chunks = chunker.chunk("f1", "x.json", source.as_bytes(), Some(Language::Json)).unwrap();
    assert_eq!(chunks[0].content_type, ContentType::Data);
  }
}
