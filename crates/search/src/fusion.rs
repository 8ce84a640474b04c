//! Reciprocal Rank Fusion for combining lexical and dense retrieval.
//!
//! `score(d) = w_bm25 * 1/(k + rank_bm25(d)) + w_sem * 1/(k + rank_sem(d))`,
//! with a missing rank contributing zero. Ties break by chunk id ascending
//! so results are stable across runs that tie on score.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct FusedCandidate {
  pub id: String,
  pub score: f32,
  pub bm25_rank: Option<usize>,
  pub bm25_score: Option<f32>,
  pub vec_rank: Option<usize>,
  pub vec_score: Option<f32>,
}

pub fn fuse_rrf(
  bm25_results: &[(String, f32)],
  vector_results: &[(String, f32)],
  k: f32,
  bm25_weight: f64,
  vector_weight: f64,
) -> Vec<FusedCandidate> {
  let mut candidates: HashMap<String, FusedCandidate> = HashMap::new();

  for (rank, (id, score)) in bm25_results.iter().enumerate() {
    let contribution = (bm25_weight as f32) / (k + rank as f32);
    candidates.insert(
      id.clone(),
      FusedCandidate {
        id: id.clone(),
        score: contribution,
        bm25_rank: Some(rank),
        bm25_score: Some(*score),
        vec_rank: None,
        vec_score: None,
      },
    );
  }

  for (rank, (id, score)) in vector_results.iter().enumerate() {
    let contribution = (vector_weight as f32) / (k + rank as f32);
    candidates
      .entry(id.clone())
      .and_modify(|c| {
        c.score += contribution;
        c.vec_rank = Some(rank);
        c.vec_score = Some(*score);
      })
      .or_insert_with(|| FusedCandidate {
        id: id.clone(),
        score: contribution,
        bm25_rank: None,
        bm25_score: None,
        vec_rank: Some(rank),
        vec_score: Some(*score),
      });
  }

  let mut fused: Vec<FusedCandidate> = candidates.into_values().collect();
  fused.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then_with(|| a.id.cmp(&b.id))
  });
  fused
}

/// Merges fused result sets from multiple decomposed sub-queries, summing
/// scores for chunks that surface under more than one sub-query.
pub fn merge_fused(sets: Vec<Vec<FusedCandidate>>) -> Vec<FusedCandidate> {
  let mut merged: HashMap<String, FusedCandidate> = HashMap::new();
  for set in sets {
    for candidate in set {
      merged
        .entry(candidate.id.clone())
        .and_modify(|existing| {
          existing.score += candidate.score;
          if existing.bm25_rank.is_none() {
            existing.bm25_rank = candidate.bm25_rank;
            existing.bm25_score = candidate.bm25_score;
          }
          if existing.vec_rank.is_none() {
            existing.vec_rank = candidate.vec_rank;
            existing.vec_score = candidate.vec_score;
          }
        })
        .or_insert(candidate);
    }
  }

  let mut merged: Vec<FusedCandidate> = merged.into_values().collect();
  merged.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then_with(|| a.id.cmp(&b.id))
  });
  merged
}
