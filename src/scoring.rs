//! Signal fusion: recency, quality, similarity, and lexical scores into
//! one ranking score.
//!
//! Pure, stateless functions over [`SearchResult`]s plus a "now"
//! timestamp. Every combination function is total: a result missing a
//! signal (e.g. no BM25 hit) contributes 0 for that signal rather than
//! erroring.

use chrono::{DateTime, Utc};

use crate::models::{ChunkMetadata, QualityRating, SearchResult};

/// Weighting mode for [`combine`].
///
/// Weights are deliberately not validated to sum to 1: in the recency,
/// quality, and combined modes any unused weight falls to similarity, and
/// a well-formed caller keeps `recency + quality <= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Weighting {
    /// Rank purely by semantic similarity.
    SimilarityOnly,
    /// `(1 − w)·similarity + w·recency`.
    Recency { weight: f64 },
    /// `(1 − w)·similarity + w·quality`.
    Quality { weight: f64 },
    /// `(1 − w_r − w_q)·similarity + w_r·recency + w_q·quality`.
    Combined { recency: f64, quality: f64 },
    /// `w_sem·similarity + w_lex·normalizedBM25`.
    Hybrid { semantic: f64, lexical: f64 },
}

/// Derive similarity from a raw cosine distance: `1 − distance`, clamped
/// to [0, 1]. Distances ≥ 1 score exactly 0; distances ≤ 0 score exactly 1.
pub fn similarity_from_distance(distance: f64) -> f64 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Recency score in [0, 1].
///
/// No creation date is neutral 0.5. Otherwise `1 / (1 + days_old/365)`:
/// full score today, ≈0.5 at one year, ≈0.1 beyond nine years. The decay
/// never reaches exactly 0, so very old but otherwise strong matches stay
/// retrievable.
pub fn recency_score(metadata: &ChunkMetadata, now: DateTime<Utc>) -> f64 {
    match metadata.created_at {
        Some(created) => {
            let days_old = (now - created).num_days().max(0) as f64;
            (1.0 / (1.0 + days_old / 365.0)).clamp(0.0, 1.0)
        }
        None => 0.5,
    }
}

/// Quality score in [0, 1], mapped from the ordered rating.
///
/// Unknown (absent) ratings default to 0.5.
pub fn quality_score(metadata: &ChunkMetadata) -> f64 {
    match metadata.quality {
        Some(QualityRating::Preferred) => 1.0,
        Some(QualityRating::Reference) => 0.5,
        Some(QualityRating::Supplemental) => 0.3,
        Some(QualityRating::Deprecated) => 0.1,
        None => 0.5,
    }
}

/// Min-max normalize raw scores to [0, 1].
///
/// A single-valued or constant set maps to all-1.0 (a lone lexical hit is
/// still a hit). Empty input maps to empty output.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    if raw.is_empty() {
        return Vec::new();
    }
    let s_min = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    raw.iter()
        .map(|&s| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

/// Fuse per-result signals into `score`, re-sort descending, truncate to
/// `n_results`.
///
/// The hybrid mode expects `bm25_score` fields to already be normalized to
/// [0, 1]; results absent from the lexical channel carry 0 there.
pub fn combine(mut results: Vec<SearchResult>, weighting: Weighting, n_results: usize) -> Vec<SearchResult> {
    for r in &mut results {
        r.score = match weighting {
            Weighting::SimilarityOnly => r.similarity,
            Weighting::Recency { weight } => {
                (1.0 - weight) * r.similarity + weight * r.recency_score
            }
            Weighting::Quality { weight } => {
                (1.0 - weight) * r.similarity + weight * r.quality_score
            }
            Weighting::Combined { recency, quality } => {
                (1.0 - recency - quality) * r.similarity
                    + recency * r.recency_score
                    + quality * r.quality_score
            }
            Weighting::Hybrid { semantic, lexical } => {
                semantic * r.similarity + lexical * r.bm25_score
            }
        };
    }

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(n_results);
    results
}
