//! Core data models used throughout Draftsmith.
//!
//! These types represent the chunks, search results, and generation records
//! that flow through the retrieval and quality-gate pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of retrievable text, extracted from a source document.
///
/// Immutable once created; owned by the index that stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    /// Ordinal position of this chunk within its document, starting at 0.
    pub chunk_index: i64,
    /// Section heading this chunk falls under, when the source had one.
    pub heading: Option<String>,
    /// Offsets into the source document body.
    pub start_offset: usize,
    pub end_offset: usize,
    /// SHA-256 of the chunk text, for staleness detection.
    pub hash: String,
}

/// Ordered quality rating for corpus material.
///
/// Ordering: `Preferred > Reference > Supplemental > Deprecated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityRating {
    Deprecated,
    Supplemental,
    Reference,
    Preferred,
}

impl QualityRating {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "preferred" => Some(Self::Preferred),
            "reference" | "standard" => Some(Self::Reference),
            "supplemental" => Some(Self::Supplemental),
            "deprecated" => Some(Self::Deprecated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preferred => "preferred",
            Self::Reference => "reference",
            Self::Supplemental => "supplemental",
            Self::Deprecated => "deprecated",
        }
    }
}

/// Sidecar attributes used only for scoring and filtering. One per [`Chunk`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMetadata {
    pub quality: Option<QualityRating>,
    pub created_at: Option<DateTime<Utc>>,
    /// Document format label (e.g. `"markdown"`, `"text"`).
    pub format: String,
    pub tags: Vec<String>,
    /// Human-readable source name (e.g. a relative file path).
    pub source: String,
}

impl Default for ChunkMetadata {
    fn default() -> Self {
        Self {
            quality: None,
            created_at: None,
            format: "text".to_string(),
            tags: Vec::new(),
            source: String::new(),
        }
    }
}

/// A ranked result produced per query by the searcher.
///
/// `score` is a convex combination of the signals enabled for the query:
/// any weight not assigned to recency/quality/lexical falls back to
/// similarity. Ephemeral; created per query and discarded after use.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Raw cosine distance reported by the semantic index, in [0, ~2].
    pub distance: f64,
    /// `1 − distance`, clamped to [0, 1].
    pub similarity: f64,
    pub recency_score: f64,
    pub quality_score: f64,
    /// Raw BM25 score for this chunk, query-relative and unbounded.
    /// 0.0 when the chunk had no lexical hit.
    pub bm25_score: f64,
    /// Final combined ranking score.
    pub score: f64,
}

/// Optional metadata filters applied during search.
///
/// Empty fields match everything. Tag matching is "any of" and
/// case-insensitive, as is format matching.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub qualities: Vec<QualityRating>,
    pub formats: Vec<String>,
    pub tags: Vec<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.qualities.is_empty() && self.formats.is_empty() && self.tags.is_empty()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if !self.qualities.is_empty() {
            match metadata.quality {
                Some(q) if self.qualities.contains(&q) => {}
                _ => return false,
            }
        }

        if !self.formats.is_empty()
            && !self
                .formats
                .iter()
                .any(|f| f.eq_ignore_ascii_case(&metadata.format))
        {
            return false;
        }

        if !self.tags.is_empty() {
            let any = self.tags.iter().any(|wanted| {
                metadata
                    .tags
                    .iter()
                    .any(|have| have.eq_ignore_ascii_case(wanted))
            });
            if !any {
                return false;
            }
        }

        true
    }
}

/// Ordered quality level derived from an assessment score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityLevel {
    Unacceptable,
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl QualityLevel {
    /// Bucket a 0–5 score into a level.
    pub fn from_score(score: f64) -> Self {
        if score >= 4.5 {
            Self::Excellent
        } else if score >= 3.5 {
            Self::Good
        } else if score >= 2.5 {
            Self::Acceptable
        } else if score >= 1.5 {
            Self::Poor
        } else {
            Self::Unacceptable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Acceptable => "acceptable",
            Self::Poor => "poor",
            Self::Unacceptable => "unacceptable",
        }
    }
}

/// Count of rubric violations bucketed by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViolationCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl ViolationCounts {
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// Result of assessing one generated draft against the rubric.
///
/// Invariant: `retry_suggested` is true whenever
/// `score < min_acceptable_score` or `violations.critical >
/// allowed_critical` for the thresholds the assessor was built with.
#[derive(Debug, Clone)]
pub struct QualityAssessment {
    /// Holistic score on a 0–5 scale.
    pub score: f64,
    pub level: QualityLevel,
    pub violations: ViolationCounts,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub retry_suggested: bool,
}

/// One trial of the retry loop, retained for audit.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Name of the prompt variant used for this attempt.
    pub variant: String,
    pub outline: String,
    pub draft: String,
    pub assessment: QualityAssessment,
}

/// Terminal output of the retry orchestrator.
///
/// Invariants: `success` is true iff the final attempt's assessment met the
/// acceptance criteria; `total_attempts <= max_retries + 1`.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub success: bool,
    pub attempts: Vec<GenerationAttempt>,
    pub total_attempts: u32,
}

impl GenerationResult {
    /// The final attempt, if any attempt ran (always present for
    /// uncancelled runs).
    pub fn final_attempt(&self) -> Option<&GenerationAttempt> {
        self.attempts.last()
    }

    /// The final attempt's assessment.
    pub fn final_assessment(&self) -> Option<&QualityAssessment> {
        self.attempts.last().map(|a| &a.assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_rating_ordering() {
        assert!(QualityRating::Preferred > QualityRating::Reference);
        assert!(QualityRating::Reference > QualityRating::Supplemental);
        assert!(QualityRating::Supplemental > QualityRating::Deprecated);
    }

    #[test]
    fn quality_rating_parse_aliases() {
        assert_eq!(QualityRating::parse("standard"), Some(QualityRating::Reference));
        assert_eq!(QualityRating::parse("PREFERRED"), Some(QualityRating::Preferred));
        assert_eq!(QualityRating::parse("bogus"), None);
    }

    #[test]
    fn empty_filters_match_everything() {
        let filters = SearchFilters::default();
        assert!(filters.matches(&ChunkMetadata::default()));
    }

    #[test]
    fn tag_filter_is_any_of_and_case_insensitive() {
        let meta = ChunkMetadata {
            tags: vec!["Essays".to_string(), "work".to_string()],
            ..Default::default()
        };
        let filters = SearchFilters {
            tags: vec!["ESSAYS".to_string(), "missing".to_string()],
            ..Default::default()
        };
        assert!(filters.matches(&meta));

        let none = SearchFilters {
            tags: vec!["poetry".to_string()],
            ..Default::default()
        };
        assert!(!none.matches(&meta));
    }

    #[test]
    fn quality_filter_excludes_unrated() {
        let filters = SearchFilters {
            qualities: vec![QualityRating::Preferred],
            ..Default::default()
        };
        assert!(!filters.matches(&ChunkMetadata::default()));
        let rated = ChunkMetadata {
            quality: Some(QualityRating::Preferred),
            ..Default::default()
        };
        assert!(filters.matches(&rated));
    }

    #[test]
    fn quality_level_buckets() {
        assert_eq!(QualityLevel::from_score(5.0), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(4.0), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(3.0), QualityLevel::Acceptable);
        assert_eq!(QualityLevel::from_score(2.0), QualityLevel::Poor);
        assert_eq!(QualityLevel::from_score(0.0), QualityLevel::Unacceptable);
    }
}
