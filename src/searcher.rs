//! The primary read API: semantic + lexical retrieval fused into one
//! ranked result list.
//!
//! [`CorpusSearcher`] embeds the query, collects candidates from the
//! semantic index (and, in hybrid mode, the BM25 index), applies metadata
//! filters, and hands the signals to [`crate::scoring::combine`]. Zero
//! matches is a normal outcome and returns an empty list; only an
//! unreachable backing store is an error.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RetrievalError;
use crate::lexical::LexicalIndex;
use crate::models::{SearchFilters, SearchResult};
use crate::scoring::{self, Weighting};
use crate::semantic::{EmbeddingProvider, SemanticIndex};

/// Candidate pool size fetched from each channel before fusion.
const DEFAULT_CANDIDATE_K: usize = 80;

pub struct CorpusSearcher {
    semantic: Arc<dyn SemanticIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    lexical: Arc<LexicalIndex>,
    candidate_k: usize,
}

impl CorpusSearcher {
    pub fn new(
        semantic: Arc<dyn SemanticIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        lexical: Arc<LexicalIndex>,
    ) -> Self {
        Self {
            semantic,
            embedder,
            lexical,
            candidate_k: DEFAULT_CANDIDATE_K,
        }
    }

    pub fn with_candidate_k(mut self, candidate_k: usize) -> Self {
        self.candidate_k = candidate_k.max(1);
        self
    }

    /// Search the corpus and return at most `n_results` results, ordered
    /// by descending combined score.
    pub async fn search(
        &self,
        query: &str,
        n_results: usize,
        filters: Option<&SearchFilters>,
        weighting: Weighting,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        if query.trim().is_empty() || n_results == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;

        let candidate_k = self.candidate_k.max(n_results);
        let neighbors = self
            .semantic
            .nearest_neighbors(&query_embedding, candidate_k, filters)
            .await?;

        let now = Utc::now();
        let mut results: Vec<SearchResult> = neighbors
            .into_iter()
            .map(|n| {
                let similarity = scoring::similarity_from_distance(n.distance);
                let recency = scoring::recency_score(&n.metadata, now);
                let quality = scoring::quality_score(&n.metadata);
                SearchResult {
                    chunk_id: n.chunk.id,
                    content: n.chunk.text,
                    metadata: n.metadata,
                    distance: n.distance,
                    similarity,
                    recency_score: recency,
                    quality_score: quality,
                    bm25_score: 0.0,
                    score: 0.0,
                }
            })
            .collect();

        if let Weighting::Hybrid { .. } = weighting {
            self.attach_lexical_scores(query, &mut results);
        }

        Ok(scoring::combine(results, weighting, n_results))
    }

    /// Fill in normalized BM25 scores for chunks present in the lexical
    /// results. Chunks absent from the lexical channel keep 0.
    fn attach_lexical_scores(&self, query: &str, results: &mut [SearchResult]) {
        let hits = self.lexical.search(query, self.candidate_k);
        if hits.is_empty() {
            return;
        }

        let raw: Vec<f64> = hits.iter().map(|h| h.score).collect();
        let normalized = scoring::normalize_scores(&raw);
        let by_chunk: HashMap<&str, f64> = hits
            .iter()
            .zip(normalized.iter())
            .map(|(h, &s)| (h.doc_id.as_str(), s))
            .collect();

        for result in results.iter_mut() {
            if let Some(&s) = by_chunk.get(result.chunk_id.as_str()) {
                result.bm25_score = s;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::IndexDocument;
    use crate::models::{Chunk, ChunkMetadata, QualityRating};
    use crate::semantic::{EmbeddingProvider, HashedEmbedder, InMemorySemanticIndex, Neighbor};
    use async_trait::async_trait;
    use chrono::Duration;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: format!("doc-{id}"),
            text: text.to_string(),
            chunk_index: 0,
            heading: None,
            start_offset: 0,
            end_offset: text.len(),
            hash: String::new(),
        }
    }

    async fn searcher_over(
        entries: Vec<(&str, &str, ChunkMetadata)>,
    ) -> CorpusSearcher {
        let embedder = Arc::new(HashedEmbedder::new(256));
        let mut semantic = InMemorySemanticIndex::new();
        let mut lexical = LexicalIndex::default();
        let docs: Vec<IndexDocument> = entries
            .iter()
            .map(|(id, text, _)| IndexDocument {
                id: id.to_string(),
                content: text.to_string(),
            })
            .collect();
        lexical.build(&docs);

        for (id, text, metadata) in entries {
            let embedding = embedder.embed(text).await.unwrap();
            semantic.insert(chunk(id, text), metadata, embedding);
        }

        CorpusSearcher::new(Arc::new(semantic), embedder, Arc::new(lexical))
    }

    /// Stands in for a vector store that cannot be reached.
    struct UnreachableIndex;

    #[async_trait]
    impl SemanticIndex for UnreachableIndex {
        async fn nearest_neighbors(
            &self,
            _query_embedding: &[f32],
            _k: usize,
            _filter: Option<&SearchFilters>,
        ) -> Result<Vec<Neighbor>, RetrievalError> {
            Err(RetrievalError::IndexUnavailable(
                "vector store offline".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn unreachable_index_surfaces_typed_error() {
        let searcher = CorpusSearcher::new(
            Arc::new(UnreachableIndex),
            Arc::new(HashedEmbedder::new(256)),
            Arc::new(LexicalIndex::default()),
        );
        let err = searcher
            .search("any query", 5, None, Weighting::SimilarityOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::IndexUnavailable(_)));
    }

    #[tokio::test]
    async fn empty_query_returns_empty() {
        let searcher = searcher_over(vec![("c1", "text", ChunkMetadata::default())]).await;
        let results = searcher
            .search("", 10, None, Weighting::SimilarityOnly)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn empty_corpus_returns_empty() {
        let searcher = searcher_over(vec![]).await;
        let results = searcher
            .search("anything", 10, None, Weighting::SimilarityOnly)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn results_bounded_and_sorted() {
        let searcher = searcher_over(vec![
            ("c1", "rust ownership model", ChunkMetadata::default()),
            ("c2", "rust async await", ChunkMetadata::default()),
            ("c3", "gardening in spring rain", ChunkMetadata::default()),
        ])
        .await;
        let results = searcher
            .search("rust ownership", 2, None, Weighting::SimilarityOnly)
            .await
            .unwrap();
        assert!(results.len() <= 2);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(results[0].chunk_id, "c1");
    }

    #[tokio::test]
    async fn similarity_derived_from_distance() {
        let searcher = searcher_over(vec![(
            "c1",
            "exact phrase to find",
            ChunkMetadata::default(),
        )])
        .await;
        let results = searcher
            .search("exact phrase to find", 1, None, Weighting::SimilarityOnly)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert!((r.similarity - (1.0 - r.distance).clamp(0.0, 1.0)).abs() < 1e-9);
        assert!(r.similarity > 0.99);
    }

    #[tokio::test]
    async fn quality_filter_applies() {
        let preferred = ChunkMetadata {
            quality: Some(QualityRating::Preferred),
            ..Default::default()
        };
        let deprecated = ChunkMetadata {
            quality: Some(QualityRating::Deprecated),
            ..Default::default()
        };
        let searcher = searcher_over(vec![
            ("good", "meeting notes from the launch", preferred),
            ("bad", "meeting notes from the launch", deprecated),
        ])
        .await;

        let filters = SearchFilters {
            qualities: vec![QualityRating::Preferred],
            ..Default::default()
        };
        let results = searcher
            .search("meeting notes", 10, Some(&filters), Weighting::SimilarityOnly)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "good");
    }

    #[tokio::test]
    async fn hybrid_mode_rewards_lexical_hits() {
        let searcher = searcher_over(vec![
            (
                "lex",
                "agile transformation twice: agile transformation",
                ChunkMetadata::default(),
            ),
            ("sem", "iterative process change", ChunkMetadata::default()),
        ])
        .await;
        let results = searcher
            .search(
                "agile",
                10,
                None,
                Weighting::Hybrid {
                    semantic: 0.5,
                    lexical: 0.5,
                },
            )
            .await
            .unwrap();
        assert_eq!(results[0].chunk_id, "lex");
        assert!(results[0].bm25_score > 0.0);
        // The chunk with no lexical overlap contributes 0 for that signal.
        let sem = results.iter().find(|r| r.chunk_id == "sem").unwrap();
        assert_eq!(sem.bm25_score, 0.0);
    }

    #[tokio::test]
    async fn recency_weighting_prefers_fresh_chunks() {
        let now = Utc::now();
        let fresh = ChunkMetadata {
            created_at: Some(now),
            ..Default::default()
        };
        let stale = ChunkMetadata {
            created_at: Some(now - Duration::days(365 * 9)),
            ..Default::default()
        };
        // Identical text, so similarity ties; recency breaks the tie.
        let searcher = searcher_over(vec![
            ("old", "quarterly planning notes", stale),
            ("new", "quarterly planning notes", fresh),
        ])
        .await;
        let results = searcher
            .search(
                "quarterly planning",
                10,
                None,
                Weighting::Recency { weight: 0.5 },
            )
            .await
            .unwrap();
        assert_eq!(results[0].chunk_id, "new");
    }
}
