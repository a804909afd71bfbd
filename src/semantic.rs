//! Semantic nearest-neighbor search and embedding providers.
//!
//! The [`SemanticIndex`] trait is the boundary to the vector store: the
//! searcher only ever asks for nearest neighbors by query embedding. This
//! crate ships [`InMemorySemanticIndex`], which holds chunk vectors in
//! memory and computes cosine distance directly; a remote vector store
//! implements the same trait and reports connectivity problems as
//! [`RetrievalError::IndexUnavailable`].
//!
//! Embedding backends implement [`EmbeddingProvider`]:
//! - **`hashed`** — deterministic feature-hashing embedder, no network.
//! - **`openai`** — OpenAI embeddings API with retry and exponential
//!   backoff (429/5xx retried, other 4xx fail immediately). Callers
//!   bound request size via `embedding.batch_size`; see
//!   [`crate::index::index_corpus`].
//! - **`disabled`** — always errors; semantic search unavailable.
//!
//! Providers are constructed through [`EmbedderCache::get_or_load`], which
//! gives single-flight semantics per model name: the first caller loads,
//! concurrent callers for the same name wait on the cache lock instead of
//! triggering duplicate loads.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::RetrievalError;
use crate::lexical::tokenize;
use crate::models::{Chunk, ChunkMetadata, SearchFilters};

/// One neighbor returned by the semantic index.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub chunk: Chunk,
    pub metadata: ChunkMetadata,
    /// Cosine distance in [0, ~2]; lower is closer.
    pub distance: f64,
}

/// Nearest-neighbor search over chunk embeddings.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Return up to `k` neighbors closest to `query_embedding`, optionally
    /// restricted by metadata filters.
    ///
    /// An empty corpus yields an empty list, never an error.
    async fn nearest_neighbors(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&SearchFilters>,
    ) -> Result<Vec<Neighbor>, RetrievalError>;
}

/// In-memory semantic index: chunk vectors held in a Vec, cosine distance
/// computed per query.
///
/// Construction replaces state wholesale; build a fresh instance and swap
/// it in rather than mutating one that is being searched.
#[derive(Default)]
pub struct InMemorySemanticIndex {
    entries: Vec<(Chunk, ChunkMetadata, Vec<f32>)>,
}

impl InMemorySemanticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chunk: Chunk, metadata: ChunkMetadata, embedding: Vec<f32>) {
        self.entries.push((chunk, metadata, embedding));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SemanticIndex for InMemorySemanticIndex {
    async fn nearest_neighbors(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&SearchFilters>,
    ) -> Result<Vec<Neighbor>, RetrievalError> {
        let mut neighbors: Vec<Neighbor> = self
            .entries
            .iter()
            .filter(|(_, metadata, _)| filter.map(|f| f.matches(metadata)).unwrap_or(true))
            .map(|(chunk, metadata, embedding)| {
                let similarity = cosine_similarity(query_embedding, embedding) as f64;
                Neighbor {
                    chunk: chunk.clone(),
                    metadata: metadata.clone(),
                    distance: 1.0 - similarity,
                }
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

/// Cosine similarity between two vectors. Mismatched or zero-magnitude
/// vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ============ Embedding providers ============

/// An embedding backend. `embed` must be deterministic for identical
/// input so query embeddings are reproducible.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Embedding dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;

    /// Embed a single query text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("empty embedding response".into()))
    }
}

/// Always-erroring provider for configurations without embeddings.
pub struct DisabledEmbedder;

#[async_trait]
impl EmbeddingProvider for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Err(RetrievalError::EmbeddingDisabled)
    }
}

/// Deterministic local embedder: feature-hashes tokens into a fixed-width
/// bag-of-words vector, L2-normalized.
///
/// Crude as semantics go, but it is fast, needs no network, and identical
/// input always yields identical vectors — which is all the ranking
/// pipeline requires of it.
pub struct HashedEmbedder {
    dims: usize,
}

impl HashedEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let slot = (hasher.finish() % self.dims as u64) as usize;
            vec[slot] += 1.0;
        }
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashedEmbedder {
    fn model_name(&self) -> &str {
        "hashed"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// OpenAI embeddings API provider.
///
/// Calls `POST {base}/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable, read once at construction.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RetrievalError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("embedding.model required".into()))?;
        let dims = config
            .dims
            .ok_or_else(|| RetrievalError::EmbeddingFailed("embedding.dims required".into()))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| RetrievalError::EmbeddingFailed("OPENAI_API_KEY not set".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;
        Ok(Self {
            model,
            dims,
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<RetrievalError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ... capped at 32s.
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(RetrievalError::IndexUnavailable(e.to_string()));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                last_err = Some(RetrievalError::EmbeddingFailed(format!(
                    "HTTP {status} from embeddings API"
                )));
                continue;
            }
            if !status.is_success() {
                return Err(RetrievalError::EmbeddingFailed(format!(
                    "HTTP {status} from embeddings API"
                )));
            }

            let payload: serde_json::Value = response
                .json()
                .await
                .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

            let data = payload["data"].as_array().ok_or_else(|| {
                RetrievalError::EmbeddingFailed("missing data array in response".into())
            })?;

            let mut vectors = Vec::with_capacity(data.len());
            for item in data {
                let vec: Vec<f32> = item["embedding"]
                    .as_array()
                    .ok_or_else(|| {
                        RetrievalError::EmbeddingFailed("missing embedding in response".into())
                    })?
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect();
                vectors.push(vec);
            }
            return Ok(vectors);
        }

        Err(last_err
            .unwrap_or_else(|| RetrievalError::EmbeddingFailed("retries exhausted".into())))
    }
}

/// Construct the provider named by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, RetrievalError> {
    match config.provider.as_str() {
        "hashed" => Ok(Arc::new(HashedEmbedder::new(config.dims.unwrap_or(256)))),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        other => Err(RetrievalError::EmbeddingFailed(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

/// Cache of constructed embedding providers, keyed by provider/model name.
///
/// The lock is held across construction, so the first caller for a given
/// key loads the provider and concurrent callers for the same key wait for
/// it rather than loading twice.
#[derive(Default)]
pub struct EmbedderCache {
    providers: Mutex<HashMap<String, Arc<dyn EmbeddingProvider>>>,
}

impl EmbedderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(
        &self,
        config: &EmbeddingConfig,
    ) -> Result<Arc<dyn EmbeddingProvider>, RetrievalError> {
        let key = format!(
            "{}:{}",
            config.provider,
            config.model.as_deref().unwrap_or("default")
        );
        let mut providers = self
            .providers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = providers.get(&key) {
            return Ok(existing.clone());
        }
        let created = create_embedder(config)?;
        providers.insert(key, created.clone());
        Ok(created)
    }
}
