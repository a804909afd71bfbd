use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub rubric: RubricConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    400
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Weight given to the semantic channel in hybrid mode; the lexical
    /// channel gets `1 − semantic_weight`.
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    /// Weight shifted from similarity to recency in recency/combined modes.
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    /// Weight shifted from similarity to quality in quality/combined modes.
    #[serde(default = "default_quality_weight")]
    pub quality_weight: f64,
    /// Candidate pool size fetched from each channel before fusion.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    /// BM25 term-frequency saturation.
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,
    /// BM25 length normalization.
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            recency_weight: default_recency_weight(),
            quality_weight: default_quality_weight(),
            candidate_k: default_candidate_k(),
            final_limit: default_final_limit(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
        }
    }
}

fn default_semantic_weight() -> f64 {
    0.6
}
fn default_recency_weight() -> f64 {
    0.2
}
fn default_quality_weight() -> f64 {
    0.2
}
fn default_candidate_k() -> usize {
    80
}
fn default_final_limit() -> usize {
    12
}
fn default_bm25_k1() -> f64 {
    1.5
}
fn default_bm25_b() -> f64 {
    0.75
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashed".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_embedding_provider() -> String {
    "hashed".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Backend selection: `"mock"` or `"openai"`. Resolved once at
    /// construction time by the generator factory, never per call.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_gen_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt; the loop runs `max_retries + 1`
    /// attempts at most.
    #[serde(default = "default_max_gen_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts, in seconds. Not applied after the
    /// final attempt.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Minimum 0–5 assessment score a draft must reach to be accepted.
    #[serde(default = "default_min_acceptable_score")]
    pub min_acceptable_score: f64,
    /// Maximum number of critical rubric violations an accepted draft may
    /// carry.
    #[serde(default)]
    pub allowed_critical: usize,
    /// Number of retrieved passages woven into each prompt.
    #[serde(default = "default_context_passages")]
    pub context_passages: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_output_tokens(),
            timeout_secs: default_gen_timeout_secs(),
            max_retries: default_max_gen_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            min_acceptable_score: default_min_acceptable_score(),
            allowed_critical: 0,
            context_passages: default_context_passages(),
        }
    }
}

fn default_generation_provider() -> String {
    "mock".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    4096
}
fn default_gen_timeout_secs() -> u64 {
    120
}
fn default_max_gen_retries() -> u32 {
    2
}
fn default_retry_delay_secs() -> u64 {
    2
}
fn default_min_acceptable_score() -> f64 {
    3.5
}
fn default_context_passages() -> usize {
    6
}

/// Extra rubric rules layered on top of the built-in style rubric.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RubricConfig {
    #[serde(default)]
    pub patterns: Vec<RubricPatternConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RubricPatternConfig {
    pub name: String,
    /// Regular expression matched case-insensitively against the draft.
    pub pattern: String,
    /// One of `critical`, `high`, `medium`, `low`.
    pub severity: String,
    #[serde(default)]
    pub fix: Option<String>,
}

impl EmbeddingConfig {
    pub fn is_remote(&self) -> bool {
        self.provider == "openai"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.semantic_weight) {
        anyhow::bail!("retrieval.semantic_weight must be in [0.0, 1.0]");
    }

    // recency/quality weights are deliberately not required to sum to 1;
    // any remainder falls to similarity. Each must still be a valid weight.
    for (name, w) in [
        ("retrieval.recency_weight", config.retrieval.recency_weight),
        ("retrieval.quality_weight", config.retrieval.quality_weight),
    ] {
        if !(0.0..=1.0).contains(&w) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }

    match config.embedding.provider.as_str() {
        "hashed" | "openai" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hashed, openai, or disabled.",
            other
        ),
    }

    if config.embedding.is_remote() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.generation.provider.as_str() {
        "mock" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be mock or openai.",
            other
        ),
    }

    if !(0.0..=5.0).contains(&config.generation.min_acceptable_score) {
        anyhow::bail!("generation.min_acceptable_score must be in [0.0, 5.0]");
    }

    Ok(())
}
