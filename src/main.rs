//! # Draftsmith CLI (`draft`)
//!
//! ```bash
//! draft --config ./config/draft.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `draft search "<query>"` | Rank corpus chunks against a query |
//! | `draft generate --title ...` | Generate a draft through the quality gate |
//! | `draft assess <draft-file>` | Score an existing draft against the rubric |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use draftsmith::assess::QualityAssessor;
use draftsmith::config::{load_config, Config};
use draftsmith::corpus;
use draftsmith::generate::create_generator;
use draftsmith::index::index_corpus;
use draftsmith::models::{QualityRating, SearchFilters};
use draftsmith::orchestrator::RetryOrchestrator;
use draftsmith::prompts::GenerationSpec;
use draftsmith::scoring::Weighting;
use draftsmith::searcher::CorpusSearcher;
use draftsmith::semantic::EmbedderCache;

/// Draftsmith — corpus-grounded drafting with a quality gate.
#[derive(Parser)]
#[command(
    name = "draft",
    about = "Corpus-grounded drafting: hybrid retrieval plus quality-gated generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/draft.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the corpus and print ranked chunks.
    Search {
        query: String,
        /// Ranking mode: semantic, hybrid, recency, quality, combined.
        #[arg(long, default_value = "hybrid")]
        mode: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Restrict to chunks carrying any of these tags.
        #[arg(long)]
        tag: Vec<String>,
        /// Restrict to these quality ratings.
        #[arg(long)]
        quality: Vec<String>,
        /// Restrict to these document formats.
        #[arg(long)]
        format: Vec<String>,
    },
    /// Generate a draft through the retry quality gate.
    Generate {
        #[arg(long)]
        title: String,
        #[arg(long)]
        keyword: Vec<String>,
        #[arg(long, default_value = "")]
        thesis: String,
        #[arg(long, default_value = "essay")]
        classification: String,
        #[arg(long, default_value = "general readers")]
        audience: String,
    },
    /// Assess an existing draft file against the rubric.
    Assess {
        draft: PathBuf,
        /// Optional outline file checked for coverage.
        #[arg(long)]
        outline: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Search {
            query,
            mode,
            limit,
            tag,
            quality,
            format,
        } => run_search(&config, &query, &mode, limit, tag, quality, format).await,
        Commands::Generate {
            title,
            keyword,
            thesis,
            classification,
            audience,
        } => {
            run_generate(
                &config,
                GenerationSpec {
                    title,
                    keywords: keyword,
                    thesis,
                    classification,
                    audience,
                },
            )
            .await
        }
        Commands::Assess { draft, outline } => run_assess(&config, &draft, outline.as_deref()),
    }
}

/// Load the corpus, chunk it, and build both indexes.
async fn build_searcher(config: &Config) -> Result<Arc<CorpusSearcher>> {
    let documents = corpus::load_corpus(&config.corpus)?;

    let cache = EmbedderCache::new();
    let embedder = cache.get_or_load(&config.embedding)?;

    let index = index_corpus(
        &documents,
        embedder.as_ref(),
        &config.chunking,
        &config.retrieval,
        config.embedding.batch_size,
    )
    .await?;
    tracing::info!(
        documents = documents.len(),
        chunks = index.chunk_count,
        "corpus indexed"
    );

    Ok(Arc::new(
        CorpusSearcher::new(
            Arc::new(index.semantic),
            embedder,
            Arc::new(index.lexical),
        )
        .with_candidate_k(config.retrieval.candidate_k),
    ))
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    config: &Config,
    query: &str,
    mode: &str,
    limit: Option<usize>,
    tags: Vec<String>,
    qualities: Vec<String>,
    formats: Vec<String>,
) -> Result<()> {
    let weighting = match mode {
        "semantic" => Weighting::SimilarityOnly,
        "hybrid" => Weighting::Hybrid {
            semantic: config.retrieval.semantic_weight,
            lexical: 1.0 - config.retrieval.semantic_weight,
        },
        "recency" => Weighting::Recency {
            weight: config.retrieval.recency_weight,
        },
        "quality" => Weighting::Quality {
            weight: config.retrieval.quality_weight,
        },
        "combined" => Weighting::Combined {
            recency: config.retrieval.recency_weight,
            quality: config.retrieval.quality_weight,
        },
        other => anyhow::bail!(
            "Unknown search mode: {}. Use semantic, hybrid, recency, quality, or combined.",
            other
        ),
    };

    let mut parsed_qualities = Vec::new();
    for q in &qualities {
        match QualityRating::parse(q) {
            Some(rating) => parsed_qualities.push(rating),
            None => anyhow::bail!("Unknown quality rating: {}", q),
        }
    }

    let filters = SearchFilters {
        qualities: parsed_qualities,
        formats,
        tags,
    };
    let filters = (!filters.is_empty()).then_some(filters);

    let searcher = build_searcher(config).await?;
    let results = searcher
        .search(
            query,
            limit.unwrap_or(config.retrieval.final_limit),
            filters.as_ref(),
            weighting,
        )
        .await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (sim {:.2}, rec {:.2}, qual {:.2}, bm25 {:.2})",
            i + 1,
            result.score,
            result.metadata.source,
            result.similarity,
            result.recency_score,
            result.quality_score,
            result.bm25_score,
        );
        let excerpt: String = result.content.chars().take(160).collect();
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
        println!("    id: {}", result.chunk_id);
        println!();
    }

    Ok(())
}

async fn run_generate(config: &Config, spec: GenerationSpec) -> Result<()> {
    let searcher = build_searcher(config).await?;
    let generator = create_generator(&config.generation)?;
    let assessor = QualityAssessor::new(
        &config.rubric,
        config.generation.min_acceptable_score,
        config.generation.allowed_critical,
    );

    let orchestrator = RetryOrchestrator::new(
        generator,
        assessor,
        searcher,
        config.generation.max_retries,
        Duration::from_secs(config.generation.retry_delay_secs),
    )
    .with_sampling(config.generation.temperature, config.generation.max_tokens)
    .with_context_passages(config.generation.context_passages);

    let result = orchestrator.generate_with_retry(&spec).await?;

    for attempt in &result.attempts {
        println!(
            "attempt {} [{}]: score {:.2} ({}), {} violations",
            attempt.attempt,
            attempt.variant,
            attempt.assessment.score,
            attempt.assessment.level.as_str(),
            attempt.assessment.violations.total(),
        );
        for issue in &attempt.assessment.issues {
            println!("    issue: {}", issue);
        }
    }

    match result.final_attempt() {
        Some(attempt) if result.success => {
            println!("\naccepted after {} attempt(s)\n", result.total_attempts);
            println!("{}", attempt.draft);
        }
        Some(attempt) => {
            println!(
                "\nquality gate not met after {} attempt(s); best-effort draft follows\n",
                result.total_attempts
            );
            println!("{}", attempt.draft);
        }
        None => println!("no attempts completed"),
    }

    Ok(())
}

fn run_assess(config: &Config, draft_path: &Path, outline_path: Option<&Path>) -> Result<()> {
    let draft = std::fs::read_to_string(draft_path)
        .with_context(|| format!("Failed to read draft: {}", draft_path.display()))?;
    let outline = match outline_path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read outline: {}", path.display()))?,
        None => String::new(),
    };

    let assessor = QualityAssessor::new(
        &config.rubric,
        config.generation.min_acceptable_score,
        config.generation.allowed_critical,
    );
    let assessment = assessor.assess(&outline, &draft);

    println!(
        "score: {:.2} / 5.00 ({})",
        assessment.score,
        assessment.level.as_str()
    );
    println!(
        "violations: {} critical, {} high, {} medium, {} low",
        assessment.violations.critical,
        assessment.violations.high,
        assessment.violations.medium,
        assessment.violations.low,
    );
    for issue in &assessment.issues {
        println!("issue: {}", issue);
    }
    for fix in &assessment.recommendations {
        println!("fix: {}", fix);
    }
    println!(
        "retry suggested: {}",
        if assessment.retry_suggested { "yes" } else { "no" }
    );

    Ok(())
}
