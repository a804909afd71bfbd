//! Bounded retry loop gating generation on quality.
//!
//! The orchestrator runs `Attempting(1) .. Attempting(max_retries + 1)`
//! until a draft clears the acceptance gate (`Accepted`) or the budget
//! runs out (`Exhausted`). Each attempt: pick the prompt variant for the
//! attempt number, retrieve context, generate an outline then a draft,
//! assess. Quality shortfall is never an error — an exhausted run still
//! returns a complete [`GenerationResult`] with every attempt's scores so
//! the caller can accept a best-effort draft or abort.
//!
//! Connectivity is different: a failed generation call carries no draft
//! to assess, so it is surfaced as a typed [`GenerationError`] instead of
//! being counted against the retry budget.
//!
//! The loop is sequential per request; independent requests may run their
//! own orchestrators in parallel over shared `Arc`'d services.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::assess::QualityAssessor;
use crate::error::GenerationError;
use crate::generate::{GenerationRequest, Generator};
use crate::models::{GenerationAttempt, GenerationResult, SearchResult};
use crate::prompts::{self, GenerationSpec};
use crate::scoring::Weighting;
use crate::searcher::CorpusSearcher;

pub struct RetryOrchestrator {
    generator: Arc<dyn Generator>,
    assessor: QualityAssessor,
    searcher: Arc<CorpusSearcher>,
    max_retries: u32,
    retry_delay: Duration,
    temperature: f64,
    max_tokens: u32,
    context_passages: usize,
    cancelled: Arc<AtomicBool>,
}

impl RetryOrchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        assessor: QualityAssessor,
        searcher: Arc<CorpusSearcher>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            generator,
            assessor,
            searcher,
            max_retries,
            retry_delay,
            temperature: 0.7,
            max_tokens: 4096,
            context_passages: 6,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_context_passages(mut self, n: usize) -> Self {
        self.context_passages = n;
        self
    }

    /// Handle for cooperative cancellation. Checked before each attempt
    /// begins, not mid-attempt: an in-flight generation call is not
    /// interruptible here.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Run the retry loop to completion.
    ///
    /// Returns `Err` only when the generation service itself fails; a
    /// draft that never clears the gate is a normal result with
    /// `success == false`.
    pub async fn generate_with_retry(
        &self,
        spec: &GenerationSpec,
    ) -> Result<GenerationResult, GenerationError> {
        let passages = retrieve_context(&self.searcher, spec, self.context_passages).await?;

        let max_attempts = self.max_retries + 1;
        let mut attempts: Vec<GenerationAttempt> = Vec::new();

        for attempt_no in 1..=max_attempts {
            if self.cancelled.load(Ordering::SeqCst) {
                info!(completed = attempts.len(), "generation cancelled");
                break;
            }

            // Fixed inter-attempt delay; never before the first attempt.
            if attempt_no > 1 && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }

            let variant = prompts::variant_for_attempt(attempt_no);
            debug!(attempt = attempt_no, variant = variant.name, "starting attempt");

            let previous = attempts.last().map(|a: &GenerationAttempt| &a.assessment);

            let outline = self
                .call_generator(variant.system_prompt, prompts::outline_prompt(spec, &passages))
                .await?;
            let draft = self
                .call_generator(
                    variant.system_prompt,
                    prompts::draft_prompt(spec, &outline, &passages, previous),
                )
                .await?;

            let assessment = self.assessor.assess(&outline, &draft);
            let accepted = self.assessor.accepts(&assessment);
            info!(
                attempt = attempt_no,
                variant = variant.name,
                score = assessment.score,
                critical = assessment.violations.critical,
                accepted,
                "attempt assessed"
            );

            attempts.push(GenerationAttempt {
                attempt: attempt_no,
                variant: variant.name.to_string(),
                outline,
                draft,
                assessment,
            });

            if accepted {
                return Ok(finish(attempts, true));
            }
        }

        Ok(finish(attempts, false))
    }

    async fn call_generator(
        &self,
        system_prompt: &str,
        prompt: String,
    ) -> Result<String, GenerationError> {
        let response = self
            .generator
            .generate(GenerationRequest {
                prompt,
                system_prompt: system_prompt.to_string(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            })
            .await?;
        Ok(response.content)
    }
}

fn finish(attempts: Vec<GenerationAttempt>, success: bool) -> GenerationResult {
    GenerationResult {
        success,
        total_attempts: attempts.len() as u32,
        attempts,
    }
}

/// Retrieval query assembled from the piece's title, keywords, and thesis.
fn retrieval_query(spec: &GenerationSpec) -> String {
    let mut parts = vec![spec.title.clone()];
    parts.extend(spec.keywords.iter().cloned());
    if !spec.thesis.is_empty() {
        parts.push(spec.thesis.clone());
    }
    parts.join(" ")
}

/// Retrieve the corpus passages woven into the generation prompts.
/// Public so callers can show the context alongside the result.
pub async fn retrieve_context(
    searcher: &CorpusSearcher,
    spec: &GenerationSpec,
    n: usize,
) -> Result<Vec<SearchResult>, GenerationError> {
    Ok(searcher
        .search(
            &retrieval_query(spec),
            n,
            None,
            Weighting::Hybrid {
                semantic: 0.6,
                lexical: 0.4,
            },
        )
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assess::QualityAssessor;
    use crate::config::RubricConfig;
    use crate::error::RetrievalError;
    use crate::generate::MockGenerator;
    use crate::lexical::LexicalIndex;
    use crate::models::SearchFilters;
    use crate::semantic::{HashedEmbedder, InMemorySemanticIndex, Neighbor, SemanticIndex};
    use async_trait::async_trait;

    fn empty_searcher() -> Arc<CorpusSearcher> {
        Arc::new(CorpusSearcher::new(
            Arc::new(InMemorySemanticIndex::new()),
            Arc::new(HashedEmbedder::new(64)),
            Arc::new(LexicalIndex::default()),
        ))
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

    fn unreachable_searcher() -> Arc<CorpusSearcher> {
        Arc::new(CorpusSearcher::new(
            Arc::new(UnreachableIndex),
            Arc::new(HashedEmbedder::new(64)),
            Arc::new(LexicalIndex::default()),
        ))
    }

    fn spec() -> GenerationSpec {
        GenerationSpec {
            title: "On Focus".to_string(),
            keywords: vec!["attention".to_string()],
            thesis: "Deep work beats busyness".to_string(),
            classification: "essay".to_string(),
            audience: "engineers".to_string(),
        }
    }

    fn strict_assessor() -> QualityAssessor {
        // min_acceptable_score of 5.0 plus a draft that always violates
        // means every attempt is rejected.
        QualityAssessor::new(&RubricConfig::default(), 5.0, 0)
    }

    fn lenient_assessor() -> QualityAssessor {
        QualityAssessor::new(&RubricConfig::default(), 0.0, usize::MAX)
    }

    fn orchestrator(
        generator: Arc<dyn Generator>,
        assessor: QualityAssessor,
        max_retries: u32,
    ) -> RetryOrchestrator {
        RetryOrchestrator::new(
            generator,
            assessor,
            empty_searcher(),
            max_retries,
            Duration::ZERO,
        )
    }

    /// A generator whose drafts always trip the rubric.
    fn sloppy_generator() -> Arc<MockGenerator> {
        Arc::new(MockGenerator::scripted(vec![Ok(
            "As an AI, in conclusion, this delves into things.".to_string(),
        )]))
    }

    #[tokio::test]
    async fn never_accepting_assessor_exhausts_budget() {
        let orchestrator = orchestrator(sloppy_generator(), strict_assessor(), 2);
        let result = orchestrator.generate_with_retry(&spec()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.total_attempts, 3);
        assert_eq!(result.attempts.len(), 3);
        assert!(result.final_assessment().unwrap().retry_suggested);
    }

    #[tokio::test]
    async fn variant_sequence_escalates() {
        let orchestrator = orchestrator(sloppy_generator(), strict_assessor(), 2);
        let result = orchestrator.generate_with_retry(&spec()).await.unwrap();
        let variants: Vec<&str> = result.attempts.iter().map(|a| a.variant.as_str()).collect();
        assert_eq!(variants, vec!["default", "strict_no_slop", "minimal"]);
    }

    #[tokio::test]
    async fn accepting_on_first_attempt_stops_early() {
        let generator = Arc::new(MockGenerator::echo());
        let orchestrator = orchestrator(generator, lenient_assessor(), 5);
        let result = orchestrator.generate_with_retry(&spec()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.total_attempts, 1);
        assert_eq!(result.attempts[0].attempt, 1);
        assert_eq!(result.attempts[0].variant, "default");
    }

    #[tokio::test]
    async fn attempt_numbers_are_one_based_and_ordered() {
        let orchestrator = orchestrator(sloppy_generator(), strict_assessor(), 3);
        let result = orchestrator.generate_with_retry(&spec()).await.unwrap();
        let numbers: Vec<u32> = result.attempts.iter().map(|a| a.attempt).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn service_failure_surfaces_as_error_not_quality_failure() {
        let generator = Arc::new(MockGenerator::scripted(vec![Err("down".to_string())]));
        let orchestrator = orchestrator(generator, lenient_assessor(), 2);
        let err = orchestrator.generate_with_retry(&spec()).await.unwrap_err();
        assert!(matches!(err, GenerationError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_corpus_surfaces_retrieval_error() {
        // Context retrieval fails before any attempt runs; the run ends
        // with a typed retrieval error, not an exhausted quality result.
        let orchestrator = RetryOrchestrator::new(
            Arc::new(MockGenerator::echo()),
            lenient_assessor(),
            unreachable_searcher(),
            2,
            Duration::ZERO,
        );
        let err = orchestrator.generate_with_retry(&spec()).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Retrieval(RetrievalError::IndexUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn mid_run_service_failure_surfaces_too() {
        // Outline of attempt 1 succeeds, draft call fails.
        let generator = Arc::new(MockGenerator::scripted(vec![
            Ok("# Outline".to_string()),
            Err("connection reset".to_string()),
        ]));
        let orchestrator = orchestrator(generator, lenient_assessor(), 2);
        assert!(orchestrator.generate_with_retry(&spec()).await.is_err());
    }

    #[tokio::test]
    async fn cancelled_before_start_yields_empty_history() {
        let orchestrator = orchestrator(sloppy_generator(), strict_assessor(), 2);
        orchestrator.cancel_handle().store(true, Ordering::SeqCst);
        let result = orchestrator.generate_with_retry(&spec()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.total_attempts, 0);
        assert!(result.attempts.is_empty());
    }

    #[tokio::test]
    async fn retry_prompt_carries_previous_recommendations() {
        // Every draft trips the model-self-reference rule, so attempt 2's
        // draft prompt must carry attempt 1's recommended fixes. Prompt
        // order: outline 1, draft 1, outline 2, draft 2.
        let generator = Arc::new(MockGenerator::scripted(vec![Ok(
            "As an AI, I delve into everything.".to_string(),
        )]));
        let orchestrator = orchestrator(generator.clone(), strict_assessor(), 1);
        let result = orchestrator.generate_with_retry(&spec()).await.unwrap();
        assert_eq!(result.total_attempts, 2);

        let prompts = generator.received_prompts();
        assert_eq!(prompts.len(), 4);
        assert!(!prompts[1].contains("The previous draft was rejected"));
        assert!(prompts[3].contains("The previous draft was rejected"));
        assert!(prompts[3].contains("remove model self-reference entirely"));
    }
}
