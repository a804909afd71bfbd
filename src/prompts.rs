//! Prompt variants and prompt assembly for the retry loop.
//!
//! Variant escalation is a fixed ordered table, indexed with wraparound
//! by attempt number — no branching logic, so the retry state machine is
//! exactly reproducible: attempt 1 uses `default`, attempt 2
//! `strict_no_slop`, attempt 3 `minimal`, attempt 4 wraps to `default`.

use crate::models::{QualityAssessment, SearchResult};

/// A named instruction template steering generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptVariant {
    pub name: &'static str,
    pub system_prompt: &'static str,
}

/// The escalation order. Later variants are progressively stricter.
pub const VARIANTS: &[PromptVariant] = &[
    PromptVariant {
        name: "default",
        system_prompt: "You are a writer drafting long-form content in the author's own voice. \
             Ground every claim in the provided source passages. Write naturally.",
    },
    PromptVariant {
        name: "strict_no_slop",
        system_prompt: "You are a writer drafting long-form content in the author's own voice. \
             Ground every claim in the provided source passages. Absolutely avoid \
             generic filler: no stock openers, no 'delve', no 'in conclusion', no \
             hedging phrases. Every sentence must carry specific information.",
    },
    PromptVariant {
        name: "minimal",
        system_prompt: "Write plain, spare prose in the author's voice using only the provided \
             source passages. Short declarative sentences. No transitions, no \
             summaries, no commentary about the writing itself.",
    },
];

/// Variant for a 1-based attempt number, wrapping past the table end.
pub fn variant_for_attempt(attempt: u32) -> PromptVariant {
    let index = (attempt.max(1) as usize - 1) % VARIANTS.len();
    VARIANTS[index]
}

/// Inputs describing the piece to generate.
#[derive(Debug, Clone)]
pub struct GenerationSpec {
    pub title: String,
    pub keywords: Vec<String>,
    pub thesis: String,
    /// Content classification (e.g. `"essay"`, `"case-study"`).
    pub classification: String,
    pub audience: String,
}

/// Build the outline prompt from the spec and retrieved passages.
pub fn outline_prompt(spec: &GenerationSpec, passages: &[SearchResult]) -> String {
    let mut prompt = format!(
        "Produce a markdown outline for a {} titled \"{}\" aimed at {}.\n\
         Thesis: {}\n",
        spec.classification, spec.title, spec.audience, spec.thesis
    );
    if !spec.keywords.is_empty() {
        prompt.push_str(&format!("Keywords to cover: {}\n", spec.keywords.join(", ")));
    }
    push_passages(&mut prompt, passages);
    prompt.push_str("\nReturn only the outline, one heading per line.");
    prompt
}

/// Build the draft prompt from the spec, the outline, retrieved passages,
/// and — on retries — the previous attempt's recommended fixes.
pub fn draft_prompt(
    spec: &GenerationSpec,
    outline: &str,
    passages: &[SearchResult],
    previous: Option<&QualityAssessment>,
) -> String {
    let mut prompt = format!(
        "Write the full {} titled \"{}\" for {}, following this outline:\n\n{}\n",
        spec.classification, spec.title, spec.audience, outline
    );
    push_passages(&mut prompt, passages);

    if let Some(assessment) = previous {
        if !assessment.recommendations.is_empty() {
            prompt.push_str("\nThe previous draft was rejected. Apply these fixes:\n");
            for fix in &assessment.recommendations {
                prompt.push_str(&format!("- {fix}\n"));
            }
        }
    }

    prompt
}

fn push_passages(prompt: &mut String, passages: &[SearchResult]) {
    if passages.is_empty() {
        return;
    }
    prompt.push_str("\nSource passages from the author's corpus:\n");
    for (i, passage) in passages.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[{}] ({})\n{}\n",
            i + 1,
            passage.metadata.source,
            passage.content
        ));
    }
}
