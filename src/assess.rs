//! Rubric-based quality assessment of generated drafts.
//!
//! The assessor is a pure function of (outline, draft) plus rubric
//! configuration: the same input always produces the same
//! [`QualityAssessment`], so retry attempts are comparable. It never
//! performs I/O.
//!
//! Scoring: a draft starts from a baseline voice/coherence estimate and
//! loses a fixed penalty per rubric violation, weighted by severity.
//! Formulaic-writing patterns ship built in; user-supplied patterns are
//! layered on top, and a malformed pattern is logged and skipped rather
//! than aborting the assessment.

use regex::RegexBuilder;
use tracing::warn;

use crate::config::RubricConfig;
use crate::models::{QualityAssessment, QualityLevel, ViolationCounts};

/// Severity bucket for a rubric rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Score penalty per violation on the 0–5 scale.
    fn penalty(&self) -> f64 {
        match self {
            Self::Critical => 1.0,
            Self::High => 0.5,
            Self::Medium => 0.25,
            Self::Low => 0.1,
        }
    }
}

/// A compiled rubric rule.
struct Rule {
    name: String,
    pattern: regex::Regex,
    severity: Severity,
    fix: String,
}

/// Baseline voice/coherence estimate a clean draft starts from.
const BASELINE_SCORE: f64 = 5.0;

/// Penalty applied per outline section the draft fails to cover.
const COVERAGE_PENALTY: f64 = 0.25;

pub struct QualityAssessor {
    rules: Vec<Rule>,
    min_acceptable_score: f64,
    allowed_critical: usize,
}

impl QualityAssessor {
    /// Build an assessor with the built-in style rubric plus any custom
    /// patterns from config.
    pub fn new(rubric: &RubricConfig, min_acceptable_score: f64, allowed_critical: usize) -> Self {
        let mut rules = builtin_rules();

        for custom in &rubric.patterns {
            let severity = match Severity::parse(&custom.severity) {
                Some(s) => s,
                None => {
                    warn!(
                        rule = %custom.name,
                        severity = %custom.severity,
                        "skipping rubric rule with unknown severity"
                    );
                    continue;
                }
            };
            match RegexBuilder::new(&custom.pattern)
                .case_insensitive(true)
                .build()
            {
                Ok(pattern) => rules.push(Rule {
                    name: custom.name.clone(),
                    pattern,
                    severity,
                    fix: custom
                        .fix
                        .clone()
                        .unwrap_or_else(|| format!("rephrase to avoid \"{}\"", custom.name)),
                }),
                Err(e) => {
                    // Partial assessment beats none: skip the bad rule.
                    warn!(rule = %custom.name, error = %e, "skipping malformed rubric pattern");
                }
            }
        }

        Self {
            rules,
            min_acceptable_score,
            allowed_critical,
        }
    }

    pub fn min_acceptable_score(&self) -> f64 {
        self.min_acceptable_score
    }

    pub fn allowed_critical(&self) -> usize {
        self.allowed_critical
    }

    /// Assess one generated draft against the rubric.
    pub fn assess(&self, outline: &str, draft: &str) -> QualityAssessment {
        let mut violations = ViolationCounts::default();
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut penalty = 0.0;

        for rule in &self.rules {
            let count = rule.pattern.find_iter(draft).count();
            if count == 0 {
                continue;
            }
            match rule.severity {
                Severity::Critical => violations.critical += count,
                Severity::High => violations.high += count,
                Severity::Medium => violations.medium += count,
                Severity::Low => violations.low += count,
            }
            penalty += rule.severity.penalty() * count as f64;
            issues.push(format!("{} ({}x)", rule.name, count));
            recommendations.push(rule.fix.clone());
        }

        let uncovered = uncovered_sections(outline, draft);
        for section in &uncovered {
            penalty += COVERAGE_PENALTY;
            issues.push(format!("outline section not covered: {section}"));
            recommendations.push(format!("expand the draft to address \"{section}\""));
        }

        let score = (BASELINE_SCORE - penalty).clamp(0.0, 5.0);
        let retry_suggested =
            score < self.min_acceptable_score || violations.critical > self.allowed_critical;

        QualityAssessment {
            score,
            level: QualityLevel::from_score(score),
            violations,
            issues,
            recommendations,
            retry_suggested,
        }
    }

    /// Whether an assessment clears the acceptance gate.
    pub fn accepts(&self, assessment: &QualityAssessment) -> bool {
        assessment.score >= self.min_acceptable_score
            && assessment.violations.critical <= self.allowed_critical
    }
}

/// Outline sections (markdown headings or numbered items) whose key terms
/// never appear in the draft.
fn uncovered_sections(outline: &str, draft: &str) -> Vec<String> {
    let draft_lower = draft.to_lowercase();
    let mut missing = Vec::new();

    for line in outline.lines() {
        let trimmed = line.trim();
        let section = if let Some(rest) = trimmed.strip_prefix('#') {
            rest.trim_start_matches('#').trim()
        } else if let Some(rest) = trimmed.strip_prefix("- ") {
            rest.trim()
        } else if trimmed
            .split_once('.')
            .map(|(n, _)| n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty())
            .unwrap_or(false)
        {
            trimmed.split_once('.').map(|(_, rest)| rest.trim()).unwrap_or("")
        } else {
            continue;
        };

        if section.is_empty() {
            continue;
        }

        // Covered if any significant word of the heading shows up.
        let covered = section
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.len() > 3)
            .any(|w| draft_lower.contains(w));
        if !covered {
            missing.push(section.to_string());
        }
    }

    missing
}

/// The built-in formulaic-writing rubric.
///
/// Patterns target generic filler and stock AI phrasing; severities
/// reflect how reliably each one marks low-quality output.
fn builtin_rules() -> Vec<Rule> {
    let specs: &[(&str, &str, Severity, &str)] = &[
        (
            "self-referential AI disclosure",
            r"\bas an ai\b|\bas a language model\b",
            Severity::Critical,
            "remove model self-reference entirely",
        ),
        (
            "templated opener",
            r"in today's (fast-paced|ever-changing|digital) world",
            Severity::Critical,
            "open with a concrete observation instead of a stock scene-setter",
        ),
        (
            "delve cliche",
            r"\bdelve(s|d)? into\b",
            Severity::High,
            "name the actual action: examine, unpack, trace",
        ),
        (
            "landscape/tapestry metaphor",
            r"\b(ever-evolving|rich) (landscape|tapestry)\b",
            Severity::High,
            "cut the metaphor; describe the subject directly",
        ),
        (
            "throat-clearing hedge",
            r"it('s| is) (important|worth) (to note|noting) that",
            Severity::Medium,
            "state the point without announcing it",
        ),
        (
            "formulaic closer",
            r"\bin conclusion\b|\bto sum up\b",
            Severity::Medium,
            "end on the argument, not a summary marker",
        ),
        (
            "connective overuse",
            r"\b(furthermore|moreover|additionally),",
            Severity::Low,
            "vary transitions or drop them",
        ),
        (
            "intensifier padding",
            r"\b(very|truly|really) (unique|important|significant)\b",
            Severity::Low,
            "cut the intensifier",
        ),
    ];

    specs
        .iter()
        .map(|(name, pattern, severity, fix)| Rule {
            name: name.to_string(),
            pattern: RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("built-in rubric pattern must compile"),
            severity: *severity,
            fix: fix.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RubricPatternConfig;

    fn assessor() -> QualityAssessor {
        QualityAssessor::new(&RubricConfig::default(), 3.5, 0)
    }

    #[test]
    fn clean_draft_scores_baseline() {
        let a = assessor();
        let assessment = a.assess("", "A plain paragraph about a walk in the park.");
        assert_eq!(assessment.score, 5.0);
        assert_eq!(assessment.level, QualityLevel::Excellent);
        assert_eq!(assessment.violations.total(), 0);
        assert!(!assessment.retry_suggested);
        assert!(a.accepts(&assessment));
    }

    #[test]
    fn critical_violation_forces_retry() {
        let a = assessor();
        let assessment = a.assess("", "As an AI, I think gardens are nice.");
        assert_eq!(assessment.violations.critical, 1);
        assert!(assessment.retry_suggested);
        assert!(!a.accepts(&assessment));
    }

    #[test]
    fn severities_bucket_separately() {
        let a = assessor();
        let draft = "Let us delve into the topic. It is important to note that \
                     furthermore, things happen. This is very unique.";
        let assessment = a.assess("", draft);
        assert_eq!(assessment.violations.critical, 0);
        assert_eq!(assessment.violations.high, 1);
        assert_eq!(assessment.violations.medium, 1);
        assert_eq!(assessment.violations.low, 2);
        assert_eq!(assessment.issues.len(), assessment.recommendations.len());
    }

    #[test]
    fn retry_suggested_iff_below_threshold_or_critical() {
        let a = QualityAssessor::new(&RubricConfig::default(), 4.9, 0);
        // Two low violations: 5.0 - 0.2 = 4.8 < 4.9.
        let assessment = a.assess("", "Furthermore, this is very unique.");
        assert_eq!(assessment.violations.critical, 0);
        assert!(assessment.score < 4.9);
        assert!(assessment.retry_suggested);

        let lenient = QualityAssessor::new(&RubricConfig::default(), 2.0, 0);
        let relaxed = lenient.assess("", "Furthermore, this is very unique.");
        assert!(!relaxed.retry_suggested);
    }

    #[test]
    fn uncovered_outline_sections_penalize() {
        let a = assessor();
        let outline = "# Introduction\n# Kubernetes migration\n# Closing thoughts";
        let draft = "We begin with an introduction and end with closing thoughts.";
        let assessment = a.assess(outline, draft);
        assert!(assessment
            .issues
            .iter()
            .any(|i| i.contains("Kubernetes migration")));
        assert!(assessment.score < 5.0);
    }

    #[test]
    fn assessment_is_deterministic() {
        let a = assessor();
        let outline = "# One\n# Two";
        let draft = "Let us delve into one and two. In conclusion, done.";
        let x = a.assess(outline, draft);
        let y = a.assess(outline, draft);
        assert_eq!(x.score, y.score);
        assert_eq!(x.violations, y.violations);
        assert_eq!(x.issues, y.issues);
    }

    #[test]
    fn malformed_custom_pattern_is_skipped() {
        let rubric = RubricConfig {
            patterns: vec![
                RubricPatternConfig {
                    name: "broken".to_string(),
                    pattern: "([unclosed".to_string(),
                    severity: "high".to_string(),
                    fix: None,
                },
                RubricPatternConfig {
                    name: "buzzword".to_string(),
                    pattern: r"\bsynergy\b".to_string(),
                    severity: "medium".to_string(),
                    fix: Some("use a concrete noun".to_string()),
                },
            ],
        };
        let a = QualityAssessor::new(&rubric, 3.5, 0);
        let assessment = a.assess("", "We will achieve synergy together.");
        assert_eq!(assessment.violations.medium, 1);
        assert!(assessment.issues.iter().any(|i| i.contains("buzzword")));
    }

    #[test]
    fn unknown_severity_is_skipped() {
        let rubric = RubricConfig {
            patterns: vec![RubricPatternConfig {
                name: "odd".to_string(),
                pattern: "x".to_string(),
                severity: "catastrophic".to_string(),
                fix: None,
            }],
        };
        let a = QualityAssessor::new(&rubric, 3.5, 0);
        let assessment = a.assess("", "xxxxx");
        assert!(assessment.issues.iter().all(|i| !i.contains("odd")));
    }
}
