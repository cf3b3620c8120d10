use locus_core::{
    ArticleDraft, DimensionScore, DimensionScores, QualityMetrics, QualityReport, RuleFailure, Severity,
};

use crate::policy::QualityPolicy;
use crate::text;

pub const DIMENSION_MAX: u32 = 25;
pub const MIN_CONTENT_CHARS: usize = 800;
pub const DESCRIPTION_CHARS: (usize, usize) = (80, 180);
pub const TAG_COUNT: (usize, usize) = (3, 8);
pub const MIN_HEADINGS: usize = 4;
pub const MIN_FIELD_CHARS: usize = 10;
pub const MAX_REPEATED_LINES: usize = 1;
pub const MIN_FAQ_QUESTIONS: usize = 2;

/// Rule code raised when too many published articles share a signature.
pub const DUPLICATED_STRUCTURE: &str = "duplicated-structure";

/// Facts measured outside the evaluator for one draft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationContext {
    pub reachable_source_links: usize,
    /// Published articles sharing the draft's structure signature, `None`
    /// when the signature is empty.
    pub duplicated_structure_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Structure,
    Specificity,
    AntiRepetition,
    Safety,
}

struct Scorecard {
    dimensions: DimensionScores,
    failures: Vec<RuleFailure>,
}

impl Scorecard {
    fn new() -> Self {
        Self {
            dimensions: DimensionScores {
                structure: DimensionScore::new(DIMENSION_MAX),
                specificity: DimensionScore::new(DIMENSION_MAX),
                anti_repetition: DimensionScore::new(DIMENSION_MAX),
                safety: DimensionScore::new(DIMENSION_MAX),
            },
            failures: Vec::new(),
        }
    }

    fn dimension(&mut self, dimension: Dimension) -> &mut DimensionScore {
        match dimension {
            Dimension::Structure => &mut self.dimensions.structure,
            Dimension::Specificity => &mut self.dimensions.specificity,
            Dimension::AntiRepetition => &mut self.dimensions.anti_repetition,
            Dimension::Safety => &mut self.dimensions.safety,
        }
    }

    fn fail(&mut self, rule: &str, message: impl Into<String>, weight: u32, severity: Severity) {
        self.failures.push(RuleFailure {
            rule: rule.to_string(),
            message: message.into(),
            weight,
            severity,
        });
    }

    /// Awards `weight` when `ok`, records a failure otherwise.
    fn rule(&mut self, dimension: Dimension, ok: bool, rule: &str, message: &str, weight: u32, severity: Severity) {
        if ok {
            self.dimension(dimension).score += weight;
        } else {
            self.fail(rule, message, weight, severity);
        }
    }

    /// Deducts `weight` when `violated`, saturating at zero.
    fn penalty(&mut self, dimension: Dimension, violated: bool, rule: &str, message: String, weight: u32, severity: Severity) {
        if violated {
            let dim = self.dimension(dimension);
            dim.score = dim.score.saturating_sub(weight);
            self.fail(rule, message, weight, severity);
        }
    }

    fn cap(&mut self) {
        for dim in [
            &mut self.dimensions.structure,
            &mut self.dimensions.specificity,
            &mut self.dimensions.anti_repetition,
            &mut self.dimensions.safety,
        ] {
            dim.score = dim.score.min(dim.max);
        }
    }
}

/// Deterministic multi-dimension scorer for article drafts.
#[derive(Debug, Clone, Default)]
pub struct QualityEvaluator {
    policy: QualityPolicy,
}

impl QualityEvaluator {
    pub fn new(policy: QualityPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &QualityPolicy {
        &self.policy
    }

    pub fn evaluate(&self, draft: &ArticleDraft, context: &EvaluationContext) -> QualityReport {
        use Dimension::*;
        use Severity::{Hard, Soft};

        let policy = &self.policy;
        let mut card = Scorecard::new();

        let content_chars = text::char_count(&draft.content);
        let description_chars = text::char_count(&draft.description);
        let tags_count = draft.tags.len();
        let heading_count = text::heading_count(&draft.content);
        let faq_questions = text::faq_question_count(&draft.content);
        let repeated_line_count = text::repeated_line_count(&draft.content);
        let repeated_bigram_count = text::repeated_bigram_excess(&draft.content);
        let source_links_count = draft.source_links.len();

        card.rule(Structure, !draft.title.trim().is_empty(), "title-required", "title is required", 4, Hard);
        card.rule(Structure, description_chars > 0, "description-required", "description is required", 3, Hard);
        card.rule(Structure, content_chars > 0, "content-required", "content is required", 3, Hard);
        card.rule(
            Structure,
            content_chars >= MIN_CONTENT_CHARS,
            "content-min-length",
            "content must be at least 800 characters",
            5,
            Hard,
        );
        card.rule(
            Structure,
            (DESCRIPTION_CHARS.0..=DESCRIPTION_CHARS.1).contains(&description_chars),
            "description-range",
            "description must be between 80 and 180 characters",
            3,
            Soft,
        );
        card.rule(
            Structure,
            (TAG_COUNT.0..=TAG_COUNT.1).contains(&tags_count),
            "tags-range",
            "tags must be between 3 and 8 items",
            3,
            Soft,
        );
        card.rule(
            Structure,
            heading_count >= MIN_HEADINGS,
            "heading-count",
            "content should contain at least 4 H2/H3 headings",
            4,
            Soft,
        );

        card.rule(
            Specificity,
            text::char_count(&draft.audience) >= MIN_FIELD_CHARS,
            "audience-specificity",
            "audience field is too generic",
            5,
            Soft,
        );
        card.rule(
            Specificity,
            text::char_count(&draft.intent) >= MIN_FIELD_CHARS,
            "intent-specificity",
            "intent field is too generic",
            5,
            Soft,
        );
        card.rule(
            Specificity,
            text::unique_count(&draft.key_takeaways) >= 3,
            "key-takeaways-quality",
            "keyTakeaways must have at least 3 unique entries",
            5,
            Soft,
        );
        card.rule(
            Specificity,
            text::unique_count(&draft.decision_checklist) >= 4,
            "decision-checklist-quality",
            "decisionChecklist must include at least 4 actionable unique items",
            5,
            Soft,
        );
        card.rule(
            Specificity,
            text::unique_count(&draft.common_mistakes) >= 3,
            "common-mistakes-quality",
            "commonMistakes must include at least 3 distinct mistakes",
            5,
            Soft,
        );

        card.rule(
            AntiRepetition,
            repeated_line_count <= MAX_REPEATED_LINES,
            "repeated-lines",
            "content contains repeated long lines",
            10,
            Soft,
        );
        card.rule(
            AntiRepetition,
            repeated_bigram_count <= policy.max_repeated_bigram_excess,
            "repeated-bigrams",
            "content has excessive repeated bigrams",
            8,
            Soft,
        );
        card.rule(
            AntiRepetition,
            faq_questions >= MIN_FAQ_QUESTIONS,
            "faq-presence",
            "FAQ section should contain at least 2 explicit questions",
            4,
            Soft,
        );
        card.rule(
            AntiRepetition,
            text::unique_count(&draft.evidence_notes) >= 2,
            "evidence-notes",
            "evidenceNotes should contain at least 2 useful notes",
            3,
            Soft,
        );

        let forbidden = policy.forbidden_matches(&format!("{}\n{}", draft.content, draft.description));
        for term in &forbidden {
            card.fail("forbidden-term", format!("forbidden term detected: {}", term), DIMENSION_MAX, Hard);
        }
        if forbidden.is_empty() {
            card.dimension(Safety).score += DIMENSION_MAX;
        }

        card.cap();

        let counted_links = if policy.require_reachable_source_links {
            context.reachable_source_links
        } else {
            source_links_count
        };
        card.penalty(
            Structure,
            counted_links < policy.min_source_links,
            "source-links-minimum",
            format!("content should cite at least {} source links", policy.min_source_links),
            3,
            Soft,
        );
        card.penalty(
            AntiRepetition,
            context
                .duplicated_structure_count
                .map_or(false, |count| count > policy.max_duplicated_structure_count),
            DUPLICATED_STRUCTURE,
            format!(
                "heading structure already used by more than {} published articles",
                policy.max_duplicated_structure_count
            ),
            4,
            policy.duplicated_structure_severity,
        );

        let hard_failure_count = card.failures.iter().filter(|f| f.severity == Hard).count();
        let soft_failure_count = card.failures.len() - hard_failure_count;
        let score_total = card.dimensions.total();

        QualityReport {
            passed: hard_failure_count == 0 && score_total >= policy.min_score,
            score_total,
            score_max: card.dimensions.max_total(),
            min_score: policy.min_score,
            hard_failure_count,
            soft_failure_count,
            failure_codes: card.failures.iter().map(|f| f.rule.clone()).collect(),
            failures: card.failures,
            dimensions: card.dimensions,
            metrics: QualityMetrics {
                content_chars,
                description_chars,
                tags_count,
                heading_count,
                checklist_items: draft.decision_checklist.len(),
                faq_questions,
                repeated_line_count,
                repeated_bigram_count,
                source_links_count,
                reachable_source_links_count: context.reachable_source_links,
                duplicated_structure_count: context.duplicated_structure_count,
            },
        }
    }
}
