use locus_core::Severity;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FORBIDDEN_TERMS: &[&str] = &["赌博", "成人", "诈骗", "仇恨"];

/// Business thresholds applied by the evaluator. The same policy value must
/// be shared by every call site that compares scores against `min_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityPolicy {
    pub min_score: u32,
    pub forbidden_terms: Vec<String>,
    pub min_source_links: usize,
    pub require_reachable_source_links: bool,
    pub max_duplicated_structure_count: u64,
    pub duplicated_structure_severity: Severity,
    pub max_repeated_bigram_excess: usize,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            min_score: 70,
            forbidden_terms: DEFAULT_FORBIDDEN_TERMS.iter().map(|t| t.to_string()).collect(),
            min_source_links: 2,
            require_reachable_source_links: false,
            max_duplicated_structure_count: 3,
            duplicated_structure_severity: Severity::Soft,
            max_repeated_bigram_excess: 6,
        }
    }
}

impl QualityPolicy {
    pub fn with_min_score(mut self, min_score: u32) -> Self {
        self.min_score = min_score.min(100);
        self
    }

    pub fn with_forbidden_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_terms = terms.into_iter().map(Into::into).collect();
        self
    }

    /// Forbidden terms found in `text`, case-insensitively, in policy order.
    pub fn forbidden_matches(&self, text: &str) -> Vec<&str> {
        let lowered = text.to_lowercase();
        let mut seen: Vec<String> = Vec::new();
        let mut hits: Vec<&str> = Vec::new();
        for term in &self.forbidden_terms {
            let term = term.trim();
            let needle = term.to_lowercase();
            if term.is_empty() || seen.contains(&needle) {
                continue;
            }
            if lowered.contains(&needle) {
                hits.push(term);
            }
            seen.push(needle);
        }
        hits
    }
}
