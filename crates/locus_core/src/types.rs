use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One logical production request: an article about `topic` in `city`
/// targeting `keyword`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerRequest {
    pub topic: String,
    pub city: String,
    pub keyword: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl ProducerRequest {
    pub fn new(topic: impl Into<String>, city: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            city: city.into(),
            keyword: keyword.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn language_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(default)
    }

    /// Stable identity of the request across runs.
    pub fn source_key(&self) -> String {
        crate::hash::source_key(&self.city, &self.topic, &self.keyword)
    }
}

/// Outline returned by the first generator call of an attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
    pub title: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub headings: Vec<String>,
    #[serde(default)]
    pub decision_checklist: Vec<String>,
    #[serde(default)]
    pub faq_questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDraft {
    pub title: String,
    pub description: String,
    pub slug: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub key_takeaways: Vec<String>,
    #[serde(default)]
    pub decision_checklist: Vec<String>,
    #[serde(default)]
    pub common_mistakes: Vec<String>,
    #[serde(default)]
    pub evidence_notes: Vec<String>,
    pub content: String,
    #[serde(default)]
    pub source_links: Vec<String>,
    pub lastmod: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hard,
    Soft,
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hard" => Ok(Severity::Hard),
            "soft" => Ok(Severity::Soft),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub rule: String,
    pub message: String,
    pub weight: u32,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: u32,
    pub max: u32,
}

impl DimensionScore {
    pub fn new(max: u32) -> Self {
        Self { score: 0, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionScores {
    pub structure: DimensionScore,
    pub specificity: DimensionScore,
    pub anti_repetition: DimensionScore,
    pub safety: DimensionScore,
}

impl DimensionScores {
    pub fn total(&self) -> u32 {
        self.structure.score + self.specificity.score + self.anti_repetition.score + self.safety.score
    }

    pub fn max_total(&self) -> u32 {
        self.structure.max + self.specificity.max + self.anti_repetition.max + self.safety.max
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub content_chars: usize,
    pub description_chars: usize,
    pub tags_count: usize,
    pub heading_count: usize,
    pub checklist_items: usize,
    pub faq_questions: usize,
    pub repeated_line_count: usize,
    pub repeated_bigram_count: usize,
    pub source_links_count: usize,
    pub reachable_source_links_count: usize,
    /// `None` when the draft has no headings and the signature is unscored.
    pub duplicated_structure_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub passed: bool,
    pub score_total: u32,
    pub score_max: u32,
    /// Threshold `passed` was computed against.
    pub min_score: u32,
    pub hard_failure_count: usize,
    pub soft_failure_count: usize,
    pub failure_codes: Vec<String>,
    pub failures: Vec<RuleFailure>,
    pub dimensions: DimensionScores,
    pub metrics: QualityMetrics,
}

impl QualityReport {
    /// Below the threshold but free of hard failures.
    pub fn is_revisable(&self) -> bool {
        self.hard_failure_count == 0 && self.score_total < self.min_score
    }

    pub fn failure_messages(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.message.clone()).collect()
    }

    pub fn summary(&self) -> ScoreSummary {
        ScoreSummary {
            score_total: self.score_total,
            hard_failure_count: self.hard_failure_count,
            soft_failure_count: self.soft_failure_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub score_total: u32,
    pub hard_failure_count: usize,
    pub soft_failure_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Generated,
    Published,
    Failed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Generated => "generated",
            ContentStatus::Published => "published",
            ContentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "draft" => Ok(ContentStatus::Draft),
            "generated" => Ok(ContentStatus::Generated),
            "published" => Ok(ContentStatus::Published),
            "failed" => Ok(ContentStatus::Failed),
            other => Err(crate::Error::Storage(format!("unknown content status: {}", other))),
        }
    }
}

/// Everything storage needs to insert or update the article owned by a
/// source key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleUpsert {
    pub source_key: String,
    pub topic: String,
    pub city: String,
    pub keyword: String,
    pub title: String,
    pub description: String,
    pub slug: String,
    pub tags: Vec<String>,
    pub content: String,
    pub source_links: Vec<String>,
    pub lastmod: DateTime<Utc>,
    pub prompt_version: String,
    pub model_version: String,
    pub raw_json: serde_json::Value,
    pub quality_report: QualityReport,
    pub content_hash: String,
    pub structure_signature: String,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArticle {
    pub id: i64,
    pub source_key: String,
    pub topic: String,
    pub city: String,
    pub keyword: String,
    pub title: String,
    pub description: String,
    pub slug: String,
    pub tags: Vec<String>,
    pub content: String,
    pub source_links: Vec<String>,
    pub lastmod: DateTime<Utc>,
    pub prompt_version: String,
    pub model_version: String,
    pub raw_json: serde_json::Value,
    pub quality_report: QualityReport,
    pub content_hash: String,
    pub structure_signature: String,
    pub status: ContentStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl StoredArticle {
    /// Builds the stored form of an upsert, keeping identity and creation
    /// time of a previous row when there is one.
    pub fn from_upsert(
        id: i64,
        input: &ArticleUpsert,
        status: ContentStatus,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source_key: input.source_key.clone(),
            topic: input.topic.clone(),
            city: input.city.clone(),
            keyword: input.keyword.clone(),
            title: input.title.clone(),
            description: input.description.clone(),
            slug: input.slug.clone(),
            tags: input.tags.clone(),
            content: input.content.clone(),
            source_links: input.source_links.clone(),
            lastmod: input.lastmod,
            prompt_version: input.prompt_version.clone(),
            model_version: input.model_version.clone(),
            raw_json: input.raw_json.clone(),
            quality_report: input.quality_report.clone(),
            content_hash: input.content_hash.clone(),
            structure_signature: input.structure_signature.clone(),
            status,
            last_error: input.last_error.clone(),
            created_at,
            updated_at: now,
            published_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Once,
    Batch,
    Periodic,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Once => "once",
            RunMode::Batch => "batch",
            RunMode::Periodic => "periodic",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCounters {
    pub attempts: u32,
    pub revisions: u32,
    pub generator_errors: u32,
    pub quality_failures: u32,
    pub duplicate_rejections: u32,
    pub fallback_variants: u32,
    pub used_fallback: bool,
    pub published_count: u32,
    pub failed_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunRecord {
    pub run_id: String,
    pub mode: RunMode,
    pub source_key: String,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRunRecord {
    pub fn start(run_id: impl Into<String>, mode: RunMode, source_key: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            mode,
            source_key: source_key.into(),
            status: RunStatus::Running,
            counters: RunCounters::default(),
            error_message: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn finish(&mut self, status: RunStatus, error_message: Option<String>) {
        self.status = status;
        self.error_message = error_message;
        self.ended_at = Some(Utc::now());
    }
}
