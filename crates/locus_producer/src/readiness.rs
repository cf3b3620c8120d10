//! Audit of what is already published, run before opening the site to
//! review.

use locus_core::{ArticleStore, Result, StoredArticle};
use locus_quality::text::{heading_lines, normalize_line};
use locus_quality::QualityPolicy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub const MIN_PUBLISHED_COUNT: u64 = 20;
pub const DEFAULT_SAMPLE_SIZE: usize = 50;
const PREVIEW_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

impl ReadinessCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self {
            name,
            status,
            details: details.into(),
        }
    }
}

impl fmt::Display for ReadinessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<4} {} - {}", self.status.as_str(), self.name, self.details)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub checks: Vec<ReadinessCheck>,
}

impl ReadinessReport {
    pub fn fail_count(&self) -> usize {
        self.checks.iter().filter(|c| c.status == CheckStatus::Fail).count()
    }

    pub fn warn_count(&self) -> usize {
        self.checks.iter().filter(|c| c.status == CheckStatus::Warn).count()
    }

    pub fn is_ready(&self) -> bool {
        self.fail_count() == 0
    }

    pub fn render(&self) -> String {
        self.checks.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("\n")
    }
}

pub fn has_verify_section(content: &str) -> bool {
    heading_lines(content).any(|line| normalize_line(line).contains("how to verify"))
}

fn preview<T>(items: &[T], format: impl Fn(&T) -> String) -> String {
    if items.is_empty() {
        return "none".to_string();
    }
    items.iter().take(PREVIEW_LIMIT).map(format).collect::<Vec<_>>().join("; ")
}

pub async fn audit_readiness<S: ArticleStore + ?Sized>(
    store: &S,
    policy: &QualityPolicy,
    sample_size: usize,
) -> Result<ReadinessReport> {
    let published = store.count_published().await?;
    let sample = store.sample_published(sample_size).await?;

    let checks = vec![
        check_published_volume(published),
        check_sample_quality(&sample, policy),
        check_template_duplication(&sample, policy),
    ];
    let report = ReadinessReport { checks };

    tracing::info!(
        total = report.checks.len(),
        fail_count = report.fail_count(),
        warn_count = report.warn_count(),
        "readiness summary"
    );
    Ok(report)
}

fn check_published_volume(published: u64) -> ReadinessCheck {
    if published < MIN_PUBLISHED_COUNT {
        ReadinessCheck::new(
            "published volume",
            CheckStatus::Fail,
            format!("published={} < required {}", published, MIN_PUBLISHED_COUNT),
        )
    } else {
        ReadinessCheck::new("published volume", CheckStatus::Ok, format!("published={}", published))
    }
}

fn check_sample_quality(sample: &[StoredArticle], policy: &QualityPolicy) -> ReadinessCheck {
    const NAME: &str = "sample quality";
    if sample.is_empty() {
        return ReadinessCheck::new(NAME, CheckStatus::Fail, "no published pages available for readiness sampling");
    }

    let low_source: Vec<&StoredArticle> = sample
        .iter()
        .filter(|a| a.source_links.len() < policy.min_source_links)
        .collect();
    let low_score: Vec<&StoredArticle> = sample
        .iter()
        .filter(|a| a.quality_report.score_total < policy.min_score)
        .collect();

    if !low_source.is_empty() || !low_score.is_empty() {
        return ReadinessCheck::new(
            NAME,
            CheckStatus::Fail,
            format!(
                "lowSource={} [{}] | lowScore={} [{}]",
                low_source.len(),
                preview(&low_source, |a| format!("{}(sources={})", a.slug, a.source_links.len())),
                low_score.len(),
                preview(&low_score, |a| format!("{}(score={})", a.slug, a.quality_report.score_total)),
            ),
        );
    }

    let missing_verify: Vec<&StoredArticle> = sample.iter().filter(|a| !has_verify_section(&a.content)).collect();
    if !missing_verify.is_empty() {
        return ReadinessCheck::new(
            NAME,
            CheckStatus::Warn,
            format!(
                "missingVerifySection={} [{}]",
                missing_verify.len(),
                preview(&missing_verify, |a| a.slug.clone())
            ),
        );
    }

    ReadinessCheck::new(
        NAME,
        CheckStatus::Ok,
        format!(
            "checked={} pages, minSourceLinks={}, minScore={}",
            sample.len(),
            policy.min_source_links,
            policy.min_score
        ),
    )
}

fn check_template_duplication(sample: &[StoredArticle], policy: &QualityPolicy) -> ReadinessCheck {
    const NAME: &str = "template duplication";
    let threshold = policy.max_duplicated_structure_count;

    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for article in sample.iter().filter(|a| !a.structure_signature.is_empty()) {
        *counts.entry(article.structure_signature.as_str()).or_default() += 1;
    }
    let mut overused: Vec<u64> = counts.into_values().filter(|count| *count > threshold).collect();
    overused.sort_unstable_by(|a, b| b.cmp(a));

    if overused.is_empty() {
        return ReadinessCheck::new(
            NAME,
            CheckStatus::Ok,
            format!("no structure signature appears >{} times in sample", threshold),
        );
    }

    let detail = overused
        .iter()
        .take(PREVIEW_LIMIT)
        .enumerate()
        .map(|(i, count)| format!("sig{}={}", i + 1, count))
        .collect::<Vec<_>>()
        .join("; ");
    ReadinessCheck::new(
        NAME,
        CheckStatus::Fail,
        format!("overused signatures={} (threshold >{}): {}", overused.len(), threshold, detail),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use locus_core::ContentStatus;
    use locus_storage::MemoryStorage;

    async fn published(store: &MemoryStorage, index: usize, signature: &str) {
        let request = locus_core::ProducerRequest::new(format!("Topic {}", index), "Austin", "keyword");
        let mut draft = crate::fallback::build_fallback(&request, Utc::now(), None);
        draft.slug = format!("page-{}", index);
        let evaluator = locus_quality::QualityEvaluator::default();
        let report = evaluator.evaluate(&draft, &Default::default());
        let input = locus_core::ArticleUpsert {
            source_key: request.source_key(),
            topic: request.topic.clone(),
            city: request.city.clone(),
            keyword: request.keyword.clone(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            slug: draft.slug.clone(),
            tags: draft.tags.clone(),
            content: draft.content.clone(),
            source_links: draft.source_links.clone(),
            lastmod: draft.lastmod,
            prompt_version: "v1".to_string(),
            model_version: "test".to_string(),
            raw_json: serde_json::json!({}),
            quality_report: report,
            content_hash: format!("hash-{}", index),
            structure_signature: signature.to_string(),
            last_error: None,
        };
        let stored = store.upsert(&input, ContentStatus::Generated).await.unwrap();
        store.mark_published(&[stored.id]).await.unwrap();
    }

    #[test]
    fn test_verify_section_detection() {
        assert!(has_verify_section("## How to Verify in Austin Today\n- step"));
        assert!(has_verify_section("###  how TO verify permits"));
        assert!(!has_verify_section("How to verify is mentioned in prose only"));
    }

    #[tokio::test]
    async fn test_empty_store_fails_volume_and_sample() {
        let store = MemoryStorage::new();
        let report = audit_readiness(&store, &QualityPolicy::default(), DEFAULT_SAMPLE_SIZE)
            .await
            .unwrap();
        assert_eq!(report.checks[0].status, CheckStatus::Fail);
        assert_eq!(report.checks[1].status, CheckStatus::Fail);
        assert_eq!(report.checks[2].status, CheckStatus::Ok);
        assert!(!report.is_ready());
        assert!(report.render().starts_with("FAIL published volume - published=0"));
    }

    #[tokio::test]
    async fn test_healthy_catalog_is_ready() {
        let store = MemoryStorage::new();
        for i in 0..MIN_PUBLISHED_COUNT as usize {
            published(&store, i, &format!("sig-{}", i % 10)).await;
        }
        let report = audit_readiness(&store, &QualityPolicy::default(), DEFAULT_SAMPLE_SIZE)
            .await
            .unwrap();
        assert!(report.is_ready(), "{}", report.render());
        assert_eq!(report.warn_count(), 0);
    }

    #[tokio::test]
    async fn test_overused_signature_fails() {
        let store = MemoryStorage::new();
        for i in 0..5 {
            published(&store, i, "## a|## b|## sources").await;
        }
        published(&store, 5, "").await;
        let report = audit_readiness(&store, &QualityPolicy::default(), DEFAULT_SAMPLE_SIZE)
            .await
            .unwrap();
        let duplication = &report.checks[2];
        assert_eq!(duplication.status, CheckStatus::Fail);
        assert!(duplication.details.contains("sig1=5"));
    }

    #[tokio::test]
    async fn test_low_source_count_fails_sample() {
        let store = MemoryStorage::new();
        published(&store, 0, "sig").await;
        let policy = QualityPolicy {
            min_source_links: 10,
            ..QualityPolicy::default()
        };
        let report = audit_readiness(&store, &policy, 10).await.unwrap();
        assert_eq!(report.checks[1].status, CheckStatus::Fail);
        assert!(report.checks[1].details.contains("lowSource=1"));
    }
}
