use clap::{ArgAction, Args};
use locus_core::Severity;
use locus_inference::{PromptNames, PromptServerConfig};
use locus_producer::{ProbeConfig, ProducerConfig};
use locus_quality::QualityPolicy;
use std::time::Duration;

/// Producer, quality and retry settings. Every flag can also come from the
/// environment.
#[derive(Args, Debug, Clone)]
pub struct ProducerArgs {
    #[arg(long, env = "QUALITY_MIN_SCORE", default_value_t = 70)]
    pub quality_min_score: u32,

    #[arg(long, env = "PRODUCER_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    #[arg(long, env = "PRODUCER_MAX_REVISIONS", default_value_t = 2)]
    pub max_revisions: u32,

    #[arg(long, env = "GENKIT_PROMPT_VERSION", default_value = "v1")]
    pub prompt_version: String,

    #[arg(long, env = "PRODUCER_OUTLINE_PROMPT_NAME", default_value = "seo-outline")]
    pub outline_prompt: String,

    #[arg(long, env = "PRODUCER_PROMPT_NAME", default_value = "seo-article")]
    pub draft_prompt: String,

    #[arg(long, env = "PRODUCER_REVISE_PROMPT_NAME", default_value = "seo-revise")]
    pub revise_prompt: String,

    #[arg(long, env = "QUALITY_MIN_SOURCE_LINKS", default_value_t = 2)]
    pub min_source_links: usize,

    #[arg(long, env = "QUALITY_REQUIRE_REACHABLE_LINKS", default_value_t = false, action = ArgAction::Set)]
    pub require_reachable_links: bool,

    #[arg(long, env = "QUALITY_MAX_PUBLISHED_SAME_STRUCTURE", default_value_t = 3)]
    pub max_same_structure: u64,

    /// "soft" or "hard"
    #[arg(long, env = "QUALITY_DUPLICATE_STRUCTURE_SEVERITY", default_value = "soft")]
    pub duplicate_structure_severity: Severity,

    /// Comma-separated; replaces the built-in list when set
    #[arg(long, env = "QUALITY_FORBIDDEN_TERMS")]
    pub forbidden_terms: Option<String>,

    #[arg(long, env = "SOURCE_PROBE_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub source_probe_enabled: bool,

    #[arg(long, env = "SOURCE_PROBE_TIMEOUT_MS", default_value_t = 3000)]
    pub source_probe_timeout_ms: u64,

    #[arg(long, env = "MAX_PIPELINE_LOCK_SECONDS", default_value_t = 1200)]
    pub max_lock_seconds: u64,

    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value_t = 3)]
    pub retry_max_attempts: u32,

    #[arg(long, env = "RETRY_BACKOFF_MS", default_value_t = 2000)]
    pub retry_backoff_ms: u64,
}

impl ProducerArgs {
    pub fn quality_policy(&self) -> QualityPolicy {
        let mut policy = QualityPolicy {
            min_source_links: self.min_source_links,
            require_reachable_source_links: self.require_reachable_links,
            max_duplicated_structure_count: self.max_same_structure,
            duplicated_structure_severity: self.duplicate_structure_severity,
            ..QualityPolicy::default()
        }
        .with_min_score(self.quality_min_score);

        if let Some(terms) = &self.forbidden_terms {
            policy = policy.with_forbidden_terms(terms.split(',').map(str::trim).filter(|t| !t.is_empty()));
        }
        policy
    }

    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig {
            max_attempts: self.max_attempts,
            max_revisions: self.max_revisions,
            prompt_version: self.prompt_version.clone(),
            lock_lease: Duration::from_secs(self.max_lock_seconds),
            quality: self.quality_policy(),
            probe: ProbeConfig {
                enabled: self.source_probe_enabled,
                timeout: Duration::from_millis(self.source_probe_timeout_ms),
            },
            ..ProducerConfig::default()
        }
    }

    pub fn prompt_server(&self, base_url: Option<String>, api_key: Option<String>) -> PromptServerConfig {
        PromptServerConfig {
            base_url,
            api_key,
            prompt_version: self.prompt_version.clone(),
            prompts: PromptNames {
                outline: self.outline_prompt.clone(),
                draft: self.draft_prompt.clone(),
                revise: self.revise_prompt.clone(),
            },
            ..PromptServerConfig::default()
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        producer: ProducerArgs,
    }

    #[test]
    fn test_defaults_match_library_defaults() {
        let cli = TestCli::try_parse_from(["locus"]).unwrap();
        let config = cli.producer.producer_config();
        let defaults = ProducerConfig::default();

        assert_eq!(config.max_attempts, defaults.max_attempts);
        assert_eq!(config.max_revisions, defaults.max_revisions);
        assert_eq!(config.lock_lease, defaults.lock_lease);
        assert_eq!(config.probe, defaults.probe);
        assert_eq!(config.quality, QualityPolicy::default());
    }

    #[test]
    fn test_flags_override_policy() {
        let cli = TestCli::try_parse_from([
            "locus",
            "--quality-min-score",
            "85",
            "--duplicate-structure-severity",
            "hard",
            "--forbidden-terms",
            "casino, lottery ,",
            "--source-probe-enabled",
            "false",
        ])
        .unwrap();
        let config = cli.producer.producer_config();

        assert_eq!(config.quality.min_score, 85);
        assert_eq!(config.quality.duplicated_structure_severity, Severity::Hard);
        assert_eq!(config.quality.forbidden_terms, vec!["casino", "lottery"]);
        assert!(!config.probe.enabled);
    }
}
