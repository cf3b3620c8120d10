use locus_quality::QualityPolicy;
use std::time::Duration;

/// Reachability probing of source links.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    pub enabled: bool,
    /// Per-request budget; a slow host counts as unreachable.
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProducerConfig {
    pub max_attempts: u32,
    pub max_revisions: u32,
    pub default_language: String,
    pub prompt_version: String,
    pub lock_key: String,
    pub lock_lease: Duration,
    pub quality: QualityPolicy,
    pub probe: ProbeConfig,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_revisions: 2,
            default_language: "en".to_string(),
            prompt_version: "v1".to_string(),
            lock_key: "locus-producer".to_string(),
            lock_lease: Duration::from_secs(1200),
            quality: QualityPolicy::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl ProducerConfig {
    /// At least one generative attempt always runs.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}
