//! Turns an unreliable generator into a bounded process that always ends
//! with one published article or a fatal fallback error.
//!
//! Per attempt the [`Producer`] asks for an outline, then a draft, scores
//! it, lets the model revise it a bounded number of times, rejects content
//! already owned by another request and persists what passes. When every
//! attempt fails, a deterministic template article is published instead.

pub mod alerts;
pub mod assessment;
pub mod config;
pub mod fallback;
pub mod orchestrator;
pub mod prober;
pub mod readiness;
pub mod retry;
pub mod revision;
pub mod scheduler;
pub mod sources;

pub use alerts::{AlertDispatcher, AlertSink, CriticalAlert, WebhookAlertSink};
pub use assessment::{prepare_draft, Assessment, DraftAssessor};
pub use config::{ProbeConfig, ProducerConfig};
pub use fallback::{build_fallback, variant_marker, with_variant, FALLBACK_SOURCE_LINKS};
pub use orchestrator::{AttemptFailure, AttemptFailureKind, Phase, ProduceOutcome, Producer, MAX_FALLBACK_VARIANTS};
pub use prober::{HttpLinkChecker, LinkChecker, SourceLinkProber};
pub use readiness::{audit_readiness, CheckStatus, ReadinessCheck, ReadinessReport};
pub use retry::with_retry;
pub use revision::RevisionLoop;
pub use scheduler::{BatchReport, RequestFailure, ScheduledRunner};
pub use sources::{ensure_sources_section, normalize_source_link, normalize_source_links};

pub mod prelude {
    pub use super::{
        HttpLinkChecker, LinkChecker, ProduceOutcome, Producer, ProducerConfig, ScheduledRunner,
    };
    pub use locus_core::{ProducerRequest, Result, RunMode};
}
