//! Attempt/fallback state machine.
//!
//! One call to [`Producer::produce`] walks the states below until it reaches
//! `Done` or `Failed`:
//!
//! ```text
//! OutlinePending -> DraftPending -> Evaluating -> Revising* -> Deduping -> Persisting -> Done
//!        ^                                                                     |
//!        +------------------------- AttemptFailed <----------------------------+ (any step)
//!                                        |
//!                                        v (attempts exhausted)
//! FallbackBuild -> FallbackEvaluate -> FallbackDedupe -> FallbackPersist -> Done
//!                        ^                   |
//!                        +---- variant ------+          (else Failed)
//! ```
//!
//! Generative failures consume an attempt. Only the fallback path can fail
//! the run.

use chrono::Utc;
use locus_core::{
    content_hash, validate_outline, ArticleDraft, ArticleGenerator, ArticleUpsert, ContentStatus, Error, Outline,
    PipelineRunRecord, ProducerRequest, ProducerStorage, QualityReport, Result, RunCounters, RunMode, RunStatus,
    ScoreSummary, StoredArticle,
};
use locus_quality::evaluator::DUPLICATED_STRUCTURE;
use locus_quality::QualityEvaluator;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::assessment::{prepare_draft, Assessment, DraftAssessor};
use crate::config::ProducerConfig;
use crate::fallback::{build_fallback, variant_marker, with_variant};
use crate::prober::{LinkChecker, SourceLinkProber};
use crate::revision::RevisionLoop;

/// Collision-resolving variants tried for a fallback before giving up.
pub const MAX_FALLBACK_VARIANTS: u32 = 3;

pub const FALLBACK_MODEL_VERSION: &str = "deterministic-fallback";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    OutlinePending,
    DraftPending,
    Evaluating,
    Revising,
    Deduping,
    Persisting,
    AttemptFailed,
    FallbackBuild,
    FallbackEvaluate,
    FallbackDedupe,
    FallbackPersist,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::OutlinePending => "outline_pending",
            Phase::DraftPending => "draft_pending",
            Phase::Evaluating => "evaluating",
            Phase::Revising => "revising",
            Phase::Deduping => "deduping",
            Phase::Persisting => "persisting",
            Phase::AttemptFailed => "attempt_failed",
            Phase::FallbackBuild => "fallback_build",
            Phase::FallbackEvaluate => "fallback_evaluate",
            Phase::FallbackDedupe => "fallback_dedupe",
            Phase::FallbackPersist => "fallback_persist",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptFailureKind {
    Generator,
    Schema,
    Quality,
    Duplicate,
    Storage,
}

/// Why one generative attempt was abandoned.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFailure {
    pub attempt: u32,
    pub kind: AttemptFailureKind,
    pub message: String,
    pub failure_codes: Vec<String>,
    pub score: Option<ScoreSummary>,
}

impl AttemptFailure {
    fn from_error(attempt: u32, error: &Error) -> Self {
        let kind = match error {
            Error::Schema(_) => AttemptFailureKind::Schema,
            Error::DuplicateContent { .. } => AttemptFailureKind::Duplicate,
            Error::Database(_) | Error::Storage(_) | Error::Io(_) | Error::Lock(_) => AttemptFailureKind::Storage,
            _ => AttemptFailureKind::Generator,
        };
        Self {
            attempt,
            kind,
            message: error.to_string(),
            failure_codes: Vec::new(),
            score: None,
        }
    }

    fn quality(attempt: u32, report: &QualityReport) -> Self {
        Self {
            attempt,
            kind: AttemptFailureKind::Quality,
            message: format!(
                "quality gate missed: score {} (min {}), {} hard failures",
                report.score_total, report.min_score, report.hard_failure_count
            ),
            failure_codes: report.failure_codes.clone(),
            score: Some(report.summary()),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt {} ({:?}): {}", self.attempt, self.kind, self.message)
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct ProduceOutcome {
    pub run_id: String,
    pub article: StoredArticle,
    pub report: QualityReport,
    pub used_fallback: bool,
    pub counters: RunCounters,
    pub failures: Vec<AttemptFailure>,
    pub trace: Vec<Phase>,
}

enum State {
    OutlinePending { attempt: u32 },
    DraftPending { attempt: u32, outline: Outline },
    Evaluating { attempt: u32, draft: ArticleDraft },
    Revising { attempt: u32, assessment: Assessment, revisions: RevisionLoop },
    Deduping { attempt: u32, assessment: Assessment },
    Persisting { attempt: u32, assessment: Assessment, hash: String },
    AttemptFailed(AttemptFailure),
    FallbackBuild,
    FallbackEvaluate { draft: ArticleDraft, variant: u32 },
    FallbackDedupe { assessment: Assessment, variant: u32 },
    FallbackPersist { assessment: Assessment, hash: String },
    Done(Box<ProduceOutcome>),
    Failed(Error),
}

impl State {
    fn phase(&self) -> Phase {
        match self {
            State::OutlinePending { .. } => Phase::OutlinePending,
            State::DraftPending { .. } => Phase::DraftPending,
            State::Evaluating { .. } => Phase::Evaluating,
            State::Revising { .. } => Phase::Revising,
            State::Deduping { .. } => Phase::Deduping,
            State::Persisting { .. } => Phase::Persisting,
            State::AttemptFailed(_) => Phase::AttemptFailed,
            State::FallbackBuild => Phase::FallbackBuild,
            State::FallbackEvaluate { .. } => Phase::FallbackEvaluate,
            State::FallbackDedupe { .. } => Phase::FallbackDedupe,
            State::FallbackPersist { .. } => Phase::FallbackPersist,
            State::Done(_) => Phase::Done,
            State::Failed(_) => Phase::Failed,
        }
    }
}

/// Mutable facts of one run.
struct Run<'a> {
    run_id: String,
    request: &'a ProducerRequest,
    language: String,
    source_key: String,
    counters: RunCounters,
    last_outline: Option<Outline>,
    fallback_base: Option<ArticleDraft>,
    failures: Vec<AttemptFailure>,
    trace: Vec<Phase>,
    prober: SourceLinkProber,
}

pub struct Producer {
    generator: Arc<dyn ArticleGenerator>,
    storage: Arc<dyn ProducerStorage>,
    checker: Arc<dyn LinkChecker>,
    evaluator: QualityEvaluator,
    config: ProducerConfig,
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("generator", &self.generator.name())
            .field("checker", &self.checker)
            .field("config", &self.config)
            .finish()
    }
}

impl Producer {
    pub fn new(
        generator: Arc<dyn ArticleGenerator>,
        storage: Arc<dyn ProducerStorage>,
        checker: Arc<dyn LinkChecker>,
        config: ProducerConfig,
    ) -> Self {
        Self {
            generator,
            storage,
            checker,
            evaluator: QualityEvaluator::new(config.quality.clone()),
            config,
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn ProducerStorage> {
        &self.storage
    }

    pub async fn produce(&self, request: &ProducerRequest, mode: RunMode) -> Result<ProduceOutcome> {
        let run_id = Uuid::new_v4().to_string();
        self.produce_with_run_id(request, mode, &run_id).await
    }

    pub async fn produce_with_run_id(
        &self,
        request: &ProducerRequest,
        mode: RunMode,
        run_id: &str,
    ) -> Result<ProduceOutcome> {
        if [&request.topic, &request.city, &request.keyword].iter().any(|f| f.trim().is_empty()) {
            return Err(Error::Schema("topic, city and keyword are required".to_string()));
        }
        let request_text = format!("{}\n{}\n{}", request.topic, request.city, request.keyword);
        let forbidden = self.evaluator.policy().forbidden_matches(&request_text);
        if !forbidden.is_empty() {
            return Err(Error::Schema(format!("request contains forbidden terms: {}", forbidden.join(", "))));
        }

        let source_key = request.source_key();
        let mut record = PipelineRunRecord::start(run_id, mode, source_key.clone());
        self.storage.start_run(&record).await?;

        let mut run = Run {
            run_id: run_id.to_string(),
            request,
            language: request.language_or(&self.config.default_language).to_string(),
            source_key,
            counters: RunCounters::default(),
            last_outline: None,
            fallback_base: None,
            failures: Vec::new(),
            trace: Vec::new(),
            prober: SourceLinkProber::new(self.checker.clone(), self.config.probe.clone()),
        };

        tracing::info!(
            run_id = %run.run_id,
            source_key = %run.source_key,
            mode = %mode,
            max_attempts = self.config.attempts(),
            "run started"
        );

        let mut state = State::OutlinePending { attempt: 1 };
        loop {
            let phase = state.phase();
            run.trace.push(phase);
            tracing::debug!(run_id = %run.run_id, phase = %phase, "phase");

            state = match state {
                State::Done(mut outcome) => {
                    outcome.trace = std::mem::take(&mut run.trace);
                    record.counters = outcome.counters;
                    record.finish(RunStatus::Success, None);
                    self.finish_ledger(&record).await;
                    tracing::info!(
                        run_id = %run.run_id,
                        article_id = outcome.article.id,
                        slug = %outcome.article.slug,
                        score_total = outcome.report.score_total,
                        attempts = outcome.counters.attempts,
                        used_fallback = outcome.used_fallback,
                        "run completed"
                    );
                    return Ok(*outcome);
                }
                State::Failed(error) => {
                    run.counters.failed_count += 1;
                    record.counters = run.counters;
                    record.finish(RunStatus::Failed, Some(error.to_string()));
                    self.finish_ledger(&record).await;
                    tracing::error!(
                        run_id = %run.run_id,
                        attempts = run.counters.attempts,
                        error = %error,
                        "run failed"
                    );
                    return Err(error);
                }
                other => self.step(other, &mut run).await,
            };
        }
    }

    async fn finish_ledger(&self, record: &PipelineRunRecord) {
        if let Err(e) = self.storage.finish_run(record).await {
            tracing::warn!(run_id = %record.run_id, error = %e, "failed to finalize run record");
        }
    }

    fn attempt_error(&self, run: &mut Run<'_>, attempt: u32, error: Error) -> State {
        if error.is_fatal() {
            return State::Failed(error);
        }
        let failure = AttemptFailure::from_error(attempt, &error);
        if matches!(failure.kind, AttemptFailureKind::Generator | AttemptFailureKind::Schema) {
            run.counters.generator_errors += 1;
        }
        State::AttemptFailed(failure)
    }

    fn assessor<'a>(&'a self, prober: &'a SourceLinkProber) -> DraftAssessor<'a, dyn ProducerStorage> {
        DraftAssessor::new(&self.evaluator, self.storage.as_ref(), prober)
    }

    async fn step(&self, state: State, run: &mut Run<'_>) -> State {
        match state {
            State::OutlinePending { attempt } => {
                run.counters.attempts += 1;
                tracing::info!(
                    run_id = %run.run_id,
                    attempt,
                    max_attempts = self.config.attempts(),
                    "attempt started"
                );
                let outline = self
                    .generator
                    .generate_outline(run.request, &run.language)
                    .await
                    .and_then(|o| validate_outline(&o).map(|_| o));
                match outline {
                    Ok(outline) => {
                        run.last_outline = Some(outline.clone());
                        State::DraftPending { attempt, outline }
                    }
                    Err(e) => self.attempt_error(run, attempt, e),
                }
            }

            State::DraftPending { attempt, outline } => {
                let draft = self
                    .generator
                    .generate_draft(&outline, run.request, &run.language)
                    .await
                    .and_then(prepare_draft);
                match draft {
                    Ok(draft) => State::Evaluating { attempt, draft },
                    Err(e) => self.attempt_error(run, attempt, e),
                }
            }

            State::Evaluating { attempt, draft } => {
                let assessed = self.assessor(&run.prober).assess(draft).await;
                match assessed {
                    Ok(assessment) => {
                        log_quality(&run.run_id, attempt, &assessment.report);
                        State::Revising {
                            attempt,
                            assessment,
                            revisions: RevisionLoop::new(self.config.max_revisions),
                        }
                    }
                    Err(e) => self.attempt_error(run, attempt, e),
                }
            }

            State::Revising {
                attempt,
                assessment,
                mut revisions,
            } => {
                if revisions.should_revise(&assessment) {
                    run.counters.revisions += 1;
                    tracing::info!(
                        run_id = %run.run_id,
                        attempt,
                        revision = revisions.performed() + 1,
                        score_total = assessment.report.score_total,
                        failure_codes = ?assessment.report.failure_codes,
                        "revision started"
                    );
                    let revised = revisions
                        .revise(
                            self.generator.as_ref(),
                            &self.assessor(&run.prober),
                            &assessment,
                            &run.language,
                        )
                        .await;
                    match revised {
                        Ok(next) => {
                            tracing::info!(
                                run_id = %run.run_id,
                                attempt,
                                revision = revisions.performed(),
                                score_total = next.report.score_total,
                                hard_failures = next.report.hard_failure_count,
                                soft_failures = next.report.soft_failure_count,
                                "revision completed"
                            );
                            State::Revising {
                                attempt,
                                assessment: next,
                                revisions,
                            }
                        }
                        Err(e) => self.attempt_error(run, attempt, e),
                    }
                } else if assessment.report.passed {
                    State::Deduping { attempt, assessment }
                } else {
                    run.counters.quality_failures += 1;
                    let failure = AttemptFailure::quality(attempt, &assessment.report);
                    self.record_failure(run, &assessment, &hash_of(&assessment.draft), &failure.message)
                        .await;
                    State::AttemptFailed(failure)
                }
            }

            State::Deduping { attempt, assessment } => {
                let hash = hash_of(&assessment.draft);
                match self.owner_conflict(&hash, &run.source_key).await {
                    Ok(None) => State::Persisting {
                        attempt,
                        assessment,
                        hash,
                    },
                    Ok(Some(owner)) => {
                        run.counters.duplicate_rejections += 1;
                        let error = Error::DuplicateContent {
                            hash: hash.clone(),
                            owner,
                        };
                        self.record_failure(run, &assessment, &hash, &error.to_string()).await;
                        self.attempt_error(run, attempt, error)
                    }
                    Err(e) => self.attempt_error(run, attempt, e),
                }
            }

            State::Persisting {
                attempt,
                assessment,
                hash,
            } => match self.persist(run, &assessment, &hash, false).await {
                Ok(article) => State::Done(Box::new(self.outcome(run, article, assessment.report, false))),
                Err(e) => self.attempt_error(run, attempt, e),
            },

            State::AttemptFailed(failure) => {
                tracing::warn!(
                    run_id = %run.run_id,
                    attempt = failure.attempt,
                    kind = ?failure.kind,
                    failure_codes = ?failure.failure_codes,
                    score_total = failure.score.map(|s| s.score_total),
                    reason = %failure.message,
                    "attempt failed"
                );
                let next = failure.attempt + 1;
                run.failures.push(failure);
                if next <= self.config.attempts() {
                    State::OutlinePending { attempt: next }
                } else {
                    State::FallbackBuild
                }
            }

            State::FallbackBuild => {
                run.counters.used_fallback = true;
                let seed = run
                    .last_outline
                    .as_ref()
                    .filter(|o| self.evaluator.policy().forbidden_matches(&outline_text(o)).is_empty());
                let draft = build_fallback(run.request, Utc::now(), seed);
                tracing::info!(
                    run_id = %run.run_id,
                    seeded = seed.is_some(),
                    slug = %draft.slug,
                    "fallback built"
                );
                run.fallback_base = Some(draft.clone());
                State::FallbackEvaluate { draft, variant: 0 }
            }

            State::FallbackEvaluate { draft, variant } => {
                let assessed = self.assessor(&run.prober).assess(draft).await;
                match assessed {
                    Ok(assessment) if assessment.report.passed => {
                        log_quality(&run.run_id, 0, &assessment.report);
                        State::FallbackDedupe { assessment, variant }
                    }
                    Ok(assessment) if only_structure_failures(&assessment.report) && variant < MAX_FALLBACK_VARIANTS => {
                        run.counters.fallback_variants += 1;
                        let marker = variant_marker(&run.run_id, variant + 1);
                        tracing::warn!(
                            run_id = %run.run_id,
                            signature = %assessment.signature,
                            marker = %marker,
                            "fallback structure already published, building variant"
                        );
                        let base = run.fallback_base.as_ref().unwrap_or(&assessment.draft);
                        State::FallbackEvaluate {
                            draft: with_variant(base, &marker),
                            variant: variant + 1,
                        }
                    }
                    Ok(assessment) => State::Failed(Error::Fallback(format!(
                        "fallback article failed quality (variant {}): score {}, codes {:?}",
                        variant, assessment.report.score_total, assessment.report.failure_codes
                    ))),
                    Err(e) => State::Failed(e),
                }
            }

            State::FallbackDedupe { assessment, variant } => {
                let hash = hash_of(&assessment.draft);
                match self.owner_conflict(&hash, &run.source_key).await {
                    Ok(None) => State::FallbackPersist { assessment, hash },
                    Ok(Some(owner)) if variant < MAX_FALLBACK_VARIANTS => {
                        run.counters.duplicate_rejections += 1;
                        run.counters.fallback_variants += 1;
                        let marker = variant_marker(&run.run_id, variant + 1);
                        tracing::warn!(
                            run_id = %run.run_id,
                            owner = %owner,
                            marker = %marker,
                            "fallback hash collision, building variant"
                        );
                        let base = run.fallback_base.as_ref().unwrap_or(&assessment.draft);
                        State::FallbackEvaluate {
                            draft: with_variant(base, &marker),
                            variant: variant + 1,
                        }
                    }
                    Ok(Some(owner)) => State::Failed(Error::Fallback(format!(
                        "fallback content still collides with {} after {} variants",
                        owner, variant
                    ))),
                    Err(e) => State::Failed(e),
                }
            }

            State::FallbackPersist { assessment, hash } => {
                match self.persist(run, &assessment, &hash, true).await {
                    Ok(article) => State::Done(Box::new(self.outcome(run, article, assessment.report, true))),
                    Err(e) => State::Failed(e),
                }
            }

            terminal @ (State::Done(_) | State::Failed(_)) => terminal,
        }
    }

    /// Source key of a different request already owning `hash`, if any.
    async fn owner_conflict(&self, hash: &str, source_key: &str) -> Result<Option<String>> {
        Ok(self
            .storage
            .find_by_content_hash(hash)
            .await?
            .filter(|existing| existing.source_key != source_key)
            .map(|existing| existing.source_key))
    }

    /// Keeps a rejected draft as a `failed` record with its reason, unless
    /// the request already has a published article.
    async fn record_failure(&self, run: &Run<'_>, assessment: &Assessment, hash: &str, reason: &str) {
        match self.try_record_failure(run, assessment, hash, reason).await {
            Ok(Some(stored)) => {
                tracing::debug!(run_id = %run.run_id, article_id = stored.id, reason, "rejected draft recorded")
            }
            Ok(None) => {
                tracing::debug!(run_id = %run.run_id, source_key = %run.source_key, "published article kept")
            }
            Err(e) => tracing::warn!(run_id = %run.run_id, error = %e, "failed to record rejected draft"),
        }
    }

    async fn try_record_failure(
        &self,
        run: &Run<'_>,
        assessment: &Assessment,
        hash: &str,
        reason: &str,
    ) -> Result<Option<StoredArticle>> {
        let existing = self.storage.find_by_source_key(&run.source_key).await?;
        if existing.map_or(false, |a| a.status == ContentStatus::Published) {
            return Ok(None);
        }
        let input = self.article_input(run, assessment, hash, false, Some(reason.to_string()));
        Ok(Some(self.storage.upsert(&input, ContentStatus::Failed).await?))
    }

    async fn persist(
        &self,
        run: &mut Run<'_>,
        assessment: &Assessment,
        hash: &str,
        fallback: bool,
    ) -> Result<StoredArticle> {
        let input = self.article_input(run, assessment, hash, fallback, None);
        let stored = self.storage.upsert(&input, ContentStatus::Generated).await?;
        self.storage.mark_published(&[stored.id]).await?;
        run.counters.published_count += 1;

        let published = self.storage.find_by_content_hash(hash).await?;
        Ok(published.filter(|a| a.id == stored.id).unwrap_or(stored))
    }

    fn article_input(
        &self,
        run: &Run<'_>,
        assessment: &Assessment,
        hash: &str,
        fallback: bool,
        last_error: Option<String>,
    ) -> ArticleUpsert {
        let draft = &assessment.draft;
        let model_version = if fallback {
            FALLBACK_MODEL_VERSION.to_string()
        } else {
            self.generator.name().to_string()
        };

        ArticleUpsert {
            source_key: run.source_key.clone(),
            topic: run.request.topic.clone(),
            city: run.request.city.clone(),
            keyword: run.request.keyword.clone(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            slug: draft.slug.clone(),
            tags: draft.tags.clone(),
            content: draft.content.clone(),
            source_links: draft.source_links.clone(),
            lastmod: draft.lastmod,
            prompt_version: self.config.prompt_version.clone(),
            model_version,
            raw_json: json!({
                "runId": run.run_id,
                "fallback": fallback,
                "outline": run.last_outline,
                "article": draft,
                "qualityReport": assessment.report,
            }),
            quality_report: assessment.report.clone(),
            content_hash: hash.to_string(),
            structure_signature: assessment.signature.clone(),
            last_error,
        }
    }

    fn outcome(&self, run: &mut Run<'_>, article: StoredArticle, report: QualityReport, used_fallback: bool) -> ProduceOutcome {
        ProduceOutcome {
            run_id: run.run_id.clone(),
            article,
            report,
            used_fallback,
            counters: run.counters,
            failures: std::mem::take(&mut run.failures),
            trace: Vec::new(),
        }
    }
}

fn hash_of(draft: &ArticleDraft) -> String {
    content_hash(&draft.title, &draft.description, &draft.content)
}

fn only_structure_failures(report: &QualityReport) -> bool {
    !report.failure_codes.is_empty() && report.failure_codes.iter().all(|c| c == DUPLICATED_STRUCTURE)
}

fn outline_text(outline: &Outline) -> String {
    let mut parts = vec![outline.title.as_str(), outline.audience.as_str(), outline.intent.as_str()];
    parts.extend(outline.headings.iter().map(String::as_str));
    parts.extend(outline.decision_checklist.iter().map(String::as_str));
    parts.extend(outline.faq_questions.iter().map(String::as_str));
    parts.join("\n")
}

fn log_quality(run_id: &str, attempt: u32, report: &QualityReport) {
    tracing::info!(
        run_id = %run_id,
        attempt,
        passed = report.passed,
        score_total = report.score_total,
        min_score = report.min_score,
        hard_failures = report.hard_failure_count,
        soft_failures = report.soft_failure_count,
        failure_codes = ?report.failure_codes,
        "quality evaluated"
    );
}
