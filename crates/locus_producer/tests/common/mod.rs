#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use locus_core::{
    content_hash, ArticleDraft, ArticleGenerator, ArticleStore, ArticleUpsert, ContentStatus, Error, Outline,
    ProducerRequest, ProducerStorage, Result, RevisionFeedback, StoredArticle,
};
use locus_producer::{build_fallback, LinkChecker, ProducerConfig, Producer};
use locus_quality::{build_signature, QualityEvaluator, QualityPolicy};
use locus_storage::MemoryStorage;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

pub fn fixed_now() -> DateTime<Utc> {
    "2026-03-01T00:00:00Z".parse().unwrap()
}

pub fn request(topic: &str) -> ProducerRequest {
    ProducerRequest::new(topic, "Austin", format!("{} austin", topic.to_lowercase()))
}

/// A complete draft that passes the default policy with full marks.
pub fn passing_draft(request: &ProducerRequest) -> ArticleDraft {
    let mut draft = build_fallback(request, fixed_now(), None);
    draft.title = format!("{} in {}: Field Notes", request.topic, request.city);
    draft
}

/// Passing draft minus its evidence notes: one soft failure, score 97.
pub fn weak_draft(request: &ProducerRequest) -> ArticleDraft {
    let mut draft = passing_draft(request);
    draft.evidence_notes.clear();
    draft
}

pub fn outline() -> Outline {
    Outline {
        title: "Outline title".to_string(),
        audience: "Households comparing local services".to_string(),
        intent: "Pick a provider with confidence".to_string(),
        headings: vec!["What to know".to_string(), "How to verify".to_string()],
        decision_checklist: vec!["Ask for the permit number up front".to_string()],
        faq_questions: vec!["How long does it take?".to_string()],
    }
}

/// What one generative attempt returns.
#[derive(Debug, Clone)]
pub enum Step {
    Pass,
    Weak,
    Forbidden(String),
    Fixed(ArticleDraft),
    InvalidDraft,
    OutlineError,
    DraftError,
    OutlineWithChecklist(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revise {
    /// Restores the evidence notes.
    Fix,
    Unchanged,
    Fail,
}

/// Generator following a per-attempt script. Once the script is exhausted
/// the last step repeats.
#[derive(Debug)]
pub struct ScriptedGenerator {
    steps: Mutex<VecDeque<Step>>,
    current: Mutex<Option<Step>>,
    revise: Revise,
    pub outline_calls: AtomicUsize,
    pub draft_calls: AtomicUsize,
    pub revise_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(steps: Vec<Step>, revise: Revise) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            current: Mutex::new(None),
            revise,
            outline_calls: AtomicUsize::new(0),
            draft_calls: AtomicUsize::new(0),
            revise_calls: AtomicUsize::new(0),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::new(vec![step], Revise::Unchanged)
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap();
        let step = if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().cloned().unwrap_or(Step::Pass)
        };
        *self.current.lock().unwrap() = Some(step.clone());
        step
    }

    fn current(&self) -> Step {
        self.current.lock().unwrap().clone().unwrap_or(Step::Pass)
    }

    pub fn outlines(&self) -> usize {
        self.outline_calls.load(Ordering::SeqCst)
    }

    pub fn revisions(&self) -> usize {
        self.revise_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_outline(&self, _request: &ProducerRequest, _language: &str) -> Result<Outline> {
        self.outline_calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::OutlineError => Err(Error::Generator("empty outline".to_string())),
            Step::OutlineWithChecklist(items) => Ok(Outline {
                decision_checklist: items,
                ..outline()
            }),
            _ => Ok(outline()),
        }
    }

    async fn generate_draft(
        &self,
        _outline: &Outline,
        request: &ProducerRequest,
        _language: &str,
    ) -> Result<ArticleDraft> {
        self.draft_calls.fetch_add(1, Ordering::SeqCst);
        match self.current() {
            Step::Pass => Ok(passing_draft(request)),
            Step::Weak => Ok(weak_draft(request)),
            Step::Forbidden(term) => {
                let mut draft = passing_draft(request);
                draft.content.push_str(&format!("\n\nAsk about {} before booking.", term));
                Ok(draft)
            }
            Step::Fixed(draft) => Ok(draft),
            Step::InvalidDraft => {
                let mut draft = passing_draft(request);
                draft.slug = "Not A Slug".to_string();
                Ok(draft)
            }
            Step::DraftError | Step::OutlineWithChecklist(_) => Err(Error::Generator("empty draft".to_string())),
            Step::OutlineError => Err(Error::Generator("draft requested without outline".to_string())),
        }
    }

    async fn revise_draft(
        &self,
        draft: &ArticleDraft,
        feedback: &RevisionFeedback,
        _language: &str,
    ) -> Result<ArticleDraft> {
        self.revise_calls.fetch_add(1, Ordering::SeqCst);
        assert!(!feedback.failure_codes.is_empty());
        match self.revise {
            Revise::Fix => {
                let mut revised = draft.clone();
                revised.evidence_notes = vec![
                    "Permit office hours confirmed by phone".to_string(),
                    "Fee schedule taken from the county site".to_string(),
                ];
                Ok(revised)
            }
            Revise::Unchanged => Ok(draft.clone()),
            Revise::Fail => Err(Error::Generator("revision timed out".to_string())),
        }
    }
}

/// Link checker that counts requests and treats every host as up unless
/// listed as down.
#[derive(Debug, Default)]
pub struct CountingLinkChecker {
    calls: Mutex<HashMap<String, usize>>,
    down: Vec<String>,
}

impl CountingLinkChecker {
    pub fn with_down_hosts(hosts: &[&str]) -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            down: hosts.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LinkChecker for CountingLinkChecker {
    async fn is_reachable(&self, url: &Url) -> bool {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        !url.host_str().map_or(true, |h| self.down.iter().any(|d| d == h))
    }
}

/// Producer wired to in-memory fakes, with handles kept for inspection.
pub struct Harness {
    pub producer: Arc<Producer>,
    pub generator: Arc<ScriptedGenerator>,
    pub checker: Arc<CountingLinkChecker>,
    pub storage: MemoryStorage,
}

impl Harness {
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self::with_config(generator, ProducerConfig::default())
    }

    pub fn with_config(generator: ScriptedGenerator, config: ProducerConfig) -> Self {
        Self::with_storage(generator, config, MemoryStorage::new())
    }

    pub fn with_storage(generator: ScriptedGenerator, config: ProducerConfig, storage: MemoryStorage) -> Self {
        let generator = Arc::new(generator);
        let checker = Arc::new(CountingLinkChecker::default());
        let store: Arc<dyn ProducerStorage> = Arc::new(storage.clone());
        let producer = Arc::new(Producer::new(generator.clone(), store, checker.clone(), config));
        Self {
            producer,
            generator,
            checker,
            storage,
        }
    }
}

pub fn config_with_policy(policy: QualityPolicy) -> ProducerConfig {
    ProducerConfig {
        quality: policy,
        ..ProducerConfig::default()
    }
}

/// Stores `draft` as an already published article owned by `source_key`.
pub async fn publish_foreign(storage: &MemoryStorage, source_key: &str, draft: &ArticleDraft) -> StoredArticle {
    let report = QualityEvaluator::default().evaluate(draft, &Default::default());
    let input = ArticleUpsert {
        source_key: source_key.to_string(),
        topic: "Other".to_string(),
        city: "Elsewhere".to_string(),
        keyword: "other".to_string(),
        title: draft.title.clone(),
        description: draft.description.clone(),
        slug: format!("foreign-{}", draft.slug),
        tags: draft.tags.clone(),
        content: draft.content.clone(),
        source_links: draft.source_links.clone(),
        lastmod: draft.lastmod,
        prompt_version: "v0".to_string(),
        model_version: "seed".to_string(),
        raw_json: serde_json::json!({}),
        quality_report: report,
        content_hash: content_hash(&draft.title, &draft.description, &draft.content),
        structure_signature: build_signature(&draft.content),
        last_error: None,
    };
    let stored = storage.upsert(&input, ContentStatus::Generated).await.unwrap();
    storage.mark_published(&[stored.id]).await.unwrap();
    stored
}
