use locus_core::{ArticleGenerator, ArticleStore, Result, RevisionFeedback};

use crate::assessment::{prepare_draft, Assessment, DraftAssessor};

/// Bounded model-driven revisions within one attempt.
///
/// A draft is revised only while it has no hard failures and scores below
/// the policy minimum. Each revision is reassessed from scratch.
#[derive(Debug, Clone)]
pub struct RevisionLoop {
    max_revisions: u32,
    performed: u32,
}

impl RevisionLoop {
    pub fn new(max_revisions: u32) -> Self {
        Self {
            max_revisions,
            performed: 0,
        }
    }

    pub fn performed(&self) -> u32 {
        self.performed
    }

    pub fn should_revise(&self, assessment: &Assessment) -> bool {
        self.performed < self.max_revisions && assessment.report.is_revisable()
    }

    pub fn feedback(assessment: &Assessment) -> RevisionFeedback {
        RevisionFeedback {
            failure_codes: assessment.report.failure_codes.clone(),
            failure_messages: assessment.report.failure_messages(),
            score: assessment.report.summary(),
        }
    }

    /// Runs one revision. The revision counts against the budget even when
    /// the generator fails.
    pub async fn revise<S: ArticleStore + ?Sized>(
        &mut self,
        generator: &dyn ArticleGenerator,
        assessor: &DraftAssessor<'_, S>,
        current: &Assessment,
        language: &str,
    ) -> Result<Assessment> {
        self.performed += 1;
        let feedback = Self::feedback(current);
        let revised = generator.revise_draft(&current.draft, &feedback, language).await?;
        assessor.assess(prepare_draft(revised)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::prober::{LinkChecker, SourceLinkProber};
    use async_trait::async_trait;
    use chrono::Utc;
    use locus_core::{ArticleDraft, Error, Outline, ProducerRequest};
    use locus_quality::{QualityEvaluator, QualityPolicy};
    use locus_storage::MemoryStorage;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use url::Url;

    #[derive(Debug)]
    struct AlwaysUp;

    #[async_trait]
    impl LinkChecker for AlwaysUp {
        async fn is_reachable(&self, _url: &Url) -> bool {
            true
        }
    }

    /// Adds one evidence note per revision.
    #[derive(Debug, Default)]
    struct NoteAdder {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl ArticleGenerator for NoteAdder {
        fn name(&self) -> &str {
            "note-adder"
        }

        async fn generate_outline(&self, _request: &ProducerRequest, _language: &str) -> Result<Outline> {
            Err(Error::Generator("unused".to_string()))
        }

        async fn generate_draft(
            &self,
            _outline: &Outline,
            _request: &ProducerRequest,
            _language: &str,
        ) -> Result<ArticleDraft> {
            Err(Error::Generator("unused".to_string()))
        }

        async fn revise_draft(
            &self,
            draft: &ArticleDraft,
            feedback: &RevisionFeedback,
            _language: &str,
        ) -> Result<ArticleDraft> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(!feedback.failure_codes.is_empty());
            if self.fail {
                return Err(Error::Generator("model unavailable".to_string()));
            }
            let mut revised = draft.clone();
            revised.evidence_notes.push(format!("Evidence note number {}", n));
            Ok(revised)
        }
    }

    fn draft() -> ArticleDraft {
        let request = ProducerRequest::new("Electronics Recycling", "Austin", "electronics recycling austin");
        let mut draft = crate::fallback::build_fallback(&request, Utc::now(), None);
        draft.evidence_notes.clear();
        draft
    }

    struct Fixture {
        evaluator: QualityEvaluator,
        store: MemoryStorage,
        prober: SourceLinkProber,
    }

    /// Revises the way the orchestrator's revising state does.
    async fn drive(
        revisions: &mut RevisionLoop,
        generator: &dyn ArticleGenerator,
        assessor: &DraftAssessor<'_, MemoryStorage>,
        initial: Assessment,
    ) -> Result<Assessment> {
        let mut current = initial;
        while revisions.should_revise(&current) {
            current = revisions.revise(generator, assessor, &current, "en").await?;
        }
        Ok(current)
    }

    impl Fixture {
        fn new(min_score: u32) -> Self {
            Self {
                evaluator: QualityEvaluator::new(QualityPolicy::default().with_min_score(min_score)),
                store: MemoryStorage::new(),
                prober: SourceLinkProber::new(Arc::new(AlwaysUp), ProbeConfig::default()),
            }
        }

        fn assessor(&self) -> DraftAssessor<'_, MemoryStorage> {
            DraftAssessor::new(&self.evaluator, &self.store, &self.prober)
        }
    }

    #[tokio::test]
    async fn test_stops_as_soon_as_draft_passes() {
        let fixture = Fixture::new(100);
        let assessor = fixture.assessor();
        let initial = assessor.assess(draft()).await.unwrap();
        assert_eq!(initial.report.score_total, 97);
        assert!(initial.report.is_revisable());

        let generator = NoteAdder::default();
        let mut revisions = RevisionLoop::new(5);
        let done = drive(&mut revisions, &generator, &assessor, initial).await.unwrap();
        assert!(done.report.passed);
        assert_eq!(revisions.performed(), 2);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_never_exceeds_budget() {
        let fixture = Fixture::new(100);
        let assessor = fixture.assessor();
        let initial = assessor.assess(draft()).await.unwrap();

        let generator = NoteAdder::default();
        let mut revisions = RevisionLoop::new(1);
        let done = drive(&mut revisions, &generator, &assessor, initial).await.unwrap();
        assert!(!done.report.passed);
        assert_eq!(revisions.performed(), 1);
    }

    #[tokio::test]
    async fn test_passing_draft_is_not_revised() {
        let fixture = Fixture::new(70);
        let assessor = fixture.assessor();
        let initial = assessor.assess(draft()).await.unwrap();
        assert!(initial.report.passed);

        let generator = NoteAdder::default();
        let mut revisions = RevisionLoop::new(3);
        drive(&mut revisions, &generator, &assessor, initial).await.unwrap();
        assert_eq!(revisions.performed(), 0);
    }

    #[tokio::test]
    async fn test_hard_failures_are_not_revised() {
        let fixture = Fixture::new(70);
        let assessor = fixture.assessor();
        let mut bad = draft();
        bad.content.push_str("\n\n诈骗");
        let initial = assessor.assess(bad).await.unwrap();
        assert!(initial.report.hard_failure_count > 0);

        let generator = NoteAdder::default();
        let mut revisions = RevisionLoop::new(3);
        assert!(!revisions.should_revise(&initial));
        drive(&mut revisions, &generator, &assessor, initial).await.unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generator_failure_consumes_budget() {
        let fixture = Fixture::new(100);
        let assessor = fixture.assessor();
        let initial = assessor.assess(draft()).await.unwrap();

        let generator = NoteAdder {
            fail: true,
            ..NoteAdder::default()
        };
        let mut revisions = RevisionLoop::new(3);
        assert!(drive(&mut revisions, &generator, &assessor, initial).await.is_err());
        assert_eq!(revisions.performed(), 1);
    }
}
