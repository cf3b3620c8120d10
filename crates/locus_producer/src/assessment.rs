use locus_core::{normalize_tags, validate_draft, ArticleDraft, ArticleStore, QualityReport, Result};
use locus_quality::{build_signature, is_scored, EvaluationContext, QualityEvaluator};

use crate::prober::SourceLinkProber;
use crate::sources::ensure_sources_section;

/// A draft together with the report computed from exactly this draft.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub draft: ArticleDraft,
    pub report: QualityReport,
    pub signature: String,
}

/// Schema gate for generator output. Tags are trimmed and deduplicated.
pub fn prepare_draft(mut draft: ArticleDraft) -> Result<ArticleDraft> {
    draft.tags = normalize_tags(&draft.tags);
    validate_draft(&draft)?;
    Ok(draft)
}

/// Normalizes a draft, measures the facts the evaluator needs and scores it.
/// Every mutation happens before evaluation, so the report always describes
/// the draft it is returned with.
pub struct DraftAssessor<'a, S: ArticleStore + ?Sized> {
    evaluator: &'a QualityEvaluator,
    store: &'a S,
    prober: &'a SourceLinkProber,
}

impl<'a, S: ArticleStore + ?Sized> DraftAssessor<'a, S> {
    pub fn new(evaluator: &'a QualityEvaluator, store: &'a S, prober: &'a SourceLinkProber) -> Self {
        Self {
            evaluator,
            store,
            prober,
        }
    }

    pub fn evaluator(&self) -> &QualityEvaluator {
        self.evaluator
    }

    pub async fn assess(&self, mut draft: ArticleDraft) -> Result<Assessment> {
        ensure_sources_section(&mut draft);

        let signature = build_signature(&draft.content);
        let duplicated_structure_count = if is_scored(&signature) {
            Some(self.store.count_published_with_signature(&signature).await?)
        } else {
            None
        };
        let reachable_source_links = self.prober.probe(&draft.source_links).await.len();

        let context = EvaluationContext {
            reachable_source_links,
            duplicated_structure_count,
        };
        let report = self.evaluator.evaluate(&draft, &context);
        Ok(Assessment {
            draft,
            report,
            signature,
        })
    }
}
