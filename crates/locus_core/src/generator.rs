use async_trait::async_trait;
use std::fmt;

use crate::types::{ArticleDraft, Outline, ProducerRequest, ScoreSummary};
use crate::Result;

/// Feedback handed to the generator when a draft needs another pass.
#[derive(Debug, Clone)]
pub struct RevisionFeedback {
    pub failure_codes: Vec<String>,
    pub failure_messages: Vec<String>,
    pub score: ScoreSummary,
}

#[async_trait]
pub trait ArticleGenerator: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Plan the article before drafting it
    async fn generate_outline(&self, request: &ProducerRequest, language: &str) -> Result<Outline>;

    /// Draft a full article conditioned on an outline
    async fn generate_draft(
        &self,
        outline: &Outline,
        request: &ProducerRequest,
        language: &str,
    ) -> Result<ArticleDraft>;

    /// Rewrite a draft addressing the listed quality failures
    async fn revise_draft(
        &self,
        draft: &ArticleDraft,
        feedback: &RevisionFeedback,
        language: &str,
    ) -> Result<ArticleDraft>;
}
