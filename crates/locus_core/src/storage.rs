use async_trait::async_trait;
use std::time::Duration;

use crate::types::{ArticleUpsert, ContentStatus, PipelineRunRecord, StoredArticle};
use crate::Result;

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Find the article currently owning a content hash. Failed records never
    /// own a hash.
    async fn find_by_content_hash(&self, hash: &str) -> Result<Option<StoredArticle>>;

    async fn find_by_source_key(&self, source_key: &str) -> Result<Option<StoredArticle>>;

    /// Insert or update the article owned by `input.source_key`
    async fn upsert(&self, input: &ArticleUpsert, status: ContentStatus) -> Result<StoredArticle>;

    /// Move articles to the published state
    async fn mark_published(&self, ids: &[i64]) -> Result<()>;

    /// Count published articles sharing a structure signature
    async fn count_published_with_signature(&self, signature: &str) -> Result<u64>;

    async fn count_published(&self) -> Result<u64>;

    /// Most recently published articles, newest first
    async fn sample_published(&self, limit: usize) -> Result<Vec<StoredArticle>>;
}

#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn start_run(&self, record: &PipelineRunRecord) -> Result<()>;

    async fn finish_run(&self, record: &PipelineRunRecord) -> Result<()>;
}

/// Lease-based mutual exclusion between scheduled runs.
#[async_trait]
pub trait PipelineLock: Send + Sync {
    /// Acquires `key` for `holder` when it is free, expired or already held
    /// by `holder`. Returns false when another holder has a live lease.
    async fn try_acquire(&self, key: &str, holder: &str, lease: Duration) -> Result<bool>;

    async fn release(&self, key: &str, holder: &str) -> Result<()>;
}

/// Everything the producer needs from storage.
pub trait ProducerStorage: ArticleStore + RunLedger + PipelineLock {}

impl<T: ArticleStore + RunLedger + PipelineLock> ProducerStorage for T {}
