use async_trait::async_trait;
use chrono::{DateTime, Utc};
use locus_core::{
    ArticleStore, ArticleUpsert, ContentStatus, Error, PipelineLock, PipelineRunRecord, Result, RunLedger,
    StoredArticle,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::StorageBackend;

#[derive(Debug, Clone)]
struct Lease {
    holder: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    next_id: i64,
    articles: Vec<StoredArticle>,
    runs: HashMap<String, PipelineRunRecord>,
    locks: HashMap<String, Lease>,
}

impl MemoryStore {
    pub fn upsert(&mut self, input: &ArticleUpsert, status: ContentStatus) -> StoredArticle {
        let now = Utc::now();
        if let Some(existing) = self.articles.iter_mut().find(|a| a.source_key == input.source_key) {
            *existing = StoredArticle::from_upsert(existing.id, input, status, existing.created_at, now);
            return existing.clone();
        }

        self.next_id += 1;
        let article = StoredArticle::from_upsert(self.next_id, input, status, now, now);
        self.articles.push(article.clone());
        article
    }

    pub fn find_by_content_hash(&self, hash: &str) -> Option<StoredArticle> {
        self.articles
            .iter()
            .find(|a| a.content_hash == hash && a.status != ContentStatus::Failed)
            .cloned()
    }

    pub fn find_by_source_key(&self, source_key: &str) -> Option<StoredArticle> {
        self.articles.iter().find(|a| a.source_key == source_key).cloned()
    }

    pub fn mark_published(&mut self, ids: &[i64]) {
        let now = Utc::now();
        for article in self.articles.iter_mut().filter(|a| ids.contains(&a.id)) {
            article.status = ContentStatus::Published;
            article.published_at = Some(now);
            article.last_error = None;
            article.updated_at = now;
        }
    }

    pub fn count_published_with_signature(&self, signature: &str) -> u64 {
        self.articles
            .iter()
            .filter(|a| a.status == ContentStatus::Published && a.structure_signature == signature)
            .count() as u64
    }

    pub fn count_published(&self) -> u64 {
        self.articles.iter().filter(|a| a.status == ContentStatus::Published).count() as u64
    }

    pub fn sample_published(&self, limit: usize) -> Vec<StoredArticle> {
        let mut published: Vec<StoredArticle> = self
            .articles
            .iter()
            .filter(|a| a.status == ContentStatus::Published)
            .cloned()
            .collect();
        published.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)));
        published.truncate(limit);
        published
    }

    pub fn try_acquire(&mut self, key: &str, holder: &str, lease: Duration) -> Result<bool> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease).map_err(|e| Error::Lock(format!("invalid lease: {}", e)))?;
        match self.locks.get(key) {
            Some(current) if current.holder != holder && current.expires_at > now => {
                tracing::debug!(key, holder, current = %current.holder, "lock held elsewhere");
                Ok(false)
            }
            _ => {
                self.locks.insert(
                    key.to_string(),
                    Lease {
                        holder: holder.to_string(),
                        expires_at: now + lease,
                    },
                );
                Ok(true)
            }
        }
    }

    pub fn release(&mut self, key: &str, holder: &str) {
        if self.locks.get(key).map_or(false, |l| l.holder == holder) {
            self.locks.remove(key);
        }
    }

    pub fn run(&self, run_id: &str) -> Option<&PipelineRunRecord> {
        self.runs.get(run_id)
    }

    pub fn articles(&self) -> &[StoredArticle] {
        &self.articles
    }
}

/// Process-local storage. Data lives as long as the value does.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn articles(&self) -> Vec<StoredArticle> {
        self.store.read().await.articles().to_vec()
    }

    pub async fn run(&self, run_id: &str) -> Option<PipelineRunRecord> {
        self.store.read().await.run(run_id).cloned()
    }

    pub async fn runs(&self) -> Vec<PipelineRunRecord> {
        let store = self.store.read().await;
        let mut runs: Vec<PipelineRunRecord> = store.runs.values().cloned().collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        runs
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should be available"
    }

    async fn connect(_url: Option<&str>) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStore for MemoryStorage {
    async fn find_by_content_hash(&self, hash: &str) -> Result<Option<StoredArticle>> {
        Ok(self.store.read().await.find_by_content_hash(hash))
    }

    async fn find_by_source_key(&self, source_key: &str) -> Result<Option<StoredArticle>> {
        Ok(self.store.read().await.find_by_source_key(source_key))
    }

    async fn upsert(&self, input: &ArticleUpsert, status: ContentStatus) -> Result<StoredArticle> {
        Ok(self.store.write().await.upsert(input, status))
    }

    async fn mark_published(&self, ids: &[i64]) -> Result<()> {
        self.store.write().await.mark_published(ids);
        Ok(())
    }

    async fn count_published_with_signature(&self, signature: &str) -> Result<u64> {
        Ok(self.store.read().await.count_published_with_signature(signature))
    }

    async fn count_published(&self) -> Result<u64> {
        Ok(self.store.read().await.count_published())
    }

    async fn sample_published(&self, limit: usize) -> Result<Vec<StoredArticle>> {
        Ok(self.store.read().await.sample_published(limit))
    }
}

#[async_trait]
impl RunLedger for MemoryStorage {
    async fn start_run(&self, record: &PipelineRunRecord) -> Result<()> {
        let mut store = self.store.write().await;
        if store.runs.contains_key(&record.run_id) {
            return Err(Error::Storage(format!("run {} already started", record.run_id)));
        }
        store.runs.insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    async fn finish_run(&self, record: &PipelineRunRecord) -> Result<()> {
        let mut store = self.store.write().await;
        match store.runs.get_mut(&record.run_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(Error::Storage(format!("run {} was never started", record.run_id))),
        }
    }
}

#[async_trait]
impl PipelineLock for MemoryStorage {
    async fn try_acquire(&self, key: &str, holder: &str, lease: Duration) -> Result<bool> {
        self.store.write().await.try_acquire(key, holder, lease)
    }

    async fn release(&self, key: &str, holder: &str) -> Result<()> {
        self.store.write().await.release(key, holder);
        Ok(())
    }
}
