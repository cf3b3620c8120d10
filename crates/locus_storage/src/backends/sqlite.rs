use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use locus_core::{
    ArticleStore, ArticleUpsert, ContentStatus, Error, PipelineLock, PipelineRunRecord, Result, RunLedger,
    StoredArticle,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::StorageBackend;

const DEFAULT_DB_PATH: &str = "locus.db";

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_key TEXT NOT NULL UNIQUE,
        topic TEXT NOT NULL,
        city TEXT NOT NULL,
        keyword TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        slug TEXT NOT NULL,
        tags TEXT NOT NULL,
        content TEXT NOT NULL,
        source_links TEXT NOT NULL,
        lastmod TEXT NOT NULL,
        prompt_version TEXT NOT NULL,
        model_version TEXT NOT NULL,
        raw_json TEXT NOT NULL,
        quality_report TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        structure_signature TEXT NOT NULL,
        status TEXT NOT NULL,
        last_error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        published_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_content_hash ON articles (content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_articles_signature ON articles (structure_signature, status)",
    r#"
    CREATE TABLE IF NOT EXISTS pipeline_runs (
        run_id TEXT PRIMARY KEY,
        mode TEXT NOT NULL,
        source_key TEXT NOT NULL,
        status TEXT NOT NULL,
        counters TEXT NOT NULL,
        error_message TEXT,
        started_at TEXT NOT NULL,
        ended_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pipeline_locks (
        lock_key TEXT PRIMARY KEY,
        holder TEXT NOT NULL,
        expires_at_ms INTEGER NOT NULL
    )
    "#,
];

pub struct SQLiteStorage {
    pool: Arc<SqlitePool>,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be writable at the configured path"
    }

    async fn connect(url: Option<&str>) -> Result<Self> {
        let path = url
            .map(|u| u.trim_start_matches("sqlite://").trim_start_matches("sqlite:"))
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_DB_PATH);
        Self::new_with_path(&PathBuf::from(path)).await
    }
}

fn db_error(context: &str) -> impl Fn(sqlx::Error) -> Error + '_ {
    move |e| Error::Database(format!("{}: {}", context, e))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("Failed to parse date '{}': {}", value, e)))
}

fn parse_optional_time(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_time).transpose()
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(db_error("Failed to connect to database"))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }
        tracing::debug!(path = %db_path.display(), migrations = MIGRATIONS.len(), "sqlite storage ready");

        Ok(Self {
            pool: Arc::new(pool),
            db_path: db_path.clone(),
        })
    }

    pub fn get_db_path(&self) -> &PathBuf {
        &self.db_path
    }

    fn row_to_article(row: &SqliteRow) -> Result<StoredArticle> {
        let status: String = row.get("status");
        Ok(StoredArticle {
            id: row.get("id"),
            source_key: row.get("source_key"),
            topic: row.get("topic"),
            city: row.get("city"),
            keyword: row.get("keyword"),
            title: row.get("title"),
            description: row.get("description"),
            slug: row.get("slug"),
            tags: serde_json::from_str(row.get::<&str, _>("tags"))?,
            content: row.get("content"),
            source_links: serde_json::from_str(row.get::<&str, _>("source_links"))?,
            lastmod: parse_time(row.get::<&str, _>("lastmod"))?,
            prompt_version: row.get("prompt_version"),
            model_version: row.get("model_version"),
            raw_json: serde_json::from_str(row.get::<&str, _>("raw_json"))?,
            quality_report: serde_json::from_str(row.get::<&str, _>("quality_report"))?,
            content_hash: row.get("content_hash"),
            structure_signature: row.get("structure_signature"),
            status: status.parse()?,
            last_error: row.get("last_error"),
            created_at: parse_time(row.get::<&str, _>("created_at"))?,
            updated_at: parse_time(row.get::<&str, _>("updated_at"))?,
            published_at: parse_optional_time(row.get("published_at"))?,
        })
    }

    async fn fetch_by_source_key(&self, source_key: &str) -> Result<StoredArticle> {
        let row = sqlx::query("SELECT * FROM articles WHERE source_key = ?")
            .bind(source_key)
            .fetch_one(&*self.pool)
            .await
            .map_err(db_error("Failed to load article"))?;
        Self::row_to_article(&row)
    }
}

#[async_trait]
impl ArticleStore for SQLiteStorage {
    async fn find_by_content_hash(&self, hash: &str) -> Result<Option<StoredArticle>> {
        let row = sqlx::query("SELECT * FROM articles WHERE content_hash = ? AND status != ? LIMIT 1")
            .bind(hash)
            .bind(ContentStatus::Failed.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(db_error("Failed to find article by hash"))?;
        row.as_ref().map(Self::row_to_article).transpose()
    }

    async fn find_by_source_key(&self, source_key: &str) -> Result<Option<StoredArticle>> {
        let row = sqlx::query("SELECT * FROM articles WHERE source_key = ?")
            .bind(source_key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(db_error("Failed to find article by source key"))?;
        row.as_ref().map(Self::row_to_article).transpose()
    }

    async fn upsert(&self, input: &ArticleUpsert, status: ContentStatus) -> Result<StoredArticle> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO articles
            (source_key, topic, city, keyword, title, description, slug, tags, content, source_links,
             lastmod, prompt_version, model_version, raw_json, quality_report, content_hash,
             structure_signature, status, last_error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_key) DO UPDATE SET
                topic = excluded.topic,
                city = excluded.city,
                keyword = excluded.keyword,
                title = excluded.title,
                description = excluded.description,
                slug = excluded.slug,
                tags = excluded.tags,
                content = excluded.content,
                source_links = excluded.source_links,
                lastmod = excluded.lastmod,
                prompt_version = excluded.prompt_version,
                model_version = excluded.model_version,
                raw_json = excluded.raw_json,
                quality_report = excluded.quality_report,
                content_hash = excluded.content_hash,
                structure_signature = excluded.structure_signature,
                status = excluded.status,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at,
                published_at = NULL
            "#,
        )
        .bind(&input.source_key)
        .bind(&input.topic)
        .bind(&input.city)
        .bind(&input.keyword)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.slug)
        .bind(serde_json::to_string(&input.tags)?)
        .bind(&input.content)
        .bind(serde_json::to_string(&input.source_links)?)
        .bind(input.lastmod.to_rfc3339())
        .bind(&input.prompt_version)
        .bind(&input.model_version)
        .bind(serde_json::to_string(&input.raw_json)?)
        .bind(serde_json::to_string(&input.quality_report)?)
        .bind(&input.content_hash)
        .bind(&input.structure_signature)
        .bind(status.as_str())
        .bind(input.last_error.as_deref())
        .bind(&now)
        .bind(&now)
        .execute(&*self.pool)
        .await
        .map_err(db_error("Failed to upsert article"))?;

        self.fetch_by_source_key(&input.source_key).await
    }

    async fn mark_published(&self, ids: &[i64]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        for id in ids {
            sqlx::query(
                "UPDATE articles SET status = ?, published_at = ?, updated_at = ?, last_error = NULL WHERE id = ?",
            )
            .bind(ContentStatus::Published.as_str())
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(db_error("Failed to mark article published"))?;
        }
        Ok(())
    }

    async fn count_published_with_signature(&self, signature: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM articles WHERE status = ? AND structure_signature = ?",
        )
        .bind(ContentStatus::Published.as_str())
        .bind(signature)
        .fetch_one(&*self.pool)
        .await
        .map_err(db_error("Failed to count signatures"))?;
        Ok(count.max(0) as u64)
    }

    async fn count_published(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE status = ?")
            .bind(ContentStatus::Published.as_str())
            .fetch_one(&*self.pool)
            .await
            .map_err(db_error("Failed to count published articles"))?;
        Ok(count.max(0) as u64)
    }

    async fn sample_published(&self, limit: usize) -> Result<Vec<StoredArticle>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM articles
            WHERE status = ?
            ORDER BY published_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(ContentStatus::Published.as_str())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(db_error("Failed to sample published articles"))?;

        rows.iter().map(Self::row_to_article).collect()
    }
}

#[async_trait]
impl RunLedger for SQLiteStorage {
    async fn start_run(&self, record: &PipelineRunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (run_id, mode, source_key, status, counters, error_message, started_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.run_id)
        .bind(record.mode.as_str())
        .bind(&record.source_key)
        .bind(record.status.as_str())
        .bind(serde_json::to_string(&record.counters)?)
        .bind(record.error_message.as_deref())
        .bind(record.started_at.to_rfc3339())
        .execute(&*self.pool)
        .await
        .map_err(db_error("Failed to start run"))?;
        Ok(())
    }

    async fn finish_run(&self, record: &PipelineRunRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET status = ?, counters = ?, error_message = ?, ended_at = ?
            WHERE run_id = ?
            "#,
        )
        .bind(record.status.as_str())
        .bind(serde_json::to_string(&record.counters)?)
        .bind(record.error_message.as_deref())
        .bind(record.ended_at.map(|t| t.to_rfc3339()))
        .bind(&record.run_id)
        .execute(&*self.pool)
        .await
        .map_err(db_error("Failed to finish run"))?;

        if result.rows_affected() == 0 {
            return Err(Error::Storage(format!("run {} was never started", record.run_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineLock for SQLiteStorage {
    async fn try_acquire(&self, key: &str, holder: &str, lease: Duration) -> Result<bool> {
        let now_ms = Utc::now().timestamp_millis();
        let expires_ms = now_ms.saturating_add(lease.as_millis().min(i64::MAX as u128) as i64);
        let result = sqlx::query(
            r#"
            INSERT INTO pipeline_locks (lock_key, holder, expires_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(lock_key) DO UPDATE SET
                holder = excluded.holder,
                expires_at_ms = excluded.expires_at_ms
            WHERE pipeline_locks.expires_at_ms <= ? OR pipeline_locks.holder = excluded.holder
            "#,
        )
        .bind(key)
        .bind(holder)
        .bind(expires_ms)
        .bind(now_ms)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Lock(format!("Failed to acquire {}: {}", key, e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, key: &str, holder: &str) -> Result<()> {
        sqlx::query("DELETE FROM pipeline_locks WHERE lock_key = ? AND holder = ?")
            .bind(key)
            .bind(holder)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Lock(format!("Failed to release {}: {}", key, e)))?;
        Ok(())
    }
}

impl SQLiteStorage {
    /// Lease expiry for `key`, if anyone holds it.
    pub async fn lock_expiry(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let expires: Option<i64> = sqlx::query_scalar("SELECT expires_at_ms FROM pipeline_locks WHERE lock_key = ?")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(db_error("Failed to read lock"))?;
        Ok(expires.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::tests::sample_input;
    use locus_core::{RunMode, RunStatus};
    use tempfile::tempdir;

    async fn open() -> (SQLiteStorage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&dir.path().join("test.db")).await.unwrap();
        (storage, dir)
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let (storage, _dir) = open().await;
        let created = storage.upsert(&sample_input("a::b::c", "hash1"), ContentStatus::Generated).await.unwrap();
        assert_eq!(created.status, ContentStatus::Generated);
        assert_eq!(created.tags, vec!["test", "storage"]);

        let found = storage.find_by_content_hash("hash1").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.quality_report.score_total, 95);
        assert_eq!(found.raw_json["sample"], true);
    }

    #[tokio::test]
    async fn test_failed_rows_do_not_own_hashes() {
        let (storage, _dir) = open().await;
        let mut input = sample_input("rejected", "shared");
        input.last_error = Some("quality gate missed".to_string());
        storage.upsert(&input, ContentStatus::Failed).await.unwrap();
        assert!(storage.find_by_content_hash("shared").await.unwrap().is_none());

        let owner = storage.upsert(&sample_input("owner", "shared"), ContentStatus::Generated).await.unwrap();
        assert_eq!(storage.find_by_content_hash("shared").await.unwrap().unwrap().id, owner.id);

        let failed = storage.find_by_source_key("rejected").await.unwrap().unwrap();
        assert_eq!(failed.status, ContentStatus::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("quality gate missed"));
    }

    #[tokio::test]
    async fn test_upsert_same_source_key_keeps_id() {
        let (storage, _dir) = open().await;
        let first = storage.upsert(&sample_input("same", "h1"), ContentStatus::Generated).await.unwrap();
        let second = storage.upsert(&sample_input("same", "h2"), ContentStatus::Generated).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.content_hash, "h2");
        assert!(storage.find_by_content_hash("h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_and_signature_count() {
        let (storage, _dir) = open().await;
        let a = storage.upsert(&sample_input("a", "ha"), ContentStatus::Generated).await.unwrap();
        let b = storage.upsert(&sample_input("b", "hb"), ContentStatus::Generated).await.unwrap();
        storage.mark_published(&[a.id, b.id]).await.unwrap();

        assert_eq!(storage.count_published_with_signature("## h2 a|## sources").await.unwrap(), 2);
        assert_eq!(storage.count_published_with_signature("## other").await.unwrap(), 0);

        assert_eq!(storage.count_published().await.unwrap(), 2);
        let sample = storage.sample_published(1).await.unwrap();
        assert_eq!(sample.len(), 1);
        assert!(sample[0].published_at.is_some());
    }

    #[tokio::test]
    async fn test_lock_contention() {
        let (storage, _dir) = open().await;
        let lease = Duration::from_secs(60);
        assert!(storage.try_acquire("pipeline", "one", lease).await.unwrap());
        assert!(!storage.try_acquire("pipeline", "two", lease).await.unwrap());
        assert!(storage.try_acquire("pipeline", "one", lease).await.unwrap());
        assert!(storage.lock_expiry("pipeline").await.unwrap().is_some());

        storage.release("pipeline", "one").await.unwrap();
        assert!(storage.lock_expiry("pipeline").await.unwrap().is_none());
        assert!(storage.try_acquire("pipeline", "two", lease).await.unwrap());
    }

    #[tokio::test]
    async fn test_run_ledger_round_trip() {
        let (storage, _dir) = open().await;
        let mut record = PipelineRunRecord::start("run-1", RunMode::Batch, "a::b::c");
        storage.start_run(&record).await.unwrap();
        record.finish(RunStatus::Failed, Some("boom".to_string()));
        storage.finish_run(&record).await.unwrap();

        let missing = PipelineRunRecord::start("run-2", RunMode::Once, "x");
        assert!(storage.finish_run(&missing).await.is_err());
    }
}
