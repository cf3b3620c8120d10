pub mod error;
pub mod generator;
pub mod hash;
pub mod schema;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use generator::{ArticleGenerator, RevisionFeedback};
pub use hash::{content_hash, slugify, source_key};
pub use schema::{normalize_tags, validate_draft, validate_outline};
pub use storage::{ArticleStore, PipelineLock, ProducerStorage, RunLedger};
pub use types::*;

pub mod prelude {
    pub use super::{ArticleDraft, ArticleGenerator, ArticleStore, Error, Outline, ProducerRequest, QualityReport, Result};
}
