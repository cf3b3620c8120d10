use async_trait::async_trait;
use locus_core::{Error, ProducerStorage, Result};
use std::sync::Arc;

pub mod backends;

pub use backends::*;

#[async_trait]
pub trait StorageBackend: ProducerStorage {
    fn get_error_message() -> &'static str
    where
        Self: Sized;

    async fn connect(url: Option<&str>) -> Result<Self>
    where
        Self: Sized;
}

/// Opens the backend named `kind` ("memory" or, with the `sqlite` feature,
/// "sqlite").
pub async fn create_storage(kind: &str, url: Option<&str>) -> Result<Arc<dyn ProducerStorage>> {
    match kind {
        "memory" => open::<MemoryStorage>(url).await,
        #[cfg(feature = "sqlite")]
        "sqlite" => open::<SQLiteStorage>(url).await,
        other => Err(Error::Storage(format!(
            "unsupported storage backend '{}' (available: {})",
            other,
            available_backends().join(", ")
        ))),
    }
}

async fn open<B: StorageBackend + 'static>(url: Option<&str>) -> Result<Arc<dyn ProducerStorage>> {
    match B::connect(url).await {
        Ok(backend) => Ok(Arc::new(backend)),
        Err(e) => Err(Error::Storage(format!("{} ({})", B::get_error_message(), e))),
    }
}

pub fn available_backends() -> Vec<&'static str> {
    let mut backends = vec!["memory"];
    if cfg!(feature = "sqlite") {
        backends.push("sqlite");
    }
    backends
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageBackend};
}
