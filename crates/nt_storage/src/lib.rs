use std::sync::Arc;

use async_trait::async_trait;
use nt_core::{ContentStore, Result};

pub mod backends;

pub use backends::*;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn get_error_message() -> &'static str;
    async fn new() -> Result<Self> where Self: Sized;
}

/// Build a content store by name. `backend_url` is the database path for
/// SQLite and ignored by the memory backend.
pub async fn create_storage(kind: &str, backend_url: Option<&str>) -> Result<Arc<dyn ContentStore>> {
    match kind {
        "memory" => Ok(Arc::new(InMemoryStorage::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let storage = match backend_url {
                Some(path) => SQLiteStorage::new_with_path(std::path::Path::new(path)).await?,
                None => <SQLiteStorage as StorageBackend>::new().await?,
            };
            Ok(Arc::new(storage))
        }
        other => {
            let _ = backend_url;
            Err(nt_core::Error::Storage(format!(
                "Unknown storage backend '{}' (available: {})",
                other,
                available_backends().join(", ")
            )))
        }
    }
}

pub fn available_backends() -> Vec<&'static str> {
    let mut names = vec!["memory"];
    if cfg!(feature = "sqlite") {
        names.push("sqlite");
    }
    names
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageBackend};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_storage() {
        let storage = create_storage("memory", None).await.unwrap();
        assert!(storage.list_processed(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let err = create_storage("qdrant", None).await.err().unwrap();
        assert!(err.to_string().contains("Unknown storage backend"));
    }
}
