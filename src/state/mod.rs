pub mod factory;
pub mod query;
pub mod sled_store;
pub mod store;
pub mod timeout;

pub use factory::{create_in_memory_store, create_store};
pub use query::{Filter, SearchHits, SearchQuery, SortOrder, SortSpec};
pub use sled_store::SledDocumentStore;
pub use store::*;
pub use timeout::TimeoutDocumentStore;

use crate::error::{AppError, Result};

/// Make sure a collection exists.
///
/// Safe to call from many tasks at once: losing the creation race to
/// another caller counts as success. Returns `true` if this call created it.
pub async fn ensure_collection(store: &dyn DocumentStore, collection: &str) -> Result<bool> {
    if store.collection_exists(collection).await? {
        return Ok(false);
    }

    match store.create_collection(collection).await {
        Ok(()) => {
            tracing::info!(collection, backend = store.backend_name(), "Created collection");
            Ok(true)
        }
        Err(AppError::AlreadyExists(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
