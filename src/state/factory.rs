use crate::config::{StateBackend, StateConfig};
use crate::error::{AppError, Result};
use crate::settings::SettingsHandle;
use crate::state::{DocumentStore, InMemoryDocumentStore, SledDocumentStore, TimeoutDocumentStore};
use std::sync::Arc;

/// Create a document store based on configuration.
///
/// The backend is wrapped so every call honors the operation timeout.
pub fn create_store(config: &StateConfig, settings: SettingsHandle) -> Result<Arc<dyn DocumentStore>> {
    let backend: Arc<dyn DocumentStore> = match config.backend {
        StateBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                AppError::Configuration("Sled backend requires 'path' configuration".to_string())
            })?;

            tracing::info!(path = ?path, "Initializing Sled storage backend");
            Arc::new(SledDocumentStore::new(path)?)
        }
        StateBackend::Memory => create_in_memory_store(),
    };

    Ok(Arc::new(TimeoutDocumentStore::new(backend, settings)))
}

/// Create an in-memory store (for testing and development)
pub fn create_in_memory_store() -> Arc<dyn DocumentStore> {
    tracing::info!("Initializing in-memory storage backend");
    Arc::new(InMemoryDocumentStore::new())
}
