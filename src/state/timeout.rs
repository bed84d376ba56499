use crate::error::{AppError, Result};
use crate::metrics::{STORAGE_OPERATIONS_TOTAL, STORAGE_OPERATION_DURATION_SECONDS};
use crate::settings::SettingsHandle;
use crate::state::query::{SearchHits, SearchQuery};
use crate::state::{ConcurrencyToken, DocumentStore, VersionedDocument};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Bounds every store call by the configured operation timeout.
///
/// The timeout is read from the live settings on each call, so cluster
/// overrides take effect without rebuilding the store. Elapsed calls fail
/// with `AppError::Timeout`; they are not retried.
pub struct TimeoutDocumentStore {
    inner: Arc<dyn DocumentStore>,
    settings: SettingsHandle,
}

impl TimeoutDocumentStore {
    pub fn new(inner: Arc<dyn DocumentStore>, settings: SettingsHandle) -> Self {
        Self { inner, settings }
    }

    async fn bounded<T, F>(&self, operation: &'static str, collection: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let limit = self.settings.snapshot().operation_timeout;
        let backend = self.inner.backend_name();
        let start = Instant::now();

        let outcome = tokio::time::timeout(limit, fut).await;

        STORAGE_OPERATIONS_TOTAL
            .with_label_values(&[operation, backend])
            .inc();
        STORAGE_OPERATION_DURATION_SECONDS
            .with_label_values(&[operation, backend])
            .observe(start.elapsed().as_secs_f64());

        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    operation,
                    collection,
                    backend,
                    timeout_ms = limit.as_millis() as u64,
                    "Store operation timed out"
                );
                Err(AppError::Timeout(format!(
                    "{} on {} exceeded {}ms",
                    operation,
                    collection,
                    limit.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl DocumentStore for TimeoutDocumentStore {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        self.bounded(
            "collection_exists",
            collection,
            self.inner.collection_exists(collection),
        )
        .await
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        self.bounded(
            "create_collection",
            collection,
            self.inner.create_collection(collection),
        )
        .await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<VersionedDocument>> {
        self.bounded("get", collection, self.inner.get(collection, id))
            .await
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<VersionedDocument>> {
        self.bounded("get_many", collection, self.inner.get_many(collection, ids))
            .await
    }

    async fn create(&self, collection: &str, id: &str, body: Value) -> Result<ConcurrencyToken> {
        self.bounded("create", collection, self.inner.create(collection, id, body))
            .await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        token: ConcurrencyToken,
    ) -> Result<ConcurrencyToken> {
        self.bounded(
            "update",
            collection,
            self.inner.update(collection, id, body, token),
        )
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        self.bounded("delete", collection, self.inner.delete(collection, id))
            .await
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> Result<SearchHits> {
        self.bounded("search", collection, self.inner.search(collection, query))
            .await
    }
}
