use crate::error::{AppError, Result};
use crate::state::query::{self, SearchHits, SearchQuery};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque proof that a document is unchanged since it was read.
///
/// Tokens are unique across the whole store, so a token read before a
/// delete never matches a document recreated under the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcurrencyToken(u64);

impl ConcurrencyToken {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub(crate) fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// A stored document together with its current token
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedDocument {
    pub id: String,
    pub token: ConcurrencyToken,
    pub body: Value,
}

/// Versioned document storage with conditioned writes
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name used in logs and metrics
    fn backend_name(&self) -> &'static str;

    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Create a collection; `AlreadyExists` if it is already there
    async fn create_collection(&self, collection: &str) -> Result<()>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<VersionedDocument>>;

    /// Fetch the documents that exist among `ids`, in request order
    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<VersionedDocument>>;

    /// Insert a new document; `AlreadyExists` if the id is taken
    async fn create(&self, collection: &str, id: &str, body: Value) -> Result<ConcurrencyToken>;

    /// Replace a document if `token` is current.
    ///
    /// Stale tokens fail with `ConcurrencyConflict`, missing documents with
    /// `NotFound`.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        token: ConcurrencyToken,
    ) -> Result<ConcurrencyToken>;

    /// Remove a document; `false` if it did not exist
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    async fn search(&self, collection: &str, query: &SearchQuery) -> Result<SearchHits>;
}

#[derive(Debug, Clone)]
struct StoredDocument {
    token: ConcurrencyToken,
    body: Value,
}

type Collection = Arc<DashMap<String, StoredDocument>>;

/// In-memory document store (for development and testing)
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<DashMap<String, Collection>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_token(&self) -> ConcurrencyToken {
        ConcurrencyToken::from_raw(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn collection(&self, name: &str) -> Result<Collection> {
        self.collections
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("Collection {} not found", name)))
    }

    fn versioned(id: &str, doc: &StoredDocument) -> VersionedDocument {
        VersionedDocument {
            id: id.to_string(),
            token: doc.token,
            body: doc.body.clone(),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.contains_key(collection))
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        match self.collections.entry(collection.to_string()) {
            Entry::Occupied(_) => Err(AppError::AlreadyExists(format!(
                "Collection {} already exists",
                collection
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(DashMap::new()));
                tracing::debug!(collection, "Collection created");
                Ok(())
            }
        }
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<VersionedDocument>> {
        let docs = self.collection(collection)?;
        let found = docs.get(id).map(|entry| Self::versioned(id, entry.value()));
        Ok(found)
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<VersionedDocument>> {
        let docs = self.collection(collection)?;
        Ok(ids
            .iter()
            .filter_map(|id| docs.get(id).map(|entry| Self::versioned(id, entry.value())))
            .collect())
    }

    async fn create(&self, collection: &str, id: &str, body: Value) -> Result<ConcurrencyToken> {
        let docs = self.collection(collection)?;
        let created = match docs.entry(id.to_string()) {
            Entry::Occupied(_) => Err(AppError::AlreadyExists(format!(
                "Document {}/{} already exists",
                collection, id
            ))),
            Entry::Vacant(slot) => {
                let token = self.next_token();
                slot.insert(StoredDocument { token, body });
                tracing::debug!(collection, id, %token, "Document created");
                Ok(token)
            }
        };
        created
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        token: ConcurrencyToken,
    ) -> Result<ConcurrencyToken> {
        let docs = self.collection(collection)?;
        // The shard write lock held by get_mut makes the check-and-set atomic
        let mut entry = docs.get_mut(id).ok_or_else(|| {
            AppError::NotFound(format!("Document {}/{} not found", collection, id))
        })?;

        if entry.token != token {
            return Err(AppError::ConcurrencyConflict(format!(
                "Document {}/{} changed (expected {}, found {})",
                collection, id, token, entry.token
            )));
        }

        let next = self.next_token();
        entry.token = next;
        entry.body = body;
        tracing::debug!(collection, id, token = %next, "Document updated");
        Ok(next)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let docs = self.collection(collection)?;
        let removed = docs.remove(id).is_some();
        if removed {
            tracing::debug!(collection, id, "Document deleted");
        }
        Ok(removed)
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> Result<SearchHits> {
        let docs = self.collection(collection)?;
        let all: Vec<VersionedDocument> = docs
            .iter()
            .map(|entry| Self::versioned(entry.key(), entry.value()))
            .collect();
        Ok(query::execute(query, all))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_with_collection() -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        store.create_collection("docs").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = store_with_collection().await;

        let token = store.create("docs", "a", json!({"n": 1})).await.unwrap();
        let doc = store.get("docs", "a").await.unwrap().unwrap();

        assert_eq!(doc.token, token);
        assert_eq!(doc.body["n"], 1);
        assert!(store.get("docs", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = store_with_collection().await;
        store.create("docs", "a", json!({})).await.unwrap();

        let err = store.create("docs", "a", json!({})).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_requires_current_token() {
        let store = store_with_collection().await;
        let first = store.create("docs", "a", json!({"n": 1})).await.unwrap();

        let second = store
            .update("docs", "a", json!({"n": 2}), first)
            .await
            .unwrap();
        assert_ne!(first, second);

        let err = store
            .update("docs", "a", json!({"n": 3}), first)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConcurrencyConflict(_)));

        let doc = store.get("docs", "a").await.unwrap().unwrap();
        assert_eq!(doc.body["n"], 2);
    }

    #[tokio::test]
    async fn test_token_not_reused_after_recreate() {
        let store = store_with_collection().await;
        let old = store.create("docs", "a", json!({})).await.unwrap();
        assert!(store.delete("docs", "a").await.unwrap());
        store.create("docs", "a", json!({})).await.unwrap();

        let err = store.update("docs", "a", json!({}), old).await.unwrap_err();
        assert!(matches!(err, AppError::ConcurrencyConflict(_)));
    }

    #[tokio::test]
    async fn test_missing_collection_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store.get("nope", "a").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_reports_absence() {
        let store = store_with_collection().await;
        assert!(!store.delete("docs", "ghost").await.unwrap());
    }
}
