use crate::error::{AppError, Result};
use crate::state::query::{self, SearchHits, SearchQuery};
use crate::state::{ConcurrencyToken, DocumentStore, VersionedDocument};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::{Db, IVec, Tree};
use std::path::Path;
use std::sync::Arc;

const COLLECTIONS_TREE: &str = "__collections";

/// On-disk envelope: the version plus the JSON body bytes
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u64,
    body: Vec<u8>,
}

/// Persistent document store using Sled embedded database
#[derive(Clone)]
pub struct SledDocumentStore {
    db: Arc<Db>,
    collections_tree: Tree,
}

impl SledDocumentStore {
    /// Open (or create) a store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            AppError::StorageUnavailable(format!("Failed to open Sled database: {}", e))
        })?;

        let collections_tree = db.open_tree(COLLECTIONS_TREE).map_err(|e| {
            AppError::StorageUnavailable(format!("Failed to open collections tree: {}", e))
        })?;

        tracing::info!("Initialized Sled store at {:?}", path.as_ref());

        Ok(Self {
            db: Arc::new(db),
            collections_tree,
        })
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn tree_name(collection: &str) -> String {
        format!("docs:{}", collection)
    }

    fn tree(&self, collection: &str) -> Result<Tree> {
        if !self.collections_tree.contains_key(collection)? {
            return Err(AppError::NotFound(format!(
                "Collection {} not found",
                collection
            )));
        }
        Ok(self.db.open_tree(Self::tree_name(collection))?)
    }

    fn next_version(&self) -> Result<u64> {
        // generate_id is monotonic across restarts
        Ok(self.db.generate_id()? + 1)
    }

    fn encode(version: u64, body: &Value) -> Result<Vec<u8>> {
        let envelope = Envelope {
            version,
            body: serde_json::to_vec(body)?,
        };
        Ok(bincode::serialize(&envelope)?)
    }

    fn decode(id: &str, bytes: &[u8]) -> Result<VersionedDocument> {
        let envelope: Envelope = bincode::deserialize(bytes)?;
        Ok(VersionedDocument {
            id: id.to_string(),
            token: ConcurrencyToken::from_raw(envelope.version),
            body: serde_json::from_slice(&envelope.body)?,
        })
    }

    fn decode_entry(key: &IVec, value: &IVec) -> Result<VersionedDocument> {
        let id = String::from_utf8(key.to_vec())
            .map_err(|e| AppError::Serialization(format!("Invalid document key: {}", e)))?;
        Self::decode(&id, value)
    }
}

#[async_trait]
impl DocumentStore for SledDocumentStore {
    fn backend_name(&self) -> &'static str {
        "sled"
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections_tree.contains_key(collection)?)
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        let outcome = self.collections_tree.compare_and_swap(
            collection,
            None as Option<&[u8]>,
            Some(&b"1"[..]),
        )?;

        match outcome {
            Ok(()) => {
                self.db.open_tree(Self::tree_name(collection))?;
                self.collections_tree.flush_async().await?;
                tracing::debug!(collection, "Collection created");
                Ok(())
            }
            Err(_) => Err(AppError::AlreadyExists(format!(
                "Collection {} already exists",
                collection
            ))),
        }
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<VersionedDocument>> {
        let tree = self.tree(collection)?;
        match tree.get(id)? {
            Some(bytes) => Ok(Some(Self::decode(id, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<VersionedDocument>> {
        let tree = self.tree(collection)?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = tree.get(id.as_str())? {
                found.push(Self::decode(id, &bytes)?);
            }
        }
        Ok(found)
    }

    async fn create(&self, collection: &str, id: &str, body: Value) -> Result<ConcurrencyToken> {
        let tree = self.tree(collection)?;
        let version = self.next_version()?;
        let bytes = Self::encode(version, &body)?;

        match tree.compare_and_swap(id, None as Option<&[u8]>, Some(bytes))? {
            Ok(()) => {
                tree.flush_async().await?;
                tracing::debug!(collection, id, version, "Document created");
                Ok(ConcurrencyToken::from_raw(version))
            }
            Err(_) => Err(AppError::AlreadyExists(format!(
                "Document {}/{} already exists",
                collection, id
            ))),
        }
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        token: ConcurrencyToken,
    ) -> Result<ConcurrencyToken> {
        let tree = self.tree(collection)?;
        let current = tree.get(id)?.ok_or_else(|| {
            AppError::NotFound(format!("Document {}/{} not found", collection, id))
        })?;

        let existing = Self::decode(id, &current)?;
        if existing.token != token {
            return Err(AppError::ConcurrencyConflict(format!(
                "Document {}/{} changed (expected {}, found {})",
                collection, id, token, existing.token
            )));
        }

        let version = self.next_version()?;
        let bytes = Self::encode(version, &body)?;

        // Conditioned on the exact bytes read above
        match tree.compare_and_swap(id, Some(&current), Some(bytes))? {
            Ok(()) => {
                tree.flush_async().await?;
                tracing::debug!(collection, id, version, "Document updated");
                Ok(ConcurrencyToken::from_raw(version))
            }
            Err(_) => Err(AppError::ConcurrencyConflict(format!(
                "Document {}/{} changed during update",
                collection, id
            ))),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let tree = self.tree(collection)?;
        let removed = tree.remove(id)?.is_some();
        if removed {
            tree.flush_async().await?;
            tracing::debug!(collection, id, "Document deleted");
        }
        Ok(removed)
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> Result<SearchHits> {
        let tree = self.tree(collection)?;
        let mut documents = Vec::new();
        for entry in tree.iter() {
            let (key, value) = entry?;
            documents.push(Self::decode_entry(&key, &value)?);
        }
        Ok(query::execute(query, documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (SledDocumentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SledDocumentStore::new(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_create_collection_once() {
        let (store, _temp) = create_test_store();

        assert!(!store.collection_exists("usage").await.unwrap());
        store.create_collection("usage").await.unwrap();
        assert!(store.collection_exists("usage").await.unwrap());

        let err = store.create_collection("usage").await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_conditioned_update() {
        let (store, _temp) = create_test_store();
        store.create_collection("usage").await.unwrap();

        let token = store.create("usage", "d1", json!({"n": 1})).await.unwrap();
        let fresh = store
            .update("usage", "d1", json!({"n": 2}), token)
            .await
            .unwrap();

        let stale = store
            .update("usage", "d1", json!({"n": 9}), token)
            .await
            .unwrap_err();
        assert!(matches!(stale, AppError::ConcurrencyConflict(_)));

        let doc = store.get("usage", "d1").await.unwrap().unwrap();
        assert_eq!(doc.token, fresh);
        assert_eq!(doc.body["n"], 2);
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let (store, _temp) = create_test_store();
        store.create_collection("usage").await.unwrap();

        let err = store
            .update("usage", "ghost", json!({}), ConcurrencyToken::from_raw(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_many_skips_missing() {
        let (store, _temp) = create_test_store();
        store.create_collection("usage").await.unwrap();
        store.create("usage", "a", json!({})).await.unwrap();
        store.create("usage", "c", json!({})).await.unwrap();

        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let docs = store.get_many("usage", &ids).await.unwrap();
        let found: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(found, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let token = {
            let store = SledDocumentStore::new(temp_dir.path()).unwrap();
            store.create_collection("configs").await.unwrap();
            let token = store
                .create("configs", "c1", json!({"name": "ops"}))
                .await
                .unwrap();
            store.flush().await.unwrap();
            token
        };

        let store = SledDocumentStore::new(temp_dir.path()).unwrap();
        assert!(store.collection_exists("configs").await.unwrap());
        let doc = store.get("configs", "c1").await.unwrap().unwrap();
        assert_eq!(doc.token, token);
        assert_eq!(doc.body["name"], "ops");
    }

    #[tokio::test]
    async fn test_search_reads_all_documents() {
        let (store, _temp) = create_test_store();
        store.create_collection("configs").await.unwrap();
        for i in 0..3 {
            store
                .create("configs", &format!("c{}", i), json!({"n": i}))
                .await
                .unwrap();
        }

        let hits = store
            .search("configs", &SearchQuery::default())
            .await
            .unwrap();
        assert_eq!(hits.total, 3);
    }
}
