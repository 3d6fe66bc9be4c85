use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use docvault_core::Document;

/// The multi-collection document store the engine backs up and restores.
/// External collaborator: the engine only ever sees this trait.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Identifier of the backing store implementation, recorded in backup
    /// metadata (e.g. "sqlite", "memory").
    fn version(&self) -> String;

    /// Names of every collection currently present.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// All documents of one collection, loaded fully into memory.
    async fn read_all(&self, collection: &str) -> Result<Vec<Document>>;

    /// Destructively replace a collection's contents: existing documents are
    /// removed, then `documents` inserted.
    async fn replace_all(&self, collection: &str, documents: Vec<Document>) -> Result<()>;

    async fn collection_exists(&self, collection: &str) -> Result<bool>;
}

/// In-memory document store used by tests and examples. Reads can be made to
/// fail per collection to exercise the engine's partial-failure isolation.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<BTreeMap<String, Vec<Document>>>,
    failing_reads: Mutex<HashSet<String>>,
    failing_replaces: Mutex<HashSet<String>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_collection(&self, name: &str, documents: Vec<Document>) {
        self.collections
            .lock()
            .unwrap()
            .insert(name.to_owned(), documents);
    }

    /// Make every subsequent `read_all` of `name` return an error.
    pub fn fail_reads_for(&self, name: &str) {
        self.failing_reads.lock().unwrap().insert(name.to_owned());
    }

    /// Make every subsequent `replace_all` of `name` return an error.
    pub fn fail_replaces_for(&self, name: &str) {
        self.failing_replaces.lock().unwrap().insert(name.to_owned());
    }

    /// Full snapshot of current contents, for assertions.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Document>> {
        self.collections.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn version(&self) -> String {
        "memory".to_owned()
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.lock().unwrap().keys().cloned().collect())
    }

    async fn read_all(&self, collection: &str) -> Result<Vec<Document>> {
        if self.failing_reads.lock().unwrap().contains(collection) {
            return Err(anyhow!("injected read failure for collection {collection}"));
        }
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .ok_or_else(|| anyhow!("unknown collection {collection}"))
    }

    async fn replace_all(&self, collection: &str, documents: Vec<Document>) -> Result<()> {
        if self.failing_replaces.lock().unwrap().contains(collection) {
            return Err(anyhow!(
                "injected replace failure for collection {collection}"
            ));
        }
        self.collections
            .lock()
            .unwrap()
            .insert(collection.to_owned(), documents);
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.lock().unwrap().contains_key(collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replace_all_overwrites_existing_documents() {
        let store = MemoryDocumentStore::new();
        store.insert_collection("customers", vec![json!({"id": 1}), json!({"id": 2})]);

        store
            .replace_all("customers", vec![json!({"id": 9})])
            .await
            .unwrap();

        let docs = store.read_all("customers").await.unwrap();
        assert_eq!(docs, vec![json!({"id": 9})]);
    }

    #[tokio::test]
    async fn injected_failures_only_hit_the_named_collection() {
        let store = MemoryDocumentStore::new();
        store.insert_collection("a", vec![json!(1)]);
        store.insert_collection("b", vec![json!(2)]);
        store.fail_reads_for("a");

        assert!(store.read_all("a").await.is_err());
        assert!(store.read_all("b").await.is_ok());
        assert_eq!(
            store.list_collections().await.unwrap(),
            vec!["a".to_owned(), "b".to_owned()]
        );
    }

    #[tokio::test]
    async fn exists_reflects_contents() {
        let store = MemoryDocumentStore::new();
        assert!(!store.collection_exists("x").await.unwrap());
        store.insert_collection("x", vec![]);
        assert!(store.collection_exists("x").await.unwrap());
    }
}
