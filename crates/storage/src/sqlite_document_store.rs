use std::path::PathBuf;

use anyhow::{Context, Result};
use docvault_core::Document;
use rusqlite::{params, Connection};

use crate::document_store::DocumentStore;

/// SQLite-backed document store. Documents are schemaless JSON bodies in a
/// single table keyed by collection name. Each method opens a fresh
/// connection on a blocking thread.
pub struct SqliteDocumentStore {
    db_path: PathBuf,
}

impl SqliteDocumentStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let store = Self { db_path };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path).context("open document db")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                seq INTEGER NOT NULL,
                body TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection
                ON documents (collection, seq);",
        )?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn version(&self) -> String {
        "sqlite".to_owned()
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open document db")?;
            let mut stmt =
                conn.prepare("SELECT DISTINCT collection FROM documents ORDER BY collection")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
        .await?
    }

    async fn read_all(&self, collection: &str) -> Result<Vec<Document>> {
        let db_path = self.db_path.clone();
        let collection = collection.to_owned();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open document db")?;
            let mut stmt =
                conn.prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY seq")?;
            let rows = stmt.query_map([&collection], |row| row.get::<_, String>(0))?;
            let mut documents = Vec::new();
            for raw in rows {
                let raw = raw?;
                let doc = serde_json::from_str(&raw)
                    .with_context(|| format!("parse document in collection {collection}"))?;
                documents.push(doc);
            }
            Ok(documents)
        })
        .await?
    }

    async fn replace_all(&self, collection: &str, documents: Vec<Document>) -> Result<()> {
        let db_path = self.db_path.clone();
        let collection = collection.to_owned();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&db_path).context("open document db")?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM documents WHERE collection = ?1", [&collection])?;
            for (seq, doc) in documents.iter().enumerate() {
                tx.execute(
                    "INSERT INTO documents (collection, seq, body) VALUES (?1, ?2, ?3)",
                    params![collection, seq as i64, serde_json::to_string(doc)?],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let db_path = self.db_path.clone();
        let collection = collection.to_owned();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open document db")?;
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                [&collection],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, SqliteDocumentStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteDocumentStore::new(tmp.path().join("documents.db")).unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn round_trips_documents_in_order() {
        let (_tmp, store) = store();
        let docs = vec![json!({"id": 1, "name": "Ada"}), json!({"id": 2})];
        store.replace_all("customers", docs.clone()).await.unwrap();

        assert_eq!(store.read_all("customers").await.unwrap(), docs);
        assert_eq!(
            store.list_collections().await.unwrap(),
            vec!["customers".to_owned()]
        );
        assert!(store.collection_exists("customers").await.unwrap());
        assert!(!store.collection_exists("invoices").await.unwrap());
    }

    #[tokio::test]
    async fn replace_all_is_destructive() {
        let (_tmp, store) = store();
        store
            .replace_all("c", vec![json!(1), json!(2), json!(3)])
            .await
            .unwrap();
        store.replace_all("c", vec![json!(9)]).await.unwrap();
        assert_eq!(store.read_all("c").await.unwrap(), vec![json!(9)]);
    }

    #[tokio::test]
    async fn empty_collection_disappears_from_listing() {
        let (_tmp, store) = store();
        store.replace_all("c", vec![json!(1)]).await.unwrap();
        store.replace_all("c", vec![]).await.unwrap();
        assert!(store.list_collections().await.unwrap().is_empty());
        assert!(store.read_all("c").await.unwrap().is_empty());
    }
}
