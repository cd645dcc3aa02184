//! Test stores — `DocumentStore` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use ticketing_core::error::StoreError;
use ticketing_core::schema::{IndexSpec, validate_collection, validate_index};
use ticketing_core::store::{DocumentStore, Filter, StoredDocument, ensure_storable};

/// Name reported for the implicit index on the storage identifier.
const ID_INDEX: &str = "_id_";

/// A mutating call observed by `InMemoryDocumentStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    /// A successful insert into the collection.
    Insert(String),
    /// `delete_all` on the collection.
    DeleteAll(String),
    /// `drop_collection` on the collection.
    DropCollection(String),
    /// `create_index` with the collection and index name.
    CreateIndex(String, String),
}

#[derive(Debug, Default)]
struct Collection {
    documents: Vec<StoredDocument>,
    indexes: Vec<IndexSpec>,
}

impl Collection {
    /// Returns the name of the first unique index `body` would collide on.
    fn conflicting_index(&self, id: &str, body: &Value) -> Option<String> {
        if self.documents.iter().any(|d| d.id == id) {
            return Some(ID_INDEX.to_owned());
        }
        self.indexes
            .iter()
            .filter(|index| index.is_unique())
            .find(|index| {
                index_key(index, body).is_some_and(|key| {
                    self.documents.iter().any(|d| {
                        index_key(index, &d.body).is_some_and(|other| keys_equal(&key, &other))
                    })
                })
            })
            .map(IndexSpec::name)
    }

    /// Returns `true` if existing documents already break the unique index.
    fn violates(&self, index: &IndexSpec) -> bool {
        if !index.is_unique() {
            return false;
        }
        let keys: Vec<Vec<Value>> = self
            .documents
            .iter()
            .filter_map(|d| index_key(index, &d.body))
            .collect();
        keys.iter().enumerate().any(|(i, key)| {
            keys[i + 1..]
                .iter()
                .any(|other| keys_equal(key, other))
        })
    }
}

/// The key values `body` contributes to `index`, or `None` if a sparse index
/// skips the document. Missing fields index as `null`.
fn index_key(index: &IndexSpec, body: &Value) -> Option<Vec<Value>> {
    let values: Vec<Option<&Value>> = index.keys().iter().map(|k| body.get(&k.field)).collect();
    if index.options().sparse && values.iter().all(Option::is_none) {
        return None;
    }
    Some(
        values
            .into_iter()
            .map(|v| v.cloned().unwrap_or(Value::Null))
            .collect(),
    )
}

fn keys_equal(left: &[Value], right: &[Value]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(l, r)| json_equal(l, r))
}

/// JSON equality as a jsonb index sees it: types must match, numbers compare
/// by value (`1` equals `1.0`), object key order is irrelevant.
fn json_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l == r || l.as_f64() == r.as_f64(),
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| json_equal(a, b))
        }
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l.iter()
                    .all(|(key, a)| r.get(key).is_some_and(|b| json_equal(a, b)))
        }
        _ => left == right,
    }
}

/// A document store held entirely in memory. Enforces unique indexes the same
/// way the production store does and records every mutating call.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: Mutex<HashMap<String, Collection>>,
    operations: Mutex<Vec<StoreOperation>>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all mutating calls, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.operations.lock().unwrap().clone()
    }

    /// Forgets the recorded operations.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn clear_operations(&self) {
        self.operations.lock().unwrap().clear();
    }

    /// Number of documents in `collection`; zero if it does not exist.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }

    /// Returns `true` if `collection` currently exists.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn has_collection(&self, collection: &str) -> bool {
        self.collections.lock().unwrap().contains_key(collection)
    }

    fn record(&self, operation: StoreOperation) {
        self.operations.lock().unwrap().push(operation);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, collection: &str, document: StoredDocument) -> Result<(), StoreError> {
        validate_collection(collection)?;
        ensure_storable(&document.body)?;
        {
            let mut collections = self.collections.lock().unwrap();
            let target = collections.entry(collection.to_owned()).or_default();
            if let Some(index) = target.conflicting_index(&document.id, &document.body) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_owned(),
                    index,
                });
            }
            target.documents.push(document);
        }
        self.record(StoreOperation::Insert(collection.to_owned()));
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<StoredDocument>, StoreError> {
        validate_collection(collection)?;
        let collections = self.collections.lock().unwrap();
        Ok(collections.get(collection).and_then(|c| {
            c.documents
                .iter()
                .find(|d| filter.matches(&d.body))
                .cloned()
        }))
    }

    async fn delete_all(&self, collection: &str) -> Result<u64, StoreError> {
        validate_collection(collection)?;
        let removed = self
            .collections
            .lock()
            .unwrap()
            .get_mut(collection)
            .map_or(0, |c| std::mem::take(&mut c.documents).len());
        self.record(StoreOperation::DeleteAll(collection.to_owned()));
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        validate_collection(collection)?;
        self.collections.lock().unwrap().remove(collection);
        self.record(StoreOperation::DropCollection(collection.to_owned()));
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        validate_collection(collection)?;
        validate_index(index)?;
        let name = index.name();
        {
            let mut collections = self.collections.lock().unwrap();
            let target = collections.entry(collection.to_owned()).or_default();
            if let Some(existing) = target.indexes.iter().find(|i| i.name() == name) {
                if existing.definition() == index.definition() {
                    return Ok(());
                }
                return Err(StoreError::IndexConflict {
                    collection: collection.to_owned(),
                    index: name,
                });
            }
            if target.violates(index) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_owned(),
                    index: name,
                });
            }
            target.indexes.push(index.clone());
        }
        self.record(StoreOperation::CreateIndex(collection.to_owned(), name));
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        validate_collection(collection)?;
        let collections = self.collections.lock().unwrap();
        Ok(collections.get(collection).map_or_else(Vec::new, |c| {
            std::iter::once(ID_INDEX.to_owned())
                .chain(c.indexes.iter().map(IndexSpec::name))
                .collect()
        }))
    }
}

/// A document store that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingDocumentStore;

fn connection_refused() -> StoreError {
    StoreError::Infrastructure("connection refused".into())
}

#[async_trait]
impl DocumentStore for FailingDocumentStore {
    async fn insert(&self, _collection: &str, _document: StoredDocument) -> Result<(), StoreError> {
        Err(connection_refused())
    }

    async fn find_one(
        &self,
        _collection: &str,
        _filter: &Filter,
    ) -> Result<Option<StoredDocument>, StoreError> {
        Err(connection_refused())
    }

    async fn delete_all(&self, _collection: &str) -> Result<u64, StoreError> {
        Err(connection_refused())
    }

    async fn drop_collection(&self, _collection: &str) -> Result<(), StoreError> {
        Err(connection_refused())
    }

    async fn create_index(&self, _collection: &str, _index: &IndexSpec) -> Result<(), StoreError> {
        Err(connection_refused())
    }

    async fn list_indexes(&self, _collection: &str) -> Result<Vec<String>, StoreError> {
        Err(connection_refused())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use ticketing_core::schema::Direction;

    use super::*;

    fn doc(id: &str, body: Value) -> StoredDocument {
        StoredDocument {
            id: id.to_owned(),
            body,
        }
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicate_and_keeps_collection_unchanged() {
        // Arrange
        let store = InMemoryDocumentStore::new();
        store
            .create_index("tickets", &IndexSpec::ascending("ticketId").unique())
            .await
            .unwrap();
        store
            .insert("tickets", doc("a", json!({"ticketId": "1", "content": "blabla"})))
            .await
            .unwrap();

        // Act
        let result = store
            .insert("tickets", doc("b", json!({"ticketId": "1", "content": "hihi"})))
            .await;

        // Assert
        match result {
            Err(StoreError::DuplicateKey { collection, index }) => {
                assert_eq!(collection, "tickets");
                assert_eq!(index, "ticketId_1");
            }
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
        assert_eq!(store.count("tickets"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_storage_id_is_rejected_by_id_index() {
        let store = InMemoryDocumentStore::new();
        store.insert("tickets", doc("a", json!({}))).await.unwrap();

        let result = store.insert("tickets", doc("a", json!({}))).await;

        assert!(matches!(
            result,
            Err(StoreError::DuplicateKey { index, .. }) if index == "_id_"
        ));
    }

    #[tokio::test]
    async fn test_without_index_duplicates_are_accepted() {
        let store = InMemoryDocumentStore::new();

        store.insert("tickets", doc("a", json!({"ticketId": "1"}))).await.unwrap();
        store.insert("tickets", doc("b", json!({"ticketId": "1"}))).await.unwrap();

        assert_eq!(store.count("tickets"), 2);
    }

    #[tokio::test]
    async fn test_sparse_unique_index_skips_documents_without_the_field() {
        let store = InMemoryDocumentStore::new();
        store
            .create_index("tickets", &IndexSpec::ascending("externalRef").unique().sparse())
            .await
            .unwrap();

        store.insert("tickets", doc("a", json!({"content": "x"}))).await.unwrap();
        store.insert("tickets", doc("b", json!({"content": "y"}))).await.unwrap();

        assert_eq!(store.count("tickets"), 2);
    }

    #[tokio::test]
    async fn test_compound_unique_index_compares_all_keys() {
        let store = InMemoryDocumentStore::new();
        let index = IndexSpec::ascending("project")
            .then("number", Direction::Ascending)
            .unique();
        store.create_index("tickets", &index).await.unwrap();
        store
            .insert("tickets", doc("a", json!({"project": "p", "number": 1})))
            .await
            .unwrap();
        store
            .insert("tickets", doc("b", json!({"project": "p", "number": 2})))
            .await
            .unwrap();

        let result = store
            .insert("tickets", doc("c", json!({"project": "p", "number": 1})))
            .await;

        assert!(result.unwrap_err().is_duplicate_key());
    }

    #[tokio::test]
    async fn test_unique_index_build_fails_on_existing_duplicates() {
        let store = InMemoryDocumentStore::new();
        store.insert("tickets", doc("a", json!({"ticketId": "1"}))).await.unwrap();
        store.insert("tickets", doc("b", json!({"ticketId": "1"}))).await.unwrap();

        let result = store
            .create_index("tickets", &IndexSpec::ascending("ticketId").unique())
            .await;

        assert!(result.unwrap_err().is_duplicate_key());
        assert_eq!(store.list_indexes("tickets").await.unwrap(), vec!["_id_"]);
    }

    #[tokio::test]
    async fn test_create_index_twice_is_noop() {
        let store = InMemoryDocumentStore::new();
        let index = IndexSpec::ascending("ticketId").unique();

        store.create_index("tickets", &index).await.unwrap();
        store.create_index("tickets", &index).await.unwrap();

        assert_eq!(
            store.list_indexes("tickets").await.unwrap(),
            vec!["_id_", "ticketId_1"]
        );
        assert_eq!(store.operations().len(), 1);
    }

    #[tokio::test]
    async fn test_create_index_with_same_name_but_other_options_conflicts() {
        // Arrange
        let store = InMemoryDocumentStore::new();
        store
            .create_index("tickets", &IndexSpec::ascending("ticketId"))
            .await
            .unwrap();

        // Act
        let result = store
            .create_index("tickets", &IndexSpec::ascending("ticketId").unique())
            .await;

        // Assert
        match result {
            Err(StoreError::IndexConflict { collection, index }) => {
                assert_eq!(collection, "tickets");
                assert_eq!(index, "ticketId_1");
            }
            other => panic!("expected IndexConflict, got {other:?}"),
        }
        store.insert("tickets", doc("a", json!({"ticketId": "1"}))).await.unwrap();
        store.insert("tickets", doc("b", json!({"ticketId": "1"}))).await.unwrap();
        assert_eq!(store.count("tickets"), 2);
    }

    #[tokio::test]
    async fn test_overlong_names_are_rejected() {
        let store = InMemoryDocumentStore::new();
        let long_index = IndexSpec::ascending("f".repeat(60)).then("x", Direction::Ascending);

        let index_result = store.create_index("tickets", &long_index).await;
        let collection_result = store.insert(&"c".repeat(46), doc("a", json!({}))).await;

        assert!(matches!(index_result, Err(StoreError::InvalidIdentifier(_))));
        assert!(matches!(
            collection_result,
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[tokio::test]
    async fn test_unique_index_compares_typed_values() {
        // Arrange
        let store = InMemoryDocumentStore::new();
        store
            .create_index("tickets", &IndexSpec::ascending("ticketId").unique())
            .await
            .unwrap();
        store.insert("tickets", doc("a", json!({"ticketId": 1}))).await.unwrap();

        // Act
        let text = store.insert("tickets", doc("b", json!({"ticketId": "1"}))).await;
        let float = store.insert("tickets", doc("c", json!({"ticketId": 1.0}))).await;

        // Assert
        assert!(text.is_ok());
        assert!(float.unwrap_err().is_duplicate_key());
        assert_eq!(store.count("tickets"), 2);
    }

    #[tokio::test]
    async fn test_insert_rejects_nul_characters() {
        let store = InMemoryDocumentStore::new();

        let result = store
            .insert("tickets", doc("a", json!({"content": "a\u{0000}b"})))
            .await;

        assert!(matches!(result, Err(StoreError::Serialization(_))));
        assert!(!store.has_collection("tickets"));
    }

    #[tokio::test]
    async fn test_delete_all_keeps_indexes_but_drop_removes_them() {
        // Arrange
        let store = InMemoryDocumentStore::new();
        store
            .create_index("tickets", &IndexSpec::ascending("ticketId").unique())
            .await
            .unwrap();
        store.insert("tickets", doc("a", json!({"ticketId": "1"}))).await.unwrap();

        // Act
        let removed = store.delete_all("tickets").await.unwrap();

        // Assert
        assert_eq!(removed, 1);
        assert_eq!(store.count("tickets"), 0);
        assert_eq!(store.list_indexes("tickets").await.unwrap().len(), 2);

        store.drop_collection("tickets").await.unwrap();
        assert!(!store.has_collection("tickets"));
        assert!(store.list_indexes("tickets").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_collection_behaves_as_empty() {
        let store = InMemoryDocumentStore::new();

        let found = store
            .find_one("tickets", &Filter::eq("ticketId", "1"))
            .await
            .unwrap();

        assert_eq!(found, None);
        assert_eq!(store.delete_all("tickets").await.unwrap(), 0);
        store.drop_collection("tickets").await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_collection_name_is_rejected() {
        let store = InMemoryDocumentStore::new();

        let result = store.insert("tickets; --", doc("a", json!({}))).await;

        assert!(matches!(result, Err(StoreError::InvalidIdentifier(_))));
    }

    #[tokio::test]
    async fn test_failing_store_always_errors() {
        let store = FailingDocumentStore;

        assert!(store.drop_collection("tickets").await.is_err());
        assert!(store.list_indexes("tickets").await.is_err());
    }
}
