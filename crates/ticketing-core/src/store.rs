//! Document store abstraction.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::schema::{Document, IndexSpec};

/// A document as held by the store: its identifier plus its JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Storage identifier.
    pub id: String,
    /// Serialized entity fields, always a JSON object.
    pub body: Value,
}

impl StoredDocument {
    /// Serializes `document` into its stored form.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the document does not serialize
    /// to a JSON object.
    pub fn from_document<D: Document>(id: String, document: &D) -> Result<Self, StoreError> {
        let body = serde_json::to_value(document)?;
        ensure_storable(&body)?;
        if !body.is_object() {
            return Err(StoreError::Serialization(format!(
                "documents in '{}' must serialize to a JSON object",
                D::COLLECTION
            )));
        }
        Ok(Self { id, body })
    }

    /// Deserializes the body and attaches the storage identifier.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the body does not match `D`.
    pub fn into_document<D: Document>(self) -> Result<D, StoreError> {
        let mut document: D = serde_json::from_value(self.body)?;
        document.set_id(self.id);
        Ok(document)
    }
}

/// Rejects values no store can hold: strings or keys containing U+0000.
///
/// # Errors
///
/// Returns `StoreError::Serialization` naming the offending path.
pub fn ensure_storable(value: &Value) -> Result<(), StoreError> {
    match first_nul_path(value) {
        Some(path) => Err(StoreError::Serialization(format!(
            "NUL character at '{path}' cannot be stored"
        ))),
        None => Ok(()),
    }
}

fn first_nul_path(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.contains('\0') => Some(String::from("$")),
        Value::Array(items) => items.iter().enumerate().find_map(|(i, item)| {
            first_nul_path(item).map(|rest| format!("[{i}]{}", rest.trim_start_matches('$')))
        }),
        Value::Object(fields) => fields.iter().find_map(|(key, item)| {
            if key.contains('\0') {
                Some(format!(".{}", key.escape_debug()))
            } else {
                first_nul_path(item).map(|rest| format!(".{key}{}", rest.trim_start_matches('$')))
            }
        }),
        _ => None,
    }
}

/// Equality filter on top-level document fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: Map<String, Value>,
}

impl Filter {
    /// A filter matching documents whose `field` equals `value`.
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and(field, value)
    }

    /// Adds another equality condition.
    #[must_use]
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// The conditions as a JSON object.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns `false` if a condition holds a value no stored document can
    /// contain, so the filter cannot match anything.
    #[must_use]
    pub fn is_satisfiable(&self) -> bool {
        self.fields
            .iter()
            .all(|(field, value)| !field.contains('\0') && first_nul_path(value).is_none())
    }

    /// Returns `true` if `body` satisfies every condition.
    #[must_use]
    pub fn matches(&self, body: &Value) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| body.get(field) == Some(expected))
    }
}

/// The store handle: the capability through which documents are inserted,
/// queried, and collections managed.
///
/// Missing collections behave as empty ones: reads return nothing, deletes
/// and drops succeed. Inserts and index builds create the collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateKey` if the id or a unique index value
    /// already exists. The collection is left unchanged in that case.
    /// Returns `StoreError::Serialization` if the document contains a NUL
    /// character (see [`ensure_storable`]).
    async fn insert(&self, collection: &str, document: StoredDocument) -> Result<(), StoreError>;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<StoredDocument>, StoreError>;

    /// Removes every document, keeping the collection and its indexes.
    /// Returns the number of documents removed.
    async fn delete_all(&self, collection: &str) -> Result<u64, StoreError>;

    /// Removes the collection together with all its documents and indexes.
    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Builds `index` on `collection`. Building an index that already exists
    /// with the same definition is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateKey` if a unique index cannot be built
    /// because existing documents already collide,
    /// `StoreError::IndexConflict` if an index of that name exists with other
    /// keys or options, and `StoreError::InvalidIdentifier` if the index fails
    /// [`validate_index`](crate::schema::validate_index).
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError>;

    /// Names of the indexes currently present on `collection`.
    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>, StoreError>;
}
