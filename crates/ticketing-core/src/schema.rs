//! Declarative collection schemas.
//!
//! Each persisted entity type describes its collection and the indexes on it
//! through the [`Document`] trait. The same declarations feed the cold-start
//! initializer and the test fixture reset, so both build identical indexes.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// Sort direction of a single index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending order (`1`).
    Ascending,
    /// Descending order (`-1`).
    Descending,
}

impl Direction {
    /// The conventional numeric suffix used in generated index names.
    #[must_use]
    pub const fn as_i8(self) -> i8 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// One field of an index key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    /// Top-level document field.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

/// Options applied when building an index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Explicit index name. Derived from the keys when `None`.
    pub name: Option<String>,
    /// Reject inserts whose key values already exist.
    pub unique: bool,
    /// Only index documents that contain the key fields.
    pub sparse: bool,
}

/// A declared index: the field set plus its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    keys: Vec<IndexKey>,
    options: IndexOptions,
}

impl IndexSpec {
    /// Starts an index on a single ascending field.
    #[must_use]
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            keys: vec![IndexKey {
                field: field.into(),
                direction: Direction::Ascending,
            }],
            options: IndexOptions::default(),
        }
    }

    /// Starts an index on a single descending field.
    #[must_use]
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            keys: vec![IndexKey {
                field: field.into(),
                direction: Direction::Descending,
            }],
            options: IndexOptions::default(),
        }
    }

    /// Appends another key to make a compound index.
    #[must_use]
    pub fn then(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.keys.push(IndexKey {
            field: field.into(),
            direction,
        });
        self
    }

    /// Marks the index as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    /// Marks the index as sparse.
    #[must_use]
    pub fn sparse(mut self) -> Self {
        self.options.sparse = true;
        self
    }

    /// Overrides the generated index name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    /// The key fields, in declaration order.
    #[must_use]
    pub fn keys(&self) -> &[IndexKey] {
        &self.keys
    }

    /// The build options.
    #[must_use]
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Returns `true` if the index rejects duplicate key values.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.options.unique
    }

    /// Canonical text of the keys and options, ending with the index name.
    ///
    /// Two specs with the same definition build indistinguishable indexes.
    #[must_use]
    pub fn definition(&self) -> String {
        let keys = self
            .keys
            .iter()
            .map(|k| format!("{}:{}", k.field, k.direction.as_i8()))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{keys}|unique={}|sparse={}|{}",
            self.options.unique,
            self.options.sparse,
            self.name()
        )
    }

    /// Extracts the index name from a [`IndexSpec::definition`] string.
    #[must_use]
    pub fn name_from_definition(definition: &str) -> Option<&str> {
        definition.splitn(4, '|').nth(3)
    }

    /// The index name: the explicit one, or `field_1[_field_-1...]`.
    #[must_use]
    pub fn name(&self) -> String {
        if let Some(name) = &self.options.name {
            return name.clone();
        }
        self.keys
            .iter()
            .map(|k| format!("{}_{}", k.field, k.direction.as_i8()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if self.options.unique {
            write!(f, " (unique)")?;
        }
        Ok(())
    }
}

/// A persisted entity type.
///
/// The storage identifier is kept outside the serialized body; the body holds
/// only the entity's own fields.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Name of the collection documents of this type live in.
    const COLLECTION: &'static str;

    /// Every index declared on this type.
    fn indexes() -> Vec<IndexSpec>;

    /// The storage identifier, if the document has been assigned one.
    fn id(&self) -> Option<&str>;

    /// Records the storage identifier assigned on insert.
    fn set_id(&mut self, id: String);
}

/// The collection name and declared indexes of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    /// Collection name.
    pub collection: &'static str,
    /// Declared indexes.
    pub indexes: Vec<IndexSpec>,
}

impl CollectionSchema {
    /// Captures the schema of document type `D`.
    #[must_use]
    pub fn of<D: Document>() -> Self {
        Self {
            collection: D::COLLECTION,
            indexes: D::indexes(),
        }
    }
}

/// Longest field or index name accepted, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Longest collection name accepted, in bytes. Leaves room for backends to
/// derive per-collection index names within `MAX_IDENTIFIER_LEN`.
pub const MAX_COLLECTION_LEN: usize = 45;

/// Checks that `name` is a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`) of at
/// most `MAX_IDENTIFIER_LEN` bytes.
///
/// Store backends interpolate collection and field names into their native
/// query language, so anything else is rejected up front.
///
/// # Errors
///
/// Returns `StoreError::InvalidIdentifier` if the name is empty or contains
/// other characters.
pub fn validate_identifier(name: &str) -> Result<&str, StoreError> {
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(StoreError::InvalidIdentifier(format!(
            "'{name}' is longer than {MAX_IDENTIFIER_LEN} bytes"
        )));
    }
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_owned()))
    }
}

/// Checks a collection name: a plain identifier of at most
/// `MAX_COLLECTION_LEN` bytes.
///
/// # Errors
///
/// Returns `StoreError::InvalidIdentifier` if the name is unusable.
pub fn validate_collection(name: &str) -> Result<&str, StoreError> {
    if name.len() > MAX_COLLECTION_LEN {
        return Err(StoreError::InvalidIdentifier(format!(
            "collection '{name}' is longer than {MAX_COLLECTION_LEN} bytes"
        )));
    }
    validate_identifier(name)
}

/// Checks that an index can be built by any store: at least one key, plain
/// field names, and a printable name of at most `MAX_IDENTIFIER_LEN` bytes.
///
/// # Errors
///
/// Returns `StoreError::InvalidIdentifier` describing the first problem.
pub fn validate_index(index: &IndexSpec) -> Result<(), StoreError> {
    if index.keys().is_empty() {
        return Err(StoreError::InvalidIdentifier(
            "index declares no keys".to_owned(),
        ));
    }
    for key in index.keys() {
        validate_identifier(&key.field)?;
    }
    let name = index.name();
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN || name.chars().any(char::is_control) {
        return Err(StoreError::InvalidIdentifier(format!(
            "index name {name:?} must be 1 to {MAX_IDENTIFIER_LEN} printable bytes"
        )));
    }
    Ok(())
}
