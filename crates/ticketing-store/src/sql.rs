//! SQL for collection tables and their indexes.
//!
//! Collection and field names are validated as plain identifiers before they
//! reach any of these builders; index names are quoted.

use sha2::{Digest, Sha256};
use ticketing_core::error::StoreError;
use ticketing_core::schema::{
    Direction, IndexSpec, MAX_IDENTIFIER_LEN, validate_collection, validate_index,
};

/// Index name reported for the primary key on `id`.
pub const ID_INDEX: &str = "_id_";

/// Hex digits of the name digest kept in a shortened index name.
const DIGEST_LEN: usize = 15;

/// Quotes `name` as a `PostgreSQL` identifier.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes `text` as a `PostgreSQL` string literal.
#[must_use]
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Index names are schema-global in `PostgreSQL`, so every index is prefixed
/// with its collection.
///
/// Names that would not survive as-is (longer than `MAX_IDENTIFIER_LEN` once
/// prefixed, or holding characters outside `[A-Za-z0-9_-]`) are replaced by
/// `{collection}__#` and a digest of the name. `PostgreSQL` would otherwise
/// truncate them and two distinct indexes could end up sharing a name.
#[must_use]
pub fn pg_index_name(collection: &str, index: &str) -> String {
    let plain = format!("{collection}__{index}");
    let safe = index
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if safe && plain.len() <= MAX_IDENTIFIER_LEN {
        return plain;
    }
    let digest: String = Sha256::digest(index.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    format!("{collection}__#{}", &digest[..DIGEST_LEN])
}

/// Reverses [`pg_index_name`] for plain names; foreign names are returned
/// unchanged. Shortened names are resolved through the index comment instead.
#[must_use]
pub fn store_index_name(collection: &str, pg_name: &str) -> String {
    pg_name
        .strip_prefix(&format!("{collection}__"))
        .unwrap_or(pg_name)
        .to_owned()
}

/// `CREATE TABLE` for a collection.
///
/// # Errors
///
/// Returns `StoreError::InvalidIdentifier` for an unusable collection name.
pub fn create_collection(collection: &str) -> Result<String, StoreError> {
    let table = quote_ident(validate_collection(collection)?);
    let pkey = quote_ident(&pg_index_name(collection, ID_INDEX));
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {table} (
    seq      BIGINT GENERATED ALWAYS AS IDENTITY,
    id       TEXT NOT NULL,
    document JSONB NOT NULL,
    CONSTRAINT {pkey} PRIMARY KEY (id)
)"
    ))
}

/// `DROP TABLE` for a collection. Drops its indexes with it.
///
/// # Errors
///
/// Returns `StoreError::InvalidIdentifier` for an unusable collection name.
pub fn drop_collection(collection: &str) -> Result<String, StoreError> {
    Ok(format!(
        "DROP TABLE IF EXISTS {}",
        quote_ident(validate_collection(collection)?)
    ))
}

/// `INSERT` of one document; binds `$1` id and `$2` document.
///
/// # Errors
///
/// Returns `StoreError::InvalidIdentifier` for an unusable collection name.
pub fn insert(collection: &str) -> Result<String, StoreError> {
    Ok(format!(
        "INSERT INTO {} (id, document) VALUES ($1, $2)",
        quote_ident(validate_collection(collection)?)
    ))
}

/// First document, in insertion order, containing the `$1` filter object.
///
/// # Errors
///
/// Returns `StoreError::InvalidIdentifier` for an unusable collection name.
pub fn find_one(collection: &str) -> Result<String, StoreError> {
    Ok(format!(
        "SELECT id, document FROM {} WHERE document @> $1 ORDER BY seq LIMIT 1",
        quote_ident(validate_collection(collection)?)
    ))
}

/// `DELETE` of every document.
///
/// # Errors
///
/// Returns `StoreError::InvalidIdentifier` for an unusable collection name.
pub fn delete_all(collection: &str) -> Result<String, StoreError> {
    Ok(format!(
        "DELETE FROM {}",
        quote_ident(validate_collection(collection)?)
    ))
}

/// Physical name and comment of every index on a table in the current
/// schema; binds `$1` table name.
pub const LIST_INDEXES: &str = r"
SELECT c.relname, obj_description(c.oid, 'pg_class')
FROM pg_index i
JOIN pg_class c ON c.oid = i.indexrelid
JOIN pg_class t ON t.oid = i.indrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
WHERE n.nspname = current_schema() AND t.relname = $1
";

/// Comment of one index in the current schema, empty if it has none; binds
/// `$1` physical index name. No row means no such index.
pub const INDEX_COMMENT: &str = r"
SELECT COALESCE(obj_description(c.oid, 'pg_class'), '')
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = current_schema() AND c.relname = $1 AND c.relkind = 'i'
";

/// `CREATE INDEX` for a declared index.
///
/// Keys index the typed `document->'field'` value, so `1` and `"1"` stay
/// distinct. A missing field indexes as JSON `null`, which makes unique
/// indexes treat all documents lacking the field as one value. Sparse indexes
/// skip documents lacking every key field.
///
/// # Errors
///
/// Returns `StoreError::InvalidIdentifier` for an unusable collection name or
/// an index rejected by `validate_index`.
pub fn create_index(collection: &str, index: &IndexSpec) -> Result<String, StoreError> {
    let table = quote_ident(validate_collection(collection)?);
    validate_index(index)?;

    let mut columns = Vec::with_capacity(index.keys().len());
    let mut presence = Vec::with_capacity(index.keys().len());
    for key in index.keys() {
        let field = &key.field;
        let order = match key.direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        columns.push(format!(
            "(COALESCE(document->'{field}', 'null'::jsonb)) {order}"
        ));
        presence.push(format!("document ? '{field}'"));
    }

    let name = quote_ident(&pg_index_name(collection, &index.name()));
    let unique = if index.is_unique() { "UNIQUE " } else { "" };
    let mut sql = format!(
        "CREATE {unique}INDEX {name} ON {table} ({})",
        columns.join(", ")
    );
    if index.options().sparse {
        sql.push_str(" WHERE ");
        sql.push_str(&presence.join(" OR "));
    }
    Ok(sql)
}

/// `COMMENT ON INDEX` recording the index definition, so a later build can
/// tell a matching index from a conflicting one and listings can report the
/// declared name.
///
/// # Errors
///
/// Returns `StoreError::InvalidIdentifier` under the same conditions as
/// [`create_index`].
pub fn comment_index(collection: &str, index: &IndexSpec) -> Result<String, StoreError> {
    validate_collection(collection)?;
    validate_index(index)?;
    Ok(format!(
        "COMMENT ON INDEX {} IS {}",
        quote_ident(&pg_index_name(collection, &index.name())),
        quote_literal(&index.definition())
    ))
}
