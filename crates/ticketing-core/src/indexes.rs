//! Cold-start index initializer.
//!
//! Builds every index declared by a set of collection schemas. Application
//! startup and the test fixture reset both go through here.

use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::schema::CollectionSchema;
use crate::store::DocumentStore;

/// Builds every declared index of every schema, in declaration order.
///
/// # Errors
///
/// Returns the first `StoreError` raised by the store; later indexes are not
/// attempted.
pub async fn ensure_indexes(
    store: &dyn DocumentStore,
    schemas: &[CollectionSchema],
) -> Result<(), StoreError> {
    for schema in schemas {
        ensure_indexes_for(store, schema).await?;
    }
    Ok(())
}

/// Builds every declared index of a single schema.
///
/// # Errors
///
/// Returns the first `StoreError` raised by the store.
#[instrument(skip(store, schema), fields(collection = schema.collection))]
pub async fn ensure_indexes_for(
    store: &dyn DocumentStore,
    schema: &CollectionSchema,
) -> Result<(), StoreError> {
    for index in &schema.indexes {
        debug!(index = %index, "creating index");
        store.create_index(schema.collection, index).await?;
    }
    info!(count = schema.indexes.len(), "indexes ensured");
    Ok(())
}
