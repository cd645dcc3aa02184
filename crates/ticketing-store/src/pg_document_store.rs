//! `PostgreSQL` implementation of the `DocumentStore` trait.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, instrument};

use ticketing_core::error::StoreError;
use ticketing_core::schema::IndexSpec;
use ticketing_core::store::{DocumentStore, Filter, StoredDocument, ensure_storable};

use crate::sql;

/// SQLSTATE for a reference to a table that does not exist.
const UNDEFINED_TABLE: &str = "42P01";

/// SQLSTATE for creating a relation whose name is taken.
const DUPLICATE_TABLE: &str = "42P07";

/// PostgreSQL-backed document store.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Creates a new `PgDocumentStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the collection table if needed. Losing a creation race to
    /// another session counts as success.
    async fn ensure_collection(&self, collection: &str) -> Result<(), StoreError> {
        match sqlx::query(&sql::create_collection(collection)?)
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_creation_race(collection, &e) => {
                debug!(collection, "collection created concurrently");
                Ok(())
            }
            Err(e) => Err(self.map_error(collection, e).await),
        }
    }

    /// The stored definition of the physical index `pg_name`: `None` if no
    /// such index exists, empty if it carries no definition.
    async fn index_definition(&self, pg_name: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar::<_, String>(sql::INDEX_COMMENT)
            .bind(pg_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Infrastructure(e.to_string()))
    }

    /// Returns `true` if `index` already exists with the same definition.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::IndexConflict` if an index of that name exists
    /// with another definition.
    async fn index_exists(&self, collection: &str, index: &IndexSpec) -> Result<bool, StoreError> {
        let pg_name = sql::pg_index_name(collection, &index.name());
        match self.index_definition(&pg_name).await? {
            None => Ok(false),
            Some(existing) if existing == index.definition() => Ok(true),
            Some(_) => Err(StoreError::IndexConflict {
                collection: collection.to_owned(),
                index: index.name(),
            }),
        }
    }

    /// The declared name of the physical index `pg_name`.
    async fn declared_index_name(&self, collection: &str, pg_name: &str) -> String {
        match self.index_definition(pg_name).await {
            Ok(Some(definition)) => IndexSpec::name_from_definition(&definition)
                .map_or_else(|| sql::store_index_name(collection, pg_name), str::to_owned),
            _ => sql::store_index_name(collection, pg_name),
        }
    }

    /// Maps unique violations raised by `collection`'s own indexes to
    /// `StoreError::DuplicateKey` and everything else to
    /// `StoreError::Infrastructure`.
    async fn map_error(&self, collection: &str, err: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                if let Some(pg_name) = owned_index(collection, db.table(), db.constraint()) {
                    return StoreError::DuplicateKey {
                        collection: collection.to_owned(),
                        index: self.declared_index_name(collection, pg_name).await,
                    };
                }
            }
        }
        StoreError::Infrastructure(err.to_string())
    }

    /// Runs the index build and its definition comment in one transaction.
    async fn build_index(&self, create: &str, comment: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(create).execute(&mut *tx).await?;
        sqlx::query(comment).execute(&mut *tx).await?;
        tx.commit().await
    }
}

/// The physical index name behind a unique violation, if the violation came
/// from one of `collection`'s own indexes rather than, say, the system
/// catalog during concurrent DDL.
fn owned_index<'a>(
    collection: &str,
    table: Option<&str>,
    constraint: Option<&'a str>,
) -> Option<&'a str> {
    if table != Some(collection) {
        return None;
    }
    constraint.filter(|name| name.starts_with(&format!("{collection}__")))
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(UNDEFINED_TABLE)
}

/// Concurrent `CREATE ... IF NOT EXISTS` statements can still collide, either
/// on the relation name or on a catalog unique index.
fn is_creation_race(collection: &str, err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some(DUPLICATE_TABLE)
                || (db.is_unique_violation()
                    && owned_index(collection, db.table(), db.constraint()).is_none())
        }
        _ => false,
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self, document), fields(id = %document.id))]
    async fn insert(&self, collection: &str, document: StoredDocument) -> Result<(), StoreError> {
        ensure_storable(&document.body)?;
        let statement = sql::insert(collection)?;
        let mut created = false;
        loop {
            let result = sqlx::query(&statement)
                .bind(&document.id)
                .bind(Json(&document.body))
                .execute(&self.pool)
                .await;
            match result {
                Ok(_) => return Ok(()),
                Err(e) if !created && is_undefined_table(&e) => {
                    debug!("creating collection on first insert");
                    self.ensure_collection(collection).await?;
                    created = true;
                }
                Err(e) => return Err(self.map_error(collection, e).await),
            }
        }
    }

    #[instrument(skip(self, filter))]
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let statement = sql::find_one(collection)?;
        if !filter.is_satisfiable() {
            return Ok(None);
        }
        let result = sqlx::query_as::<_, (String, Json<Value>)>(&statement)
            .bind(Json(filter.fields()))
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(row) => Ok(row.map(|(id, Json(body))| StoredDocument { id, body })),
            Err(e) if is_undefined_table(&e) => Ok(None),
            Err(e) => Err(self.map_error(collection, e).await),
        }
    }

    #[instrument(skip(self))]
    async fn delete_all(&self, collection: &str) -> Result<u64, StoreError> {
        match sqlx::query(&sql::delete_all(collection)?)
            .execute(&self.pool)
            .await
        {
            Ok(done) => Ok(done.rows_affected()),
            Err(e) if is_undefined_table(&e) => Ok(0),
            Err(e) => Err(self.map_error(collection, e).await),
        }
    }

    #[instrument(skip(self))]
    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        let statement = sql::drop_collection(collection)?;
        if let Err(e) = sqlx::query(&statement).execute(&self.pool).await {
            return Err(self.map_error(collection, e).await);
        }
        debug!("collection dropped");
        Ok(())
    }

    #[instrument(skip(self, index), fields(index = %index))]
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        let create = sql::create_index(collection, index)?;
        let comment = sql::comment_index(collection, index)?;
        self.ensure_collection(collection).await?;
        if self.index_exists(collection, index).await? {
            debug!("index already present");
            return Ok(());
        }

        match self.build_index(&create, &comment).await {
            Ok(()) => Ok(()),
            // Built concurrently by another session; it must match.
            Err(e) if is_creation_race(collection, &e) => {
                if self.index_exists(collection, index).await? {
                    Ok(())
                } else {
                    Err(StoreError::Infrastructure(e.to_string()))
                }
            }
            Err(e) => match self.map_error(collection, e).await {
                // A failed unique build names the offending key, not the index.
                StoreError::DuplicateKey { collection, .. } => Err(StoreError::DuplicateKey {
                    collection,
                    index: index.name(),
                }),
                other => Err(other),
            },
        }
    }

    #[instrument(skip(self))]
    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String, Option<String>)> = match sqlx::query_as(sql::LIST_INDEXES)
            .bind(collection)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => return Err(self.map_error(collection, e).await),
        };
        let mut names: Vec<String> = rows
            .iter()
            .map(|(pg_name, comment)| {
                comment
                    .as_deref()
                    .and_then(IndexSpec::name_from_definition)
                    .map_or_else(|| sql::store_index_name(collection, pg_name), str::to_owned)
            })
            .collect();
        names.sort();
        Ok(names)
    }
}
