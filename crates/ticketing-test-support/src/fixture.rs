//! Test fixture reset — clean, correctly indexed collections for every test.
//!
//! Dropping a collection also discards its indexes, and nothing rebuilds them
//! afterwards. `before` therefore drops each declared collection and then
//! rebuilds its declared indexes through the same initializer the application
//! runs at startup. `after` only drops.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use ticketing_core::error::StoreError;
use ticketing_core::indexes::ensure_indexes;
use ticketing_core::schema::{CollectionSchema, Document};
use ticketing_core::store::DocumentStore;
use tracing::{debug, instrument, warn};

/// Errors raised while configuring or running a fixture reset.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The fixture was built without a store handle.
    #[error(
        "FixtureReset expects a store handle; call `FixtureResetBuilder::store` before `build`"
    )]
    MissingStore,

    /// The store rejected a drop or index build.
    #[error("fixture reset failed: {0}")]
    Store(#[from] StoreError),
}

/// Drops a declared set of collections before and after each test and
/// rebuilds their indexes before it.
///
/// The store handle is borrowed from the surrounding test context; the fixture
/// never creates or closes it.
#[derive(Clone)]
pub struct FixtureReset {
    store: Arc<dyn DocumentStore>,
    schemas: Vec<CollectionSchema>,
}

impl std::fmt::Debug for FixtureReset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureReset")
            .field("schemas", &self.schemas)
            .finish_non_exhaustive()
    }
}

impl FixtureReset {
    /// Creates a fixture resetting `schemas` on `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, schemas: Vec<CollectionSchema>) -> Self {
        Self { store, schemas }
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder() -> FixtureResetBuilder {
        FixtureResetBuilder::default()
    }

    /// The schemas this fixture resets.
    #[must_use]
    pub fn schemas(&self) -> &[CollectionSchema] {
        &self.schemas
    }

    /// Drops every declared collection, then rebuilds every declared index.
    ///
    /// # Errors
    ///
    /// Returns `FixtureError::Store` if a drop or index build fails.
    #[instrument(skip(self), fields(collections = self.schemas.len()))]
    pub async fn before(&self) -> Result<(), FixtureError> {
        self.drop_collections().await?;
        ensure_indexes(self.store.as_ref(), &self.schemas).await?;
        Ok(())
    }

    /// Drops every declared collection.
    ///
    /// # Errors
    ///
    /// Returns `FixtureError::Store` if a drop fails.
    #[instrument(skip(self), fields(collections = self.schemas.len()))]
    pub async fn after(&self) -> Result<(), FixtureError> {
        self.drop_collections().await
    }

    /// Runs `body` between `before` and `after`.
    ///
    /// `after` runs whatever the body does. A panicking body is resumed once
    /// cleanup has finished, so the test still fails with the original panic.
    ///
    /// # Errors
    ///
    /// Returns `FixtureError` if `before` or `after` fails. If `before` fails
    /// the body is not run.
    pub async fn run<F, Fut, T>(&self, body: F) -> Result<T, FixtureError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.before().await?;
        let outcome = AssertUnwindSafe(body()).catch_unwind().await;
        let cleanup = self.after().await;
        match outcome {
            Ok(value) => cleanup.map(|()| value),
            Err(payload) => {
                if let Err(err) = cleanup {
                    warn!(error = %err, "cleanup after panicking test failed");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    async fn drop_collections(&self) -> Result<(), FixtureError> {
        for schema in &self.schemas {
            debug!(collection = schema.collection, "dropping collection");
            self.store.drop_collection(schema.collection).await?;
        }
        Ok(())
    }
}

/// Builder for [`FixtureReset`].
#[derive(Default)]
pub struct FixtureResetBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    schemas: Vec<CollectionSchema>,
}

impl FixtureResetBuilder {
    /// Sets the store handle to reset.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Adds the collection of document type `D`.
    #[must_use]
    pub fn reset<D: Document>(self) -> Self {
        self.schema(CollectionSchema::of::<D>())
    }

    /// Adds an explicit collection schema.
    #[must_use]
    pub fn schema(mut self, schema: CollectionSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Builds the fixture.
    ///
    /// # Errors
    ///
    /// Returns `FixtureError::MissingStore` if no store handle was set.
    pub fn build(self) -> Result<FixtureReset, FixtureError> {
        let store = self.store.ok_or(FixtureError::MissingStore)?;
        Ok(FixtureReset::new(store, self.schemas))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use ticketing_core::error::StoreError;
    use ticketing_core::schema::{Document, IndexSpec};
    use ticketing_core::store::{DocumentStore, StoredDocument};

    use super::{FixtureError, FixtureReset};
    use crate::store::{FailingDocumentStore, InMemoryDocumentStore, StoreOperation};

    #[derive(Debug, Serialize, Deserialize)]
    struct Badge {
        #[serde(skip)]
        id: Option<String>,
        code: String,
    }

    impl Document for Badge {
        const COLLECTION: &'static str = "badges";

        fn indexes() -> Vec<IndexSpec> {
            vec![IndexSpec::ascending("code").unique()]
        }

        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }

        fn set_id(&mut self, id: String) {
            self.id = Some(id);
        }
    }

    fn badge(id: &str, code: &str) -> StoredDocument {
        StoredDocument {
            id: id.to_owned(),
            body: json!({ "code": code }),
        }
    }

    fn fixture_on(store: &Arc<InMemoryDocumentStore>) -> FixtureReset {
        let handle: Arc<dyn DocumentStore> = store.clone();
        FixtureReset::builder()
            .store(handle)
            .reset::<Badge>()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_before_empties_collection_and_restores_indexes() {
        // Arrange
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("badges", badge("a", "x")).await.unwrap();
        let fixture = fixture_on(&store);

        // Act
        fixture.before().await.unwrap();

        // Assert
        assert_eq!(store.count("badges"), 0);
        assert_eq!(
            store.list_indexes("badges").await.unwrap(),
            vec!["_id_", "code_1"]
        );
        store.insert("badges", badge("b", "y")).await.unwrap();
        let duplicate = store.insert("badges", badge("c", "y")).await;
        assert!(matches!(duplicate, Err(StoreError::DuplicateKey { .. })));
    }

    #[tokio::test]
    async fn test_before_drops_then_rebuilds() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let fixture = fixture_on(&store);

        fixture.before().await.unwrap();

        assert_eq!(
            store.operations(),
            vec![
                StoreOperation::DropCollection("badges".to_owned()),
                StoreOperation::CreateIndex("badges".to_owned(), "code_1".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_after_drops_without_rebuilding_indexes() {
        // Arrange
        let store = Arc::new(InMemoryDocumentStore::new());
        let fixture = fixture_on(&store);
        fixture.before().await.unwrap();
        store.insert("badges", badge("a", "x")).await.unwrap();
        store.clear_operations();

        // Act
        fixture.after().await.unwrap();

        // Assert
        assert_eq!(store.count("badges"), 0);
        assert_eq!(
            store.operations(),
            vec![StoreOperation::DropCollection("badges".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_run_wraps_body_between_before_and_after() {
        // Arrange
        let store = Arc::new(InMemoryDocumentStore::new());
        let fixture = fixture_on(&store);

        let body_store = Arc::clone(&store);

        // Act
        let inserted = fixture
            .run(|| async move {
                body_store.insert("badges", badge("a", "x")).await.unwrap();
                body_store.count("badges")
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(inserted, 1);
        assert_eq!(store.count("badges"), 0);
        assert_eq!(
            store.operations().last(),
            Some(&StoreOperation::DropCollection("badges".to_owned()))
        );
    }

    #[tokio::test]
    async fn test_run_cleans_up_when_body_panics() {
        // Arrange
        let store = Arc::new(InMemoryDocumentStore::new());
        let fixture = fixture_on(&store);
        let body_store = Arc::clone(&store);
        let should_fail = true;

        // Act
        let result = tokio::spawn(async move {
            fixture
                .run(|| async move {
                    body_store.insert("badges", badge("a", "x")).await.unwrap();
                    assert!(!should_fail, "test body failed");
                })
                .await
        })
        .await;

        // Assert
        assert!(result.unwrap_err().is_panic());
        assert_eq!(store.count("badges"), 0);
        assert!(!store.has_collection("badges"));
    }

    #[tokio::test]
    async fn test_before_failure_skips_body() {
        // Arrange
        let fixture = FixtureReset::builder()
            .store(Arc::new(FailingDocumentStore))
            .reset::<Badge>()
            .build()
            .unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        // Act
        let result = fixture
            .run(|| async move { flag.store(true, Ordering::SeqCst) })
            .await;

        // Assert
        assert!(matches!(result, Err(FixtureError::Store(_))));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_build_without_store_fails_fast() {
        let result = FixtureReset::builder().reset::<Badge>().build();

        match result {
            Err(err @ FixtureError::MissingStore) => {
                assert!(err.to_string().contains("FixtureResetBuilder::store"));
            }
            other => panic!("expected MissingStore, got {other:?}"),
        }
    }
}
