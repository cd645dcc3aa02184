//! Ticketing service — application wiring.
//!
//! Connects the document store, builds every declared index and hands out the
//! ticket repository.

use std::sync::Arc;

use ticketing_core::error::StoreError;
use ticketing_core::indexes::ensure_indexes;
use ticketing_core::schema::CollectionSchema;
use ticketing_core::store::DocumentStore;
use ticketing_store::config::StoreConfig;
use ticketing_store::pg_document_store::PgDocumentStore;
use ticketing_tickets::application::repository::DocumentTicketRepository;
use ticketing_tickets::domain::ticket::Ticket;
use tracing::info;

pub mod error;

use crate::error::AppError;

/// Every collection the service persists.
#[must_use]
pub fn schemas() -> Vec<CollectionSchema> {
    vec![Ticket::schema()]
}

/// Builds the indexes of every persisted collection.
///
/// # Errors
///
/// Returns the first `StoreError` raised while building an index.
pub async fn initialize(store: &dyn DocumentStore) -> Result<(), StoreError> {
    ensure_indexes(store, &schemas()).await
}

/// A connected, initialized application.
#[derive(Debug, Clone)]
pub struct Application {
    /// The shared store handle.
    pub store: Arc<PgDocumentStore>,
    /// Ticket repository over `store`.
    pub tickets: DocumentTicketRepository,
}

impl Application {
    /// Connects using `config` and builds every declared index.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the store cannot be reached and
    /// `AppError::Store` if index initialization fails.
    pub async fn bootstrap(config: &StoreConfig) -> Result<Self, AppError> {
        let pool = config.connect().await?;
        let store = Arc::new(PgDocumentStore::new(pool));
        initialize(&*store).await?;
        info!(collections = schemas().len(), "document store initialized");

        let handle: Arc<dyn DocumentStore> = store.clone();
        Ok(Self {
            store,
            tickets: DocumentTicketRepository::new(handle),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ticketing_core::store::DocumentStore;
    use ticketing_test_support::{FixtureReset, InMemoryDocumentStore};

    use super::*;

    #[tokio::test]
    async fn test_initialize_builds_ticket_indexes() {
        let store = InMemoryDocumentStore::new();

        initialize(&store).await.unwrap();

        assert_eq!(
            store.list_indexes("tickets").await.unwrap(),
            vec!["_id_", "ticketId_1"]
        );
    }

    #[tokio::test]
    async fn test_fixture_reset_matches_cold_start_indexes() {
        // Arrange
        let cold = InMemoryDocumentStore::new();
        initialize(&cold).await.unwrap();

        let reset = Arc::new(InMemoryDocumentStore::new());
        let handle: Arc<dyn DocumentStore> = reset.clone();
        let fixture = FixtureReset::new(handle, schemas());

        // Act
        fixture.before().await.unwrap();

        // Assert
        for schema in schemas() {
            assert_eq!(
                cold.list_indexes(schema.collection).await.unwrap(),
                reset.list_indexes(schema.collection).await.unwrap()
            );
        }
    }
}
