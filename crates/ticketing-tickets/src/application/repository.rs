//! Ticket repository.
//!
//! The store facade tickets are saved and looked up through. Uniqueness of
//! `ticketId` is enforced by the store's unique index, not checked here.

use std::sync::Arc;

use async_trait::async_trait;
use ticketing_core::error::StoreError;
use ticketing_core::schema::Document;
use ticketing_core::store::{DocumentStore, Filter, StoredDocument};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::ticket::{TICKET_ID_FIELD, Ticket};

/// Repository trait for saving and finding tickets.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Inserts a new ticket and returns it with its storage id assigned.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateKey` if a ticket with the same
    /// `ticket_id` already exists; nothing is written in that case.
    async fn save(&self, ticket: Ticket) -> Result<Ticket, StoreError>;

    /// Finds the ticket with the given business identifier.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` only for store failures; a missing ticket is
    /// `Ok(None)`.
    async fn find_by_ticket_id(&self, ticket_id: &str) -> Result<Option<Ticket>, StoreError>;
}

/// `TicketRepository` backed by any `DocumentStore`.
#[derive(Clone)]
pub struct DocumentTicketRepository {
    store: Arc<dyn DocumentStore>,
}

impl DocumentTicketRepository {
    /// Creates a new `DocumentTicketRepository`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for DocumentTicketRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentTicketRepository").finish_non_exhaustive()
    }
}

#[async_trait]
impl TicketRepository for DocumentTicketRepository {
    #[instrument(skip(self, ticket), fields(ticket_id = %ticket.ticket_id))]
    async fn save(&self, mut ticket: Ticket) -> Result<Ticket, StoreError> {
        let id = ticket
            .id()
            .map_or_else(|| Uuid::now_v7().to_string(), str::to_owned);
        let stored = StoredDocument::from_document(id.clone(), &ticket)?;

        match self.store.insert(Ticket::COLLECTION, stored).await {
            Ok(()) => {
                ticket.set_id(id);
                debug!(id = ?ticket.id, "ticket saved");
                Ok(ticket)
            }
            Err(err) => {
                if err.is_duplicate_key() {
                    warn!(error = %err, "ticket rejected");
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    async fn find_by_ticket_id(&self, ticket_id: &str) -> Result<Option<Ticket>, StoreError> {
        let filter = Filter::eq(TICKET_ID_FIELD, ticket_id);
        self.store
            .find_one(Ticket::COLLECTION, &filter)
            .await?
            .map(StoredDocument::into_document)
            .transpose()
    }
}
