//! The `Ticket` entity.

use serde::{Deserialize, Serialize};
use ticketing_core::schema::{CollectionSchema, Document, IndexSpec};

/// Collection holding ticket documents.
pub const TICKETS_COLLECTION: &str = "tickets";

/// Field carrying the unique business identifier.
pub const TICKET_ID_FIELD: &str = "ticketId";

/// A support ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Storage identifier, assigned by the store on first save.
    #[serde(skip)]
    pub id: Option<String>,
    /// Business identifier, unique across all tickets.
    pub ticket_id: String,
    /// Free-form content.
    pub content: String,
}

impl Ticket {
    /// Creates an unsaved ticket.
    #[must_use]
    pub fn new(ticket_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            ticket_id: ticket_id.into(),
            content: content.into(),
        }
    }

    /// The collection schema for tickets.
    #[must_use]
    pub fn schema() -> CollectionSchema {
        CollectionSchema::of::<Self>()
    }
}

impl Document for Ticket {
    const COLLECTION: &'static str = TICKETS_COLLECTION;

    fn indexes() -> Vec<IndexSpec> {
        vec![IndexSpec::ascending(TICKET_ID_FIELD).unique()]
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }
}
