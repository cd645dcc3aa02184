//! Ticketing Store — `PostgreSQL` implementation of the document store.
//!
//! Every collection is a table of `(id, document JSONB)` rows. Declared
//! indexes become expression indexes over the document's top-level fields.

pub mod config;
pub mod pg_document_store;
pub mod sql;
