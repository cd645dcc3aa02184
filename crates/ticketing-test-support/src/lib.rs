//! Shared test stores and fixtures for the ticketing service.

mod fixture;
mod store;

pub use fixture::{FixtureError, FixtureReset, FixtureResetBuilder};
pub use store::{FailingDocumentStore, InMemoryDocumentStore, StoreOperation};
