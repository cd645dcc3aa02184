//! Ticketing — ticket entity and repository.
//!
//! Tickets are flat records keyed by a unique business identifier. All
//! storage mechanics are delegated to a `DocumentStore`.

pub mod application;
pub mod domain;
