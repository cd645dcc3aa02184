//! Ticketing Core — shared document store abstractions.
//!
//! This crate defines the store handle trait, the declarative schema types
//! entities use to describe their collections and indexes, and the cold-start
//! index initializer. It contains no infrastructure code.

pub mod error;
pub mod indexes;
pub mod schema;
pub mod store;
