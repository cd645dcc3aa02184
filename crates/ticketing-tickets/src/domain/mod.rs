//! Domain types for tickets.

pub mod ticket;
