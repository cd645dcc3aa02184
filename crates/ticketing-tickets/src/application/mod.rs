//! Application services for tickets.

pub mod repository;
