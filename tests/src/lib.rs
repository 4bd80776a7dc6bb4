//! Shared setup for the HTTP-level integration tests.

pub mod fixtures;
pub mod setup;
