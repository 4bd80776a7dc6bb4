//! ClickHouse storage backend for the collector.

pub mod client;
pub mod config;
pub mod rows;
pub mod schema;
pub mod store;

pub use client::*;
pub use config::*;
pub use schema::init_schema;
pub use store::ClickHouseStore;
