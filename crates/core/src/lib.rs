//! Core types, identity derivation and store contracts for the Pulse collector.

pub mod client;
pub mod error;
pub mod events;
pub mod identity;
pub mod limits;
pub mod plans;
pub mod retention;
pub mod schema;
pub mod session;
pub mod store;
pub mod tenant;
pub mod token;
pub mod urls;

pub use error::{Error, ErrorCode, Result, StoreError};
pub use events::*;
pub use plans::{Plan, PlanCatalog, PlanId, PlansConfig, Quota, RetentionWindow};
pub use retention::{retention_cutoff, YearMonth};
pub use session::*;
pub use tenant::*;
