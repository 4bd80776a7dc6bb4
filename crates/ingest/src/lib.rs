//! Event ingestion: the collect pipeline and the quota machinery behind it.
//!
//! - [`pipeline`]: validate, resolve owner, admit, enrich and persist
//! - [`admission`]: per-owner monthly event limits
//! - [`ledger`]: cached monthly usage counters

pub mod admission;
pub mod ledger;
pub mod pipeline;

pub use admission::{Admission, AdmissionController};
pub use ledger::UsageLedger;
pub use pipeline::{CollectConfig, CollectContext, CollectOutcome, IngestPipeline};
