//! Background work for the collector.
//!
//! - Retention job (per-plan purge of events, sessions and reports)
//! - Scheduler (daily timer, environment gates, single-flight runs)
//! - Notifications (operator alerts)

pub mod error;
pub mod notifications;
pub mod retention;
pub mod scheduler;

pub use error::SchedulerError;
pub use notifications::{Notification, NotificationChannel, Notifier};
pub use retention::{AccountPurge, RetentionJob, RunSummary};
pub use scheduler::*;
