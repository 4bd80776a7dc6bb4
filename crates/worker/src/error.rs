use collector_core::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Retention failures.
///
/// `Job` is scoped to one account and recorded in the run summary. `Fatal`
/// aborts the whole run.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("retention job failed for account {owner_id}: {source}")]
    Job {
        owner_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("retention run failed: {0}")]
    Fatal(String),
}

impl SchedulerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
