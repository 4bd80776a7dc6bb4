//! Storage contracts consumed by ingestion and retention.
//!
//! Every backend implements all five traits. [`Stores`] bundles them as trait
//! objects so a single concern can be swapped out (tests wrap sessions only).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StoreError;
use crate::events::Event;
use crate::retention::YearMonth;
use crate::session::{Session, SessionData};
use crate::tenant::{Account, Website};

mod memory;

pub use memory::MemoryStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, event: &Event) -> StoreResult<()>;

    /// Deletes events of one website created before `cutoff`. Returns the count.
    async fn delete_events_before(&self, website_id: Uuid, cutoff: DateTime<Utc>)
        -> StoreResult<u64>;

    /// Cheap connectivity probe.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_session(&self, website_id: Uuid, session_id: Uuid)
        -> StoreResult<Option<Session>>;

    /// Creates a session row. A duplicate ID yields [`StoreError::UniqueViolation`].
    async fn create_session(&self, session: &Session) -> StoreResult<()>;

    /// Merges attributes into the session's data bag and returns the result.
    async fn merge_session_data(
        &self,
        website_id: Uuid,
        session_id: Uuid,
        data: Map<String, Value>,
        distinct_id: Option<String>,
    ) -> StoreResult<SessionData>;

    async fn delete_sessions_before(
        &self,
        website_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn delete_reports_before(
        &self,
        website_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64>;
}

/// Durable monthly event counters.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn usage(&self, owner_id: Uuid, month: YearMonth) -> StoreResult<u64>;

    /// Adds `delta`, creating the counter if absent. Returns the new total.
    async fn add_usage(&self, owner_id: Uuid, month: YearMonth, delta: u64) -> StoreResult<u64>;

    async fn reset_usage(&self, owner_id: Uuid, month: YearMonth) -> StoreResult<()>;
}

/// Read-only view of accounts, teams and websites.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn website(&self, website_id: Uuid) -> StoreResult<Option<Website>>;

    async fn team_owner(&self, team_id: Uuid) -> StoreResult<Option<Uuid>>;

    async fn account(&self, owner_id: Uuid) -> StoreResult<Option<Account>>;

    async fn accounts(&self) -> StoreResult<Vec<Account>>;

    /// Websites owned directly or through teams the owner owns.
    async fn websites_owned_by(&self, owner_id: Uuid) -> StoreResult<Vec<Uuid>>;
}

/// A backend implementing every storage concern.
pub trait Store: EventStore + SessionStore + ReportStore + UsageStore + AccountDirectory {}

impl<T> Store for T where T: EventStore + SessionStore + ReportStore + UsageStore + AccountDirectory {}

/// Storage handles shared by the pipeline and the retention job.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub reports: Arc<dyn ReportStore>,
    pub usage: Arc<dyn UsageStore>,
    pub directory: Arc<dyn AccountDirectory>,
}

impl Stores {
    pub fn from_shared<S: Store + 'static>(store: Arc<S>) -> Self {
        Self {
            events: store.clone(),
            sessions: store.clone(),
            reports: store.clone(),
            usage: store.clone(),
            directory: store,
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
