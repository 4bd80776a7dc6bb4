//! Common test setup functions.

use std::sync::Arc;

use api::{router, AppState};
use axum_test::TestServer;
use collector_core::store::{MemoryStore, Stores};
use collector_core::{Account, PlanCatalog, Website, YearMonth};
use ingest::{CollectConfig, IngestPipeline};
use uuid::Uuid;
use worker::{RetentionJob, RetentionScheduler, SchedulerConfig, SchedulerGates};

pub const TEST_SECRET: &str = "integration-test-secret";

/// Real router over the in-memory store.
///
/// The store doubles as the failure injector, the way a mock producer would
/// in a queue-backed setup. One account on the hobby plan owns one website.
pub struct TestContext {
    pub store: MemoryStore,
    pub scheduler: Arc<RetentionScheduler>,
    pub server: TestServer,
    pub owner_id: Uuid,
    pub website_id: Uuid,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(CollectConfig::default())
    }

    pub fn with_config(config: CollectConfig) -> Self {
        let store = MemoryStore::new();
        let owner_id = Uuid::new_v4();
        let website_id = Uuid::new_v4();
        store.add_account(Account::new(owner_id, "hobby"));
        store.add_website(Website::owned_by_user(website_id, owner_id));

        let stores = Stores::from_shared(Arc::new(store.clone()));
        let plans = Arc::new(PlanCatalog::default());

        let pipeline = Arc::new(IngestPipeline::new(
            stores.clone(),
            plans.clone(),
            TEST_SECRET,
            config,
        ));
        // Default gates are non-production: the timer never arms in tests
        let scheduler = Arc::new(RetentionScheduler::new(
            RetentionJob::new(stores, plans),
            SchedulerConfig::default(),
            SchedulerGates::default(),
        ));

        let server = TestServer::new(router(AppState::new(pipeline, scheduler.clone())))
            .expect("Failed to create test server");

        Self {
            store,
            scheduler,
            server,
            owner_id,
            website_id,
        }
    }

    /// Events counted against the owner this month.
    pub fn usage(&self) -> u64 {
        self.store.stored_usage(self.owner_id, YearMonth::current())
    }

    pub fn set_usage(&self, value: u64) {
        self.store
            .set_usage(self.owner_id, YearMonth::current(), value);
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
