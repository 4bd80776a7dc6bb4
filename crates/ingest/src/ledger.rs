//! Monthly usage counters with a read-through cache.
//!
//! The durable counter lives in a [`UsageStore`]. Reads are cached for five
//! minutes; every write invalidates the affected entry so the next read sees
//! the store value. Staleness between processes is bounded by the TTL.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use collector_core::limits::{USAGE_CACHE_MAX_CAPACITY, USAGE_CACHE_TTL_SECS};
use collector_core::store::UsageStore;
use collector_core::{Result, YearMonth};
use moka::future::Cache;
use tracing::debug;
use uuid::Uuid;

pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
    cache: Cache<(Uuid, YearMonth), u64>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self::with_ttl(store, Duration::from_secs(USAGE_CACHE_TTL_SECS))
    }

    pub fn with_ttl(store: Arc<dyn UsageStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: Cache::builder()
                .max_capacity(USAGE_CACHE_MAX_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Events counted for the owner this month.
    pub async fn get(&self, owner_id: Uuid) -> Result<u64> {
        self.get_month(owner_id, YearMonth::current()).await
    }

    pub async fn get_month(&self, owner_id: Uuid, month: YearMonth) -> Result<u64> {
        let key = (owner_id, month);

        // Check cache first
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let value = self.store.usage(owner_id, month).await?;
        self.cache.insert(key, value).await;
        Ok(value)
    }

    /// Adds `delta` to the month containing `effective_date`.
    pub async fn increment(
        &self,
        owner_id: Uuid,
        delta: u64,
        effective_date: DateTime<Utc>,
    ) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }

        let month = YearMonth::of(effective_date);
        let total = self.store.add_usage(owner_id, month, delta).await?;
        self.cache.invalidate(&(owner_id, month)).await;

        debug!(owner_id = %owner_id, month = %month, delta, total, "Usage incremented");
        Ok(())
    }

    /// Administrative reset of one month's counter.
    pub async fn reset(&self, owner_id: Uuid, month: YearMonth) -> Result<()> {
        self.store.reset_usage(owner_id, month).await?;
        self.cache.invalidate(&(owner_id, month)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use collector_core::store::MemoryStore;

    fn ledger() -> (MemoryStore, UsageLedger) {
        let store = MemoryStore::new();
        let ledger = UsageLedger::new(Arc::new(store.clone()));
        (store, ledger)
    }

    #[tokio::test]
    async fn test_increment_visible_exactly_once() {
        let (_, ledger) = ledger();
        let owner = Uuid::new_v4();
        let now = Utc::now();

        assert_eq!(ledger.get(owner).await.unwrap(), 0);
        ledger.increment(owner, 3, now).await.unwrap();
        assert_eq!(ledger.get(owner).await.unwrap(), 3);
        assert_eq!(ledger.get(owner).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cache_serves_until_invalidated() {
        let (store, ledger) = ledger();
        let owner = Uuid::new_v4();
        let month = YearMonth::current();

        assert_eq!(ledger.get(owner).await.unwrap(), 0);
        // Out-of-band write is not visible while cached
        store.set_usage(owner, month, 50);
        assert_eq!(ledger.get(owner).await.unwrap(), 0);

        ledger.increment(owner, 1, Utc::now()).await.unwrap();
        assert_eq!(ledger.get(owner).await.unwrap(), 51);
    }

    #[tokio::test]
    async fn test_zero_delta_is_noop() {
        let (store, ledger) = ledger();
        let owner = Uuid::new_v4();
        ledger.increment(owner, 0, Utc::now()).await.unwrap();
        assert_eq!(store.stored_usage(owner, YearMonth::current()), 0);
    }

    #[tokio::test]
    async fn test_historical_date_counts_against_its_month() {
        let (store, ledger) = ledger();
        let owner = Uuid::new_v4();
        let feb = Utc.with_ymd_and_hms(2024, 2, 10, 12, 0, 0).unwrap();

        ledger.increment(owner, 2, feb).await.unwrap();
        assert_eq!(store.stored_usage(owner, YearMonth::new(2024, 2)), 2);
        assert_eq!(
            ledger.get_month(owner, YearMonth::new(2024, 2)).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_reset() {
        let (_, ledger) = ledger();
        let owner = Uuid::new_v4();
        ledger.increment(owner, 9, Utc::now()).await.unwrap();
        assert_eq!(ledger.get(owner).await.unwrap(), 9);

        ledger.reset(owner, YearMonth::current()).await.unwrap();
        assert_eq!(ledger.get(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let (store, ledger) = ledger();
        store.set_fail_reads(true);
        let err = ledger.get(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.error_code(), "STORE_001");
    }
}
