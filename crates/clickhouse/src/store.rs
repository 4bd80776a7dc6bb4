//! [`Store`](collector_core::store::Store) backed by ClickHouse.
//!
//! Sessions and session data live in ReplacingMergeTree tables, so a second
//! insert of the same session collapses on merge instead of failing. Reads use
//! `FINAL` to see the collapsed state. Usage counters are summed deltas.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Client;
use collector_core::store::{
    AccountDirectory, EventStore, ReportStore, SessionStore, StoreResult, UsageStore,
};
use collector_core::{Account, Event, Session, SessionData, StoreError, Website, YearMonth};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::ClickHouseClient;
use crate::schema::REPLACING_TABLES;
use crate::rows::{AccountRow, EventRow, SessionDataRow, SessionRow, UsageRow, WebsiteRow};

fn backend(context: &'static str) -> impl Fn(clickhouse::error::Error) -> StoreError {
    move |e| StoreError::backend(format!("{context}: {e}"))
}

#[derive(Clone)]
pub struct ClickHouseStore {
    client: ClickHouseClient,
}

impl ClickHouseStore {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }

    fn db(&self) -> &Client {
        self.client.inner()
    }

    /// Counts then deletes rows of one website older than `cutoff`.
    ///
    /// The delete is a synchronous mutation so the count reflects what is gone
    /// once this returns. Replacing tables are counted `FINAL` so unmerged
    /// duplicates of one row count once.
    async fn purge(
        &self,
        table: &'static str,
        website_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let website = website_id.to_string();
        let cutoff_ms = cutoff.timestamp_millis();
        let modifier = if REPLACING_TABLES.contains(&table) {
            " FINAL"
        } else {
            ""
        };

        let count: u64 = self
            .db()
            .query(&format!(
                "SELECT count() FROM {table}{modifier} \
                 WHERE website_id = ? AND created_at < fromUnixTimestamp64Milli(?)"
            ))
            .bind(&website)
            .bind(cutoff_ms)
            .fetch_one()
            .await
            .map_err(backend("count before purge"))?;

        if count == 0 {
            return Ok(0);
        }

        self.db()
            .clone()
            .with_option("mutations_sync", "1")
            .query(&format!(
                "ALTER TABLE {table} DELETE \
                 WHERE website_id = ? AND created_at < fromUnixTimestamp64Milli(?)"
            ))
            .bind(&website)
            .bind(cutoff_ms)
            .execute()
            .await
            .map_err(backend("purge"))?;

        debug!(table, website_id = %website_id, count, "Purged rows");
        Ok(count)
    }

    async fn insert_row<T>(&self, table: &'static str, row: &T) -> StoreResult<()>
    where
        T: clickhouse::Row + serde::Serialize,
    {
        let mut insert = self.db().insert(table).map_err(backend("insert"))?;
        insert.write(row).await.map_err(backend("insert write"))?;
        insert.end().await.map_err(backend("insert end"))?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for ClickHouseStore {
    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        self.insert_row("events", &EventRow::from(event)).await
    }

    async fn delete_events_before(
        &self,
        website_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.purge("events", website_id, cutoff).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.db()
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .map_err(backend("ping"))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for ClickHouseStore {
    async fn find_session(
        &self,
        website_id: Uuid,
        session_id: Uuid,
    ) -> StoreResult<Option<Session>> {
        let row = self
            .db()
            .query(
                "SELECT ?fields FROM sessions FINAL \
                 WHERE website_id = ? AND session_id = ? LIMIT 1",
            )
            .bind(website_id.to_string())
            .bind(session_id.to_string())
            .fetch_optional::<SessionRow>()
            .await
            .map_err(backend("find session"))?;

        row.map(Session::try_from).transpose()
    }

    async fn create_session(&self, session: &Session) -> StoreResult<()> {
        self.insert_row("sessions", &SessionRow::from(session)).await
    }

    async fn merge_session_data(
        &self,
        website_id: Uuid,
        session_id: Uuid,
        data: Map<String, Value>,
        distinct_id: Option<String>,
    ) -> StoreResult<SessionData> {
        let existing = self
            .db()
            .query(
                "SELECT ?fields FROM session_data FINAL \
                 WHERE website_id = ? AND session_id = ? LIMIT 1",
            )
            .bind(website_id.to_string())
            .bind(session_id.to_string())
            .fetch_optional::<SessionDataRow>()
            .await
            .map_err(backend("read session data"))?;

        let mut bag = match existing {
            Some(row) => SessionData::try_from(row)?,
            None => SessionData {
                website_id,
                session_id,
                ..Default::default()
            },
        };
        bag.merge(data, distinct_id);

        self.insert_row("session_data", &SessionDataRow::from(&bag))
            .await?;
        Ok(bag)
    }

    async fn delete_sessions_before(
        &self,
        website_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let sessions = self.purge("sessions", website_id, cutoff).await?;

        // session_data has no created_at; drop bags whose session is gone.
        self.db()
            .clone()
            .with_option("mutations_sync", "1")
            .query(
                "ALTER TABLE session_data DELETE WHERE website_id = ? \
                 AND session_id NOT IN (SELECT session_id FROM sessions WHERE website_id = ?)",
            )
            .bind(website_id.to_string())
            .bind(website_id.to_string())
            .execute()
            .await
            .map_err(backend("purge session data"))?;

        Ok(sessions)
    }
}

#[async_trait]
impl ReportStore for ClickHouseStore {
    async fn delete_reports_before(
        &self,
        website_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.purge("reports", website_id, cutoff).await
    }
}

#[async_trait]
impl UsageStore for ClickHouseStore {
    async fn usage(&self, owner_id: Uuid, month: YearMonth) -> StoreResult<u64> {
        let total: i64 = self
            .db()
            .query("SELECT sum(events) FROM usage WHERE owner_id = ? AND month = ?")
            .bind(owner_id.to_string())
            .bind(month.partition_id())
            .fetch_one()
            .await
            .map_err(backend("read usage"))?;

        Ok(total.max(0) as u64)
    }

    async fn add_usage(&self, owner_id: Uuid, month: YearMonth, delta: u64) -> StoreResult<u64> {
        let events = i64::try_from(delta)
            .map_err(|_| StoreError::backend(format!("usage delta {delta} out of range")))?;

        self.insert_row(
            "usage",
            &UsageRow {
                owner_id: owner_id.to_string(),
                month: month.partition_id(),
                events,
            },
        )
        .await?;

        self.usage(owner_id, month).await
    }

    async fn reset_usage(&self, owner_id: Uuid, month: YearMonth) -> StoreResult<()> {
        let current = self.usage(owner_id, month).await?;
        if current == 0 {
            return Ok(());
        }

        // Offsetting delta; merges settle the row at zero.
        self.insert_row(
            "usage",
            &UsageRow {
                owner_id: owner_id.to_string(),
                month: month.partition_id(),
                events: -(current as i64),
            },
        )
        .await
    }
}

#[async_trait]
impl AccountDirectory for ClickHouseStore {
    async fn website(&self, website_id: Uuid) -> StoreResult<Option<Website>> {
        let row = self
            .db()
            .query("SELECT ?fields FROM websites FINAL WHERE website_id = ? LIMIT 1")
            .bind(website_id.to_string())
            .fetch_optional::<WebsiteRow>()
            .await
            .map_err(backend("read website"))?;

        row.map(Website::try_from).transpose()
    }

    async fn team_owner(&self, team_id: Uuid) -> StoreResult<Option<Uuid>> {
        let owner = self
            .db()
            .query("SELECT owner_id FROM teams FINAL WHERE team_id = ? LIMIT 1")
            .bind(team_id.to_string())
            .fetch_optional::<String>()
            .await
            .map_err(backend("read team"))?;

        owner
            .map(|id| crate::rows::parse_uuid(&id, "owner_id"))
            .transpose()
    }

    async fn account(&self, owner_id: Uuid) -> StoreResult<Option<Account>> {
        let row = self
            .db()
            .query("SELECT ?fields FROM accounts FINAL WHERE owner_id = ? LIMIT 1")
            .bind(owner_id.to_string())
            .fetch_optional::<AccountRow>()
            .await
            .map_err(backend("read account"))?;

        row.map(Account::try_from).transpose()
    }

    async fn accounts(&self) -> StoreResult<Vec<Account>> {
        let rows = self
            .db()
            .query("SELECT ?fields FROM accounts FINAL ORDER BY owner_id")
            .fetch_all::<AccountRow>()
            .await
            .map_err(backend("list accounts"))?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            match Account::try_from(row) {
                Ok(account) => accounts.push(account),
                Err(e) => warn!(error = %e, "Skipping malformed account row"),
            }
        }
        Ok(accounts)
    }

    async fn websites_owned_by(&self, owner_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let owner = owner_id.to_string();
        let ids = self
            .db()
            .query(
                "SELECT website_id FROM websites FINAL \
                 WHERE user_id = ? \
                 OR team_id IN (SELECT team_id FROM teams FINAL WHERE owner_id = ?) \
                 ORDER BY website_id",
            )
            .bind(&owner)
            .bind(&owner)
            .fetch_all::<String>()
            .await
            .map_err(backend("list websites"))?;

        ids.iter()
            .map(|id| crate::rows::parse_uuid(id, "website_id"))
            .collect()
    }
}
