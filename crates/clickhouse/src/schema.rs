//! ClickHouse table schemas.
//!
//! - String IDs (UUID text) for cross-client portability
//! - LowCardinality for enum-like fields
//! - DateTime64(3) for millisecond precision, written as epoch millis
//! - Replacing/Summing engines where rows are upserted

use collector_core::store::StoreResult;
use collector_core::StoreError;
use tracing::{debug, info};

use crate::client::ClickHouseClient;

/// Analytics events. Immutable once written.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    -- Core identifiers
    event_id String,
    website_id String,
    session_id String,
    visit_id String,
    created_at DateTime64(3, 'UTC'),

    -- Classification (1 = pageview, 2 = custom event)
    event_type UInt8,
    event_name String,

    -- Page and referrer
    url_path String,
    url_query String,
    referrer_path String,
    referrer_query String,
    referrer_domain String,
    page_title String,
    hostname LowCardinality(String),
    tag String,

    -- Campaign and ad-click IDs
    utm_source String,
    utm_medium String,
    utm_campaign String,
    utm_content String,
    utm_term String,
    gclid String,
    fbclid String,
    msclkid String,
    ttclid String,
    li_fat_id String,
    twclid String,

    -- Free-form JSON data
    data String
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(created_at)
ORDER BY (website_id, toStartOfHour(created_at), session_id, created_at)
SETTINGS index_granularity = 8192
"#;

/// Sessions. Duplicate inserts of one ID collapse on merge.
pub const CREATE_SESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id String,
    website_id String,
    browser LowCardinality(String),
    os LowCardinality(String),
    device LowCardinality(String),
    screen LowCardinality(String),
    language LowCardinality(String),
    country LowCardinality(String),
    region LowCardinality(String),
    city String,
    distinct_id Nullable(String),
    created_at DateTime64(3, 'UTC')
)
ENGINE = ReplacingMergeTree()
ORDER BY (website_id, session_id)
SETTINGS index_granularity = 8192
"#;

/// Identify attributes, latest row per session wins.
pub const CREATE_SESSION_DATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS session_data (
    website_id String,
    session_id String,
    distinct_id Nullable(String),
    data String,
    updated_at DateTime64(3, 'UTC')
)
ENGINE = ReplacingMergeTree(updated_at)
ORDER BY (website_id, session_id)
SETTINGS index_granularity = 8192
"#;

/// Monthly event counters. Deltas are summed on merge and on read.
pub const CREATE_USAGE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS usage (
    owner_id String,
    month UInt32,
    events Int64
)
ENGINE = SummingMergeTree(events)
ORDER BY (owner_id, month)
"#;

/// Saved reports.
pub const CREATE_REPORTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
    report_id String,
    website_id String,
    name String,
    created_at DateTime64(3, 'UTC')
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(created_at)
ORDER BY (website_id, created_at)
"#;

/// Billing accounts, synced from the dashboard.
pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    owner_id String,
    plan_id LowCardinality(String),
    has_access UInt8,
    updated_at DateTime DEFAULT now()
)
ENGINE = ReplacingMergeTree(updated_at)
ORDER BY owner_id
"#;

/// Websites, synced from the dashboard.
pub const CREATE_WEBSITES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS websites (
    website_id String,
    user_id Nullable(String),
    team_id Nullable(String),
    domain Nullable(String),
    updated_at DateTime DEFAULT now()
)
ENGINE = ReplacingMergeTree(updated_at)
ORDER BY website_id
"#;

/// Team ownership, synced from the dashboard.
pub const CREATE_TEAMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS teams (
    team_id String,
    owner_id String,
    updated_at DateTime DEFAULT now()
)
ENGINE = ReplacingMergeTree(updated_at)
ORDER BY team_id
"#;

/// All table DDL statements in creation order.
pub fn all_tables() -> Vec<&'static str> {
    vec![
        CREATE_EVENTS_TABLE,
        CREATE_SESSIONS_TABLE,
        CREATE_SESSION_DATA_TABLE,
        CREATE_USAGE_TABLE,
        CREATE_REPORTS_TABLE,
        CREATE_ACCOUNTS_TABLE,
        CREATE_WEBSITES_TABLE,
        CREATE_TEAMS_TABLE,
    ]
}

/// Tables purged by retention.
pub const RETENTION_TABLES: &[&str] = &["events", "sessions", "session_data", "reports"];

/// Retention tables whose rows may exist twice until a background merge.
pub const REPLACING_TABLES: &[&str] = &["sessions", "session_data"];

/// Initialize the database schema.
///
/// Creates the database and all tables if they don't exist.
pub async fn init_schema(client: &ClickHouseClient) -> StoreResult<()> {
    let create_db = format!("CREATE DATABASE IF NOT EXISTS {}", client.database());
    client
        .server()
        .query(&create_db)
        .execute()
        .await
        .map_err(|e| StoreError::backend(format!("Schema init error: {e}")))?;

    for sql in all_tables() {
        client
            .inner()
            .query(sql)
            .execute()
            .await
            .map_err(|e| StoreError::backend(format!("Schema init error: {e}")))?;
        debug!(ddl = sql.lines().nth(1).unwrap_or_default().trim(), "Applied DDL");
    }

    info!(database = client.database(), "ClickHouse schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_is_idempotent() {
        for ddl in all_tables() {
            assert!(ddl.contains("CREATE TABLE IF NOT EXISTS"));
        }
    }

    #[test]
    fn test_replacing_tables_use_replacing_engine() {
        for table in REPLACING_TABLES {
            let ddl = all_tables()
                .into_iter()
                .find(|ddl| ddl.contains(&format!("IF NOT EXISTS {table} (")))
                .unwrap();
            assert!(ddl.contains("ReplacingMergeTree"), "{table}");
        }
    }

    #[test]
    fn test_retention_tables_exist_in_schema() {
        let ddl = all_tables().join("\n");
        for table in RETENTION_TABLES {
            assert!(ddl.contains(&format!("IF NOT EXISTS {table} (")), "{table}");
        }
    }
}
