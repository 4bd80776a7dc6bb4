//! Connection handle for the analytics database.

use clickhouse::Client;
use tracing::{debug, info, warn};

use crate::config::ClickHouseConfig;

/// Pooled HTTP connection to ClickHouse, bound to the configured database.
///
/// Clones share the pool.
#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
    config: ClickHouseConfig,
}

impl ClickHouseClient {
    pub fn new(config: ClickHouseConfig) -> Self {
        let inner = connect(&config).with_database(&config.database);
        info!(url = %config.url, database = %config.database, "ClickHouse client ready");
        Self { inner, config }
    }

    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Same server and credentials with no default database, for DDL that
    /// must run before the database exists.
    pub fn server(&self) -> Client {
        connect(&self.config)
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    /// `SELECT 1` round trip.
    pub async fn is_reachable(&self) -> bool {
        match self.inner.query("SELECT 1").fetch_one::<u8>().await {
            Ok(_) => {
                debug!(database = %self.config.database, "ClickHouse reachable");
                true
            }
            Err(e) => {
                warn!(url = %self.config.url, error = %e, "ClickHouse unreachable");
                false
            }
        }
    }
}

fn connect(config: &ClickHouseConfig) -> Client {
    let client = Client::default().with_url(&config.url);
    let client = match &config.username {
        Some(user) => client.with_user(user),
        None => client,
    };
    match &config.password {
        Some(password) => client.with_password(password),
        None => client,
    }
}
