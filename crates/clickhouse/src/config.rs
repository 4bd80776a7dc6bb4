//! Connection settings, read from the `storage.clickhouse` config section.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    /// HTTP interface, e.g. `http://localhost:8123`
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Run `CREATE ... IF NOT EXISTS` for the database and tables at startup
    pub init_schema: bool,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".into(),
            database: "pulse".into(),
            username: None,
            password: None,
            init_schema: true,
        }
    }
}

impl ClickHouseConfig {
    /// Defaults pointed at `url`.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}
