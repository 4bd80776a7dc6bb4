//! Session handling types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::client::ClientInfo;

/// A visitor session. Created at most once per (website_id, id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Deterministic session ID
    pub id: Uuid,
    pub website_id: Uuid,
    pub browser: String,
    pub os: String,
    pub device: String,
    pub screen: String,
    pub language: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    /// Externally supplied stable ID
    pub distinct_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Builds a session row from resolved client attributes.
    pub fn new(
        id: Uuid,
        website_id: Uuid,
        client: &ClientInfo,
        distinct_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            website_id,
            browser: client.browser.clone(),
            os: client.os.clone(),
            device: client.device.clone(),
            screen: client.screen.clone(),
            language: client.language.clone(),
            country: client.country.clone(),
            region: client.region.clone(),
            city: client.city.clone(),
            distinct_id,
            created_at,
        }
    }
}

/// Free-form attributes attached to a session through `identify`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub website_id: Uuid,
    pub session_id: Uuid,
    pub distinct_id: Option<String>,
    pub data: Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

impl SessionData {
    /// Merges new attributes over the existing bag (last write wins per key).
    pub fn merge(&mut self, data: Map<String, Value>, distinct_id: Option<String>) {
        for (key, value) in data {
            self.data.insert(key, value);
        }
        if distinct_id.is_some() {
            self.distinct_id = distinct_id;
        }
        self.updated_at = Utc::now();
    }
}

/// Identifiers handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub visit_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites_keys_and_keeps_others() {
        let mut bag = SessionData::default();
        let first = json!({"plan": "free", "country": "NZ"});
        bag.merge(first.as_object().unwrap().clone(), Some("u-1".into()));

        let second = json!({"plan": "pro"});
        bag.merge(second.as_object().unwrap().clone(), None);

        assert_eq!(bag.data["plan"], "pro");
        assert_eq!(bag.data["country"], "NZ");
        assert_eq!(bag.distinct_id.as_deref(), Some("u-1"));
    }
}
