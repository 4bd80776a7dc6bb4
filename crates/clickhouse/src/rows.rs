//! Row types mapping domain values onto ClickHouse columns.

use chrono::{DateTime, TimeZone, Utc};
use clickhouse::Row;
use collector_core::store::StoreResult;
use collector_core::{
    Account, Campaign, Event, PlanId, Session, SessionData, StoreError, Website,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub(crate) fn parse_uuid(raw: &str, column: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StoreError::backend(format!("invalid {column} '{raw}': {e}")))
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn parse_data(raw: &str) -> Map<String, Value> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Flattened event row for ClickHouse insertion.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct EventRow {
    pub event_id: String,
    pub website_id: String,
    pub session_id: String,
    pub visit_id: String,
    pub created_at: i64, // milliseconds since epoch
    pub event_type: u8,
    pub event_name: String,
    pub url_path: String,
    pub url_query: String,
    pub referrer_path: String,
    pub referrer_query: String,
    pub referrer_domain: String,
    pub page_title: String,
    pub hostname: String,
    pub tag: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub utm_content: String,
    pub utm_term: String,
    pub gclid: String,
    pub fbclid: String,
    pub msclkid: String,
    pub ttclid: String,
    pub li_fat_id: String,
    pub twclid: String,
    pub data: String,
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        let Campaign {
            utm_source,
            utm_medium,
            utm_campaign,
            utm_content,
            utm_term,
            gclid,
            fbclid,
            msclkid,
            ttclid,
            li_fat_id,
            twclid,
        } = event.campaign.clone();

        Self {
            event_id: event.id.to_string(),
            website_id: event.website_id.to_string(),
            session_id: event.session_id.to_string(),
            visit_id: event.visit_id.to_string(),
            created_at: event.created_at.timestamp_millis(),
            event_type: event.event_type.as_u8(),
            event_name: event.event_name.clone().unwrap_or_default(),
            url_path: event.url_path.clone(),
            url_query: event.url_query.clone(),
            referrer_path: event.referrer_path.clone(),
            referrer_query: event.referrer_query.clone(),
            referrer_domain: event.referrer_domain.clone(),
            page_title: event.page_title.clone(),
            hostname: event.hostname.clone(),
            tag: event.tag.clone().unwrap_or_default(),
            utm_source: utm_source.unwrap_or_default(),
            utm_medium: utm_medium.unwrap_or_default(),
            utm_campaign: utm_campaign.unwrap_or_default(),
            utm_content: utm_content.unwrap_or_default(),
            utm_term: utm_term.unwrap_or_default(),
            gclid: gclid.unwrap_or_default(),
            fbclid: fbclid.unwrap_or_default(),
            msclkid: msclkid.unwrap_or_default(),
            ttclid: ttclid.unwrap_or_default(),
            li_fat_id: li_fat_id.unwrap_or_default(),
            twclid: twclid.unwrap_or_default(),
            data: event
                .data
                .as_ref()
                .map(|d| Value::Object(d.clone()).to_string())
                .unwrap_or_else(|| "{}".to_string()),
        }
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct SessionRow {
    pub session_id: String,
    pub website_id: String,
    pub browser: String,
    pub os: String,
    pub device: String,
    pub screen: String,
    pub language: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub distinct_id: Option<String>,
    pub created_at: i64,
}

impl From<&Session> for SessionRow {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.to_string(),
            website_id: session.website_id.to_string(),
            browser: session.browser.clone(),
            os: session.os.clone(),
            device: session.device.clone(),
            screen: session.screen.clone(),
            language: session.language.clone(),
            country: session.country.clone().unwrap_or_default(),
            region: session.region.clone().unwrap_or_default(),
            city: session.city.clone().unwrap_or_default(),
            distinct_id: session.distinct_id.clone(),
            created_at: session.created_at.timestamp_millis(),
        }
    }
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> StoreResult<Self> {
        let non_empty = |s: String| Some(s).filter(|s| !s.is_empty());
        Ok(Self {
            id: parse_uuid(&row.session_id, "session_id")?,
            website_id: parse_uuid(&row.website_id, "website_id")?,
            browser: row.browser,
            os: row.os,
            device: row.device,
            screen: row.screen,
            language: row.language,
            country: non_empty(row.country),
            region: non_empty(row.region),
            city: non_empty(row.city),
            distinct_id: row.distinct_id,
            created_at: from_millis(row.created_at),
        })
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct SessionDataRow {
    pub website_id: String,
    pub session_id: String,
    pub distinct_id: Option<String>,
    pub data: String,
    pub updated_at: i64,
}

impl From<&SessionData> for SessionDataRow {
    fn from(bag: &SessionData) -> Self {
        Self {
            website_id: bag.website_id.to_string(),
            session_id: bag.session_id.to_string(),
            distinct_id: bag.distinct_id.clone(),
            data: Value::Object(bag.data.clone()).to_string(),
            updated_at: bag.updated_at.timestamp_millis(),
        }
    }
}

impl TryFrom<SessionDataRow> for SessionData {
    type Error = StoreError;

    fn try_from(row: SessionDataRow) -> StoreResult<Self> {
        Ok(Self {
            website_id: parse_uuid(&row.website_id, "website_id")?,
            session_id: parse_uuid(&row.session_id, "session_id")?,
            distinct_id: row.distinct_id,
            data: parse_data(&row.data),
            updated_at: from_millis(row.updated_at),
        })
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct UsageRow {
    pub owner_id: String,
    /// YYYYMM
    pub month: u32,
    pub events: i64,
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct AccountRow {
    pub owner_id: String,
    pub plan_id: String,
    pub has_access: u8,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> StoreResult<Self> {
        Ok(Self {
            owner_id: parse_uuid(&row.owner_id, "owner_id")?,
            plan_id: PlanId::new(row.plan_id),
            has_access: row.has_access != 0,
        })
    }
}

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct WebsiteRow {
    pub website_id: String,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
    pub domain: Option<String>,
}

impl TryFrom<WebsiteRow> for Website {
    type Error = StoreError;

    fn try_from(row: WebsiteRow) -> StoreResult<Self> {
        Ok(Self {
            id: parse_uuid(&row.website_id, "website_id")?,
            user_id: row
                .user_id
                .as_deref()
                .map(|id| parse_uuid(id, "user_id"))
                .transpose()?,
            team_id: row
                .team_id
                .as_deref()
                .map(|id| parse_uuid(id, "team_id"))
                .transpose()?,
            domain: row.domain,
        })
    }
}
