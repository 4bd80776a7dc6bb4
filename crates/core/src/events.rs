//! Collect request and stored event definitions.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::limits::MAX_DATA_BYTES;

/// Validates free-form data bag size.
fn validate_data_size(data: &Map<String, Value>) -> Result<(), ValidationError> {
    let size = serde_json::to_vec(data).map(|v| v.len()).unwrap_or(0);

    if size > MAX_DATA_BYTES {
        let mut err = ValidationError::new("data_too_large");
        err.message = Some(
            format!(
                "data {}KB exceeds {}KB limit",
                size / 1024,
                MAX_DATA_BYTES / 1024
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Payload sent by the tracker script or an API client (camelCase).
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CollectPayload {
    /// Website ID (UUID format)
    pub website: String,
    /// Free-form data (event data or identify attributes, max 16KB)
    #[validate(custom(function = "validate_data_size"))]
    pub data: Option<Map<String, Value>>,
    #[validate(length(max = 100))]
    pub hostname: Option<String>,
    #[validate(length(max = 35))]
    pub language: Option<String>,
    pub referrer: Option<String>,
    /// Screen dimensions, e.g. "1920x1080"
    #[validate(length(max = 11))]
    pub screen: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    /// Custom event name; absent for pageviews
    #[validate(length(max = 50))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub tag: Option<String>,
    /// Client IP override (server-side senders)
    #[validate(length(max = 45))]
    pub ip: Option<String>,
    /// User agent override (server-side senders)
    #[validate(length(max = 512))]
    pub user_agent: Option<String>,
    /// Explicit event time in Unix seconds. Marks the request as historical.
    pub timestamp: Option<i64>,
    /// Stable external distinct ID
    #[validate(length(max = 50))]
    pub id: Option<String>,
}

impl CollectPayload {
    /// Explicit historical timestamp, if one was supplied.
    pub fn explicit_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    /// Distinct ID, ignoring empty strings.
    pub fn distinct_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Collect request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum CollectRequest {
    /// Pageview or custom event
    Event(CollectPayload),
    /// Attach attributes to the session
    Identify(CollectPayload),
}

impl CollectRequest {
    pub fn payload(&self) -> &CollectPayload {
        match self {
            Self::Event(p) | Self::Identify(p) => p,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => "event",
            Self::Identify(_) => "identify",
        }
    }

    pub fn is_identify(&self) -> bool {
        matches!(self, Self::Identify(_))
    }
}

/// Stored event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Pageview,
    CustomEvent,
}

impl EventType {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Pageview => 1,
            Self::CustomEvent => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Pageview),
            2 => Some(Self::CustomEvent),
            _ => None,
        }
    }
}

/// Campaign and ad-click parameters lifted out of the page URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
    pub gclid: Option<String>,
    pub fbclid: Option<String>,
    pub msclkid: Option<String>,
    pub ttclid: Option<String>,
    pub li_fat_id: Option<String>,
    pub twclid: Option<String>,
}

/// A persisted analytics event. Written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub website_id: Uuid,
    pub session_id: Uuid,
    pub visit_id: Uuid,
    /// Logical event time (may be historical)
    pub created_at: DateTime<Utc>,
    pub event_type: EventType,
    pub event_name: Option<String>,
    pub url_path: String,
    pub url_query: String,
    pub referrer_path: String,
    pub referrer_query: String,
    pub referrer_domain: String,
    pub page_title: String,
    pub hostname: String,
    pub tag: Option<String>,
    #[serde(flatten)]
    pub campaign: Campaign,
    pub data: Option<Map<String, Value>>,
}
