//! Request validation.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::error::{Error, Result};
use crate::events::CollectRequest;
use crate::limits::{MAX_BODY_SIZE_BYTES, MAX_FUTURE_SKEW_SECS};

/// Validates raw body size BEFORE deserialization.
pub fn validate_body_size(raw_bytes: &[u8]) -> Result<()> {
    if raw_bytes.len() > MAX_BODY_SIZE_BYTES {
        return Err(Error::validation(format!(
            "body {}KB exceeds {}KB limit",
            raw_bytes.len() / 1024,
            MAX_BODY_SIZE_BYTES / 1024
        )));
    }
    Ok(())
}

/// Validates a collect request and returns the parsed website ID.
pub fn validate_request(request: &CollectRequest, now: DateTime<Utc>) -> Result<Uuid> {
    let payload = request.payload();

    payload
        .validate()
        .map_err(|e| Error::validation(format!("{}: {}", request.kind(), e)))?;

    let website_id = Uuid::parse_str(payload.website.trim())
        .map_err(|_| Error::validation("website must be a UUID"))?;

    if let Some(secs) = payload.timestamp {
        let at = payload
            .explicit_timestamp()
            .ok_or_else(|| Error::validation(format!("timestamp {secs} is out of range")))?;

        // Reject events claiming to be from the future (allow clock skew)
        if at > now + Duration::seconds(MAX_FUTURE_SKEW_SECS) {
            return Err(Error::validation(format!(
                "timestamp cannot be more than {MAX_FUTURE_SKEW_SECS}s in the future"
            )));
        }
    }

    if request.is_identify() && payload.data.is_none() && payload.distinct_id().is_none() {
        return Err(Error::validation("identify requires data or id"));
    }

    Ok(website_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectPayload;

    const SITE: &str = "7d1f3c3e-3f7a-4a5e-9a4b-6f1d2b3c4d5e";

    fn event(payload: CollectPayload) -> CollectRequest {
        CollectRequest::Event(payload)
    }

    fn base() -> CollectPayload {
        CollectPayload {
            website: SITE.into(),
            url: Some("/".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_event() {
        let id = validate_request(&event(base()), Utc::now()).unwrap();
        assert_eq!(id.to_string(), SITE);
    }

    #[test]
    fn test_website_must_be_uuid() {
        let mut payload = base();
        payload.website = "not-a-uuid".into();
        let err = validate_request(&event(payload), Utc::now()).unwrap_err();
        assert_eq!(err.error_code(), "VALID_001");
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let now = Utc::now();
        let mut payload = base();
        payload.timestamp = Some((now + Duration::seconds(60)).timestamp());
        assert!(validate_request(&event(payload), now).is_err());

        let mut payload = base();
        payload.timestamp = Some((now + Duration::seconds(3)).timestamp());
        assert!(validate_request(&event(payload), now).is_ok());
    }

    #[test]
    fn test_historical_timestamp_accepted() {
        let now = Utc::now();
        let mut payload = base();
        payload.timestamp = Some((now - Duration::days(10)).timestamp());
        assert!(validate_request(&event(payload), now).is_ok());
    }

    #[test]
    fn test_field_length_rejected() {
        let mut payload = base();
        payload.hostname = Some("h".repeat(101));
        assert!(validate_request(&event(payload), Utc::now()).is_err());
    }

    #[test]
    fn test_empty_identify_rejected() {
        let err = validate_request(&CollectRequest::Identify(base()), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("identify"));
    }

    #[test]
    fn test_body_size() {
        assert!(validate_body_size(&vec![b'x'; MAX_BODY_SIZE_BYTES]).is_ok());
        assert!(validate_body_size(&vec![b'x'; MAX_BODY_SIZE_BYTES + 1]).is_err());
    }
}
