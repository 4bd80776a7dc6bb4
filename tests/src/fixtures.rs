//! Test fixtures and request bodies.

use serde_json::{json, Value};
use uuid::Uuid;

pub const CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const FIREFOX: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";
pub const GOOGLEBOT: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

/// A pageview for `website`.
pub fn pageview(website: Uuid, url: &str) -> Value {
    json!({
        "type": "event",
        "payload": {
            "website": website.to_string(),
            "hostname": "example.com",
            "language": "en-US",
            "screen": "1920x1080",
            "title": "Example",
            "url": url,
            "referrer": "https://www.google.com/search?q=pulse",
        }
    })
}

/// A named custom event with attached data.
pub fn custom_event(website: Uuid, name: &str, data: Value) -> Value {
    json!({
        "type": "event",
        "payload": {
            "website": website.to_string(),
            "url": "/checkout",
            "name": name,
            "data": data,
        }
    })
}

/// An identify call attaching attributes to the session.
pub fn identify(website: Uuid, distinct_id: &str, data: Value) -> Value {
    json!({
        "type": "identify",
        "payload": {
            "website": website.to_string(),
            "id": distinct_id,
            "data": data,
        }
    })
}

/// A body larger than the accepted limit.
pub fn oversized(website: Uuid) -> String {
    let mut body = pageview(website, "/");
    body["payload"]["title"] = Value::String("x".repeat(70_000));
    body.to_string()
}
