//! Size limits and time windows for the collector.
//!
//! The `#[validate]` derive macro requires literal values in attributes,
//! so field limits are duplicated there. Keep both in sync when modifying.

use chrono::Duration;

// === Payload Limits ===

/// Maximum request body size in bytes (64KB).
pub const MAX_BODY_SIZE_BYTES: usize = 64 * 1024;

/// Maximum free-form data bag size in bytes (16KB).
pub const MAX_DATA_BYTES: usize = 16 * 1024;

// === String Field Limits (chars) ===

pub const MAX_HOSTNAME_LEN: usize = 100;
pub const MAX_LANGUAGE_LEN: usize = 35;
pub const MAX_SCREEN_LEN: usize = 11;
pub const MAX_EVENT_NAME_LEN: usize = 50;
pub const MAX_TAG_LEN: usize = 50;

/// Stored URL path/query max length.
pub const MAX_URL_LEN: usize = 500;

/// Stored page title max length.
pub const MAX_TITLE_LEN: usize = 500;

/// Stored domain max length.
pub const MAX_DOMAIN_LEN: usize = 500;

/// Stored campaign / click-id value max length.
pub const MAX_CAMPAIGN_LEN: usize = 255;

// === Timestamp Bounds ===

/// Maximum allowed clock skew for future timestamps (seconds).
pub const MAX_FUTURE_SKEW_SECS: i64 = 5;

// === Identity Windows ===

/// A visit rolls over once its token is older than this.
pub const VISIT_TIMEOUT_MINUTES: i64 = 30;

pub fn visit_timeout() -> Duration {
    Duration::minutes(VISIT_TIMEOUT_MINUTES)
}

// === Usage Ledger ===

/// Read-through cache TTL for monthly usage counters (5 minutes).
pub const USAGE_CACHE_TTL_SECS: u64 = 5 * 60;

/// Maximum cached usage entries.
pub const USAGE_CACHE_MAX_CAPACITY: u64 = 100_000;

// === Retention Scheduler ===

/// Scheduler is healthy while the last success is younger than this.
pub const SCHEDULER_HEALTHY_WINDOW_HOURS: i64 = 25;

/// Scheduler tolerates this many recorded failures before reporting unhealthy.
pub const SCHEDULER_MAX_ERRORS: u64 = 3;

/// Truncate a string to at most `max` characters.
pub fn truncate(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}
