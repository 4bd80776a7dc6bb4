//! Unified error types for the collector.
//!
//! Error codes:
//! - VALID_001: Malformed payload
//! - SITE_001: Unknown website or unresolvable owner
//! - ACCESS_001: Owner access suspended
//! - LIMIT_001: Monthly event limit exceeded
//! - STORE_001: Durable store write failure
//! - INTERNAL_001: Anything else

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable outcome codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// VALID_001: Malformed payload
    Validation,
    /// SITE_001: Website not found
    NotFound,
    /// ACCESS_001: Owner access suspended
    AccessDenied,
    /// LIMIT_001: Monthly event limit exceeded
    LimitExceeded,
    /// STORE_001: Store write failed
    TransientStore,
    /// INTERNAL_001: Internal error
    Internal,
}

impl ErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation => "VALID_001",
            Self::NotFound => "SITE_001",
            Self::AccessDenied => "ACCESS_001",
            Self::LimitExceeded => "LIMIT_001",
            Self::TransientStore => "STORE_001",
            Self::Internal => "INTERNAL_001",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::AccessDenied => 403,
            Self::LimitExceeded => 429,
            Self::TransientStore => 503,
            Self::Internal => 500,
        }
    }
}

/// Storage-layer error returned by every store trait.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same unique key already exists.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

/// Unified error type for the collector.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Quota rejection. Always produced before any event write.
    #[error("monthly event limit exceeded for owner {owner_id}: {usage}/{quota}")]
    LimitExceeded {
        owner_id: String,
        usage: u64,
        quota: u64,
    },

    #[error("store error: {0}")]
    TransientStore(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the outcome code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) | Self::Serialization(_) => ErrorCode::Validation,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::AccessDenied(_) => ErrorCode::AccessDenied,
            Self::LimitExceeded { .. } => ErrorCode::LimitExceeded,
            Self::TransientStore(_) => ErrorCode::TransientStore,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        self.code().http_status()
    }

    /// Get the machine-readable error code string.
    pub fn error_code(&self) -> &'static str {
        self.code().code()
    }

    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::Validation.code(), "VALID_001");
        assert_eq!(ErrorCode::NotFound.code(), "SITE_001");
        assert_eq!(ErrorCode::AccessDenied.code(), "ACCESS_001");
        assert_eq!(ErrorCode::LimitExceeded.code(), "LIMIT_001");
        assert_eq!(ErrorCode::TransientStore.code(), "STORE_001");
    }

    #[test]
    fn test_limit_exceeded_is_distinct() {
        let limit = Error::LimitExceeded {
            owner_id: "o".into(),
            usage: 10,
            quota: 10,
        };
        let invalid = Error::validation("bad");
        let denied = Error::access_denied("suspended");

        assert_eq!(limit.http_status(), 429);
        assert_ne!(limit.error_code(), invalid.error_code());
        assert_ne!(limit.error_code(), denied.error_code());
        assert!(limit.is_limit_exceeded());
        assert!(!denied.is_limit_exceeded());
    }

    #[test]
    fn test_store_error_maps_to_transient() {
        let err: Error = StoreError::backend("connection reset").into();
        assert_eq!(err.code(), ErrorCode::TransientStore);
        assert_eq!(err.http_status(), 503);
    }
}
