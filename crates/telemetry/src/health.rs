//! Liveness and storage health shared across the process.
//!
//! The store is probed on startup and on every readiness check; the result is
//! kept here so logs and `/health` agree on the last known state. Scheduler
//! health is not tracked here, it is derived from the scheduler's own stats.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Last known state of the storage backend.
#[derive(Debug, Default)]
pub struct StorageHealth {
    connected: AtomicBool,
    /// Unix millis of the last probe, 0 when never probed
    checked_at: AtomicI64,
    last_error: RwLock<Option<String>>,
}

impl StorageHealth {
    pub const fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            checked_at: AtomicI64::new(0),
            last_error: RwLock::new(None),
        }
    }

    pub fn set_healthy(&self) {
        self.connected.store(true, Ordering::Relaxed);
        self.touch();
        *self.last_error.write() = None;
    }

    pub fn set_unhealthy(&self, error: impl Into<String>) {
        let error = error.into();
        if self.connected.swap(false, Ordering::Relaxed) {
            tracing::warn!(error = %error, "Storage became unreachable");
        }
        self.touch();
        *self.last_error.write() = Some(error);
    }

    pub fn is_healthy(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn checked_at(&self) -> Option<DateTime<Utc>> {
        match self.checked_at.load(Ordering::Relaxed) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    pub fn snapshot(&self) -> StorageStatus {
        StorageStatus {
            connected: self.is_healthy(),
            checked_at: self.checked_at(),
            last_error: self.last_error(),
        }
    }

    fn touch(&self) {
        self.checked_at
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

/// Serializable view of [`StorageHealth`].
#[derive(Debug, Clone, Serialize)]
pub struct StorageStatus {
    pub connected: bool,
    pub checked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Process-wide health registry.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    pub storage: StorageHealth,
}

impl HealthRegistry {
    pub const fn new() -> Self {
        Self {
            storage: StorageHealth::new(),
        }
    }

    /// The process answers requests; nothing here can make it not alive.
    pub fn is_alive(&self) -> bool {
        true
    }

    pub fn is_ready(&self) -> bool {
        self.storage.is_healthy()
    }
}

static HEALTH: LazyLock<HealthRegistry> = LazyLock::new(HealthRegistry::new);

/// Get the global health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
