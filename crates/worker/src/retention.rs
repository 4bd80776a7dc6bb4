//! Retention job: purges rows that fall outside each account's plan window.
//!
//! Every account is processed independently. A store failure for one account
//! is recorded in its [`AccountPurge`] and the run moves on; only failing to
//! list accounts aborts the run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use collector_core::store::Stores;
use collector_core::{retention_cutoff, Account, PlanCatalog};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SchedulerError;

/// Rows purged for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPurge {
    pub owner_id: Uuid,
    pub cutoff: Option<DateTime<Utc>>,
    pub events_deleted: u64,
    pub sessions_deleted: u64,
    pub reports_deleted: u64,
    pub error: Option<String>,
}

impl AccountPurge {
    pub fn rows_deleted(&self) -> u64 {
        self.events_deleted + self.sessions_deleted + self.reports_deleted
    }
}

/// Outcome of one retention run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Accounts with a finite retention window
    pub accounts_processed: usize,
    /// Accounts on unlimited retention
    pub accounts_skipped: usize,
    pub accounts_failed: usize,
    pub accounts: Vec<AccountPurge>,
}

impl RunSummary {
    pub fn rows_deleted(&self) -> u64 {
        self.accounts.iter().map(AccountPurge::rows_deleted).sum()
    }

    pub fn account(&self, owner_id: Uuid) -> Option<&AccountPurge> {
        self.accounts.iter().find(|a| a.owner_id == owner_id)
    }
}

pub struct RetentionJob {
    stores: Stores,
    plans: Arc<PlanCatalog>,
}

impl RetentionJob {
    pub fn new(stores: Stores, plans: Arc<PlanCatalog>) -> Self {
        Self { stores, plans }
    }

    /// Purges every account against `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, SchedulerError> {
        info!("Running retention job");

        let accounts = self
            .stores
            .directory
            .accounts()
            .await
            .map_err(|e| SchedulerError::Fatal(format!("listing accounts: {e}")))?;

        let mut summary = RunSummary {
            started_at: now,
            finished_at: now,
            accounts_processed: 0,
            accounts_skipped: 0,
            accounts_failed: 0,
            accounts: Vec::new(),
        };

        for account in &accounts {
            let plan = self.plans.resolve(&account.plan_id);
            let Some(cutoff) = retention_cutoff(now, plan.retention_months) else {
                summary.accounts_skipped += 1;
                continue;
            };

            let mut purge = AccountPurge {
                owner_id: account.owner_id,
                cutoff: Some(cutoff),
                ..Default::default()
            };

            if let Err(e) = self.purge_account(account, cutoff, &mut purge).await {
                warn!(owner_id = %account.owner_id, error = %e, "Retention failed for account");
                purge.error = Some(e.to_string());
                summary.accounts_failed += 1;
            }

            summary.accounts_processed += 1;
            summary.accounts.push(purge);
        }

        summary.finished_at = Utc::now();
        info!(
            accounts_processed = summary.accounts_processed,
            accounts_skipped = summary.accounts_skipped,
            accounts_failed = summary.accounts_failed,
            rows_deleted = summary.rows_deleted(),
            "Retention job complete"
        );
        Ok(summary)
    }

    /// Counts accumulate into `purge` so a mid-account failure keeps what was
    /// already deleted.
    async fn purge_account(
        &self,
        account: &Account,
        cutoff: DateTime<Utc>,
        purge: &mut AccountPurge,
    ) -> Result<(), SchedulerError> {
        let owner_id = account.owner_id;
        let job_error = |source| SchedulerError::Job { owner_id, source };

        let websites = self
            .stores
            .directory
            .websites_owned_by(owner_id)
            .await
            .map_err(job_error)?;

        for website_id in websites {
            purge.events_deleted += self
                .stores
                .events
                .delete_events_before(website_id, cutoff)
                .await
                .map_err(job_error)?;
            purge.sessions_deleted += self
                .stores
                .sessions
                .delete_sessions_before(website_id, cutoff)
                .await
                .map_err(job_error)?;
            purge.reports_deleted += self
                .stores
                .reports
                .delete_reports_before(website_id, cutoff)
                .await
                .map_err(job_error)?;
        }

        debug!(
            owner_id = %owner_id,
            cutoff = %cutoff,
            events = purge.events_deleted,
            sessions = purge.sessions_deleted,
            reports = purge.reports_deleted,
            "Purged account"
        );
        Ok(())
    }
}
