//! Monthly event quota enforcement.
//!
//! Check and increment are separate steps, so concurrent requests near the
//! limit can overshoot it slightly. The quota is a soft limit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use collector_core::store::AccountDirectory;
use collector_core::{Account, Error, PlanCatalog, Quota, Result};
use tracing::debug;
use uuid::Uuid;

use crate::ledger::UsageLedger;

/// Result of evaluating an account against its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Unlimited,
    Allowed { usage: u64, quota: u64 },
    Rejected { usage: u64, quota: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Converts a rejection into [`Error::LimitExceeded`].
    pub fn require(self, owner_id: Uuid) -> Result<()> {
        match self {
            Self::Rejected { usage, quota } => Err(Error::LimitExceeded {
                owner_id: owner_id.to_string(),
                usage,
                quota,
            }),
            _ => Ok(()),
        }
    }
}

pub struct AdmissionController {
    directory: Arc<dyn AccountDirectory>,
    plans: Arc<PlanCatalog>,
    ledger: Arc<UsageLedger>,
}

impl AdmissionController {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        plans: Arc<PlanCatalog>,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        Self {
            directory,
            plans,
            ledger,
        }
    }

    /// Whether the owner may record another event this month.
    pub async fn check_event_limit(&self, owner_id: Uuid) -> Result<bool> {
        let account = self
            .directory
            .account(owner_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("account {owner_id}")))?;

        Ok(self.evaluate(&account).await?.is_allowed())
    }

    /// Evaluates an already loaded account.
    pub async fn evaluate(&self, account: &Account) -> Result<Admission> {
        let plan = self.plans.resolve(&account.plan_id);

        let quota = match plan.events_per_month {
            Quota::Unlimited => return Ok(Admission::Unlimited),
            Quota::Limited(quota) => quota,
        };

        let usage = self.ledger.get(account.owner_id).await?;
        let admission = if usage < quota {
            Admission::Allowed { usage, quota }
        } else {
            Admission::Rejected { usage, quota }
        };

        debug!(
            owner_id = %account.owner_id,
            plan_id = %plan.id,
            usage,
            quota,
            allowed = admission.is_allowed(),
            "Evaluated event limit"
        );

        Ok(admission)
    }

    /// Records `n` persisted events against the month of `effective_date`.
    pub async fn increment_events(
        &self,
        owner_id: Uuid,
        n: u64,
        effective_date: DateTime<Utc>,
    ) -> Result<()> {
        self.ledger.increment(owner_id, n, effective_date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::store::MemoryStore;
    use collector_core::{Plan, PlanId, RetentionWindow, YearMonth};

    fn controller(store: &MemoryStore, plans: PlanCatalog) -> AdmissionController {
        let shared = Arc::new(store.clone());
        AdmissionController::new(
            shared.clone(),
            Arc::new(plans),
            Arc::new(UsageLedger::new(shared)),
        )
    }

    fn small_plans() -> PlanCatalog {
        PlanCatalog::new(
            vec![
                Plan {
                    id: "small".into(),
                    name: "Small".into(),
                    events_per_month: Quota::Limited(10_000),
                    retention_months: RetentionWindow::Months(1),
                    features: Default::default(),
                },
                Plan {
                    id: "unlimited".into(),
                    name: "Unlimited".into(),
                    events_per_month: Quota::Unlimited,
                    retention_months: RetentionWindow::Unlimited,
                    features: Default::default(),
                },
            ],
            PlanId::new("small"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_boundary_of_quota() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store.add_account(Account::new(owner, "small"));
        store.set_usage(owner, YearMonth::current(), 9_999);

        let admission = controller(&store, small_plans());
        assert!(admission.check_event_limit(owner).await.unwrap());

        admission.increment_events(owner, 1, Utc::now()).await.unwrap();
        assert!(!admission.check_event_limit(owner).await.unwrap());
        assert_eq!(store.stored_usage(owner, YearMonth::current()), 10_000);
    }

    #[tokio::test]
    async fn test_unlimited_short_circuits() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store.add_account(Account::new(owner, "unlimited"));
        // Unlimited plans never read usage
        store.set_fail_reads(true);

        let admission = controller(&store, small_plans());
        let account = Account::new(owner, "unlimited");
        assert_eq!(admission.evaluate(&account).await.unwrap(), Admission::Unlimited);
    }

    #[tokio::test]
    async fn test_unknown_plan_uses_default() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store.add_account(Account::new(owner, "retired-plan"));
        store.set_usage(owner, YearMonth::current(), 10_000);

        let admission = controller(&store, small_plans());
        assert!(!admission.check_event_limit(owner).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_account_not_found() {
        let store = MemoryStore::new();
        let admission = controller(&store, small_plans());
        let err = admission.check_event_limit(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.error_code(), "SITE_001");
    }

    #[test]
    fn test_rejection_maps_to_limit_exceeded() {
        let owner = Uuid::new_v4();
        let err = Admission::Rejected {
            usage: 10,
            quota: 10,
        }
        .require(owner)
        .unwrap_err();
        assert!(err.is_limit_exceeded());
        assert!(Admission::Unlimited.require(owner).is_ok());
    }
}
