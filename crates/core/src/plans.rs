//! Subscription plans and their quotas.
//!
//! The catalog is built once from configuration and never mutated.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// A countable allowance. Configured as an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Quota {
    Limited(u64),
    Unlimited,
}

impl Quota {
    pub fn allows(&self, used: u64) -> bool {
        match self {
            Self::Limited(max) => used < *max,
            Self::Unlimited => true,
        }
    }

    pub fn limit(&self) -> Option<u64> {
        match self {
            Self::Limited(max) => Some(*max),
            Self::Unlimited => None,
        }
    }
}

impl TryFrom<i64> for Quota {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Unlimited),
            v if v >= 0 => Ok(Self::Limited(v as u64)),
            v => Err(format!("invalid quota {v}, expected -1 or a non-negative count")),
        }
    }
}

impl From<Quota> for i64 {
    fn from(quota: Quota) -> Self {
        match quota {
            Quota::Limited(v) => v.min(i64::MAX as u64) as i64,
            Quota::Unlimited => -1,
        }
    }
}

/// How long raw data is kept. Configured in months where `-1` means forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RetentionWindow {
    Months(u32),
    Unlimited,
}

impl RetentionWindow {
    pub fn months(&self) -> Option<u32> {
        match self {
            Self::Months(m) => Some(*m),
            Self::Unlimited => None,
        }
    }
}

impl TryFrom<i64> for RetentionWindow {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Unlimited),
            v if v > 0 && v <= u32::MAX as i64 => Ok(Self::Months(v as u32)),
            v => Err(format!("invalid retention {v}, expected -1 or a positive month count")),
        }
    }
}

impl From<RetentionWindow> for i64 {
    fn from(window: RetentionWindow) -> Self {
        match window {
            RetentionWindow::Months(m) => m as i64,
            RetentionWindow::Unlimited => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlanId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Feature allowances beyond the event quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeatures {
    pub max_websites: Quota,
    pub max_team_members: Quota,
    pub api_access: bool,
}

impl Default for PlanFeatures {
    fn default() -> Self {
        Self {
            max_websites: Quota::Limited(3),
            max_team_members: Quota::Limited(1),
            api_access: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub events_per_month: Quota,
    pub retention_months: RetentionWindow,
    #[serde(default)]
    pub features: PlanFeatures,
}

/// Plans section of the service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlansConfig {
    pub default_plan: String,
    pub plans: Vec<Plan>,
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            default_plan: "hobby".into(),
            plans: builtin_plans(),
        }
    }
}

fn builtin_plans() -> Vec<Plan> {
    vec![
        Plan {
            id: "hobby".into(),
            name: "Hobby".into(),
            events_per_month: Quota::Limited(100_000),
            retention_months: RetentionWindow::Months(6),
            features: PlanFeatures::default(),
        },
        Plan {
            id: "pro".into(),
            name: "Pro".into(),
            events_per_month: Quota::Limited(1_000_000),
            retention_months: RetentionWindow::Months(60),
            features: PlanFeatures {
                max_websites: Quota::Limited(50),
                max_team_members: Quota::Limited(10),
                api_access: true,
            },
        },
        Plan {
            id: "business".into(),
            name: "Business".into(),
            events_per_month: Quota::Limited(10_000_000),
            retention_months: RetentionWindow::Unlimited,
            features: PlanFeatures {
                max_websites: Quota::Unlimited,
                max_team_members: Quota::Limited(50),
                api_access: true,
            },
        },
        Plan {
            id: "enterprise".into(),
            name: "Enterprise".into(),
            events_per_month: Quota::Unlimited,
            retention_months: RetentionWindow::Unlimited,
            features: PlanFeatures {
                max_websites: Quota::Unlimited,
                max_team_members: Quota::Unlimited,
                api_access: true,
            },
        },
    ]
}

/// Immutable plan lookup.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<PlanId, Plan>,
    default_plan: PlanId,
}

impl PlanCatalog {
    /// Builds a catalog. The default plan must be one of `plans`.
    pub fn new(plans: Vec<Plan>, default_plan: PlanId) -> Result<Self> {
        let plans: HashMap<_, _> = plans.into_iter().map(|p| (p.id.clone(), p)).collect();
        if !plans.contains_key(&default_plan) {
            return Err(Error::internal(format!(
                "default plan '{default_plan}' is not defined"
            )));
        }
        Ok(Self {
            plans,
            default_plan,
        })
    }

    pub fn from_config(config: &PlansConfig) -> Result<Self> {
        Self::new(config.plans.clone(), PlanId::new(&config.default_plan))
    }

    pub fn get(&self, id: &PlanId) -> Option<&Plan> {
        self.plans.get(id)
    }

    pub fn default_plan(&self) -> &Plan {
        &self.plans[&self.default_plan]
    }

    /// Looks up a plan, falling back to the default plan for unknown IDs.
    pub fn resolve(&self, id: &PlanId) -> &Plan {
        match self.get(id) {
            Some(plan) => plan,
            None => {
                warn!(
                    plan_id = %id,
                    default_plan = %self.default_plan,
                    "Unknown plan, applying default plan"
                );
                self.default_plan()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            plans: builtin_plans()
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
            default_plan: PlanId::new("hobby"),
        }
    }
}
