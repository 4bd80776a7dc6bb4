//! Account, team and website ownership types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plans::PlanId;

/// A billable account. Identified by its owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub owner_id: Uuid,
    pub plan_id: PlanId,
    /// False once the account is suspended (billing, abuse)
    pub has_access: bool,
}

impl Account {
    pub fn new(owner_id: Uuid, plan_id: impl Into<PlanId>) -> Self {
        Self {
            owner_id,
            plan_id: plan_id.into(),
            has_access: true,
        }
    }

    pub fn suspended(mut self) -> Self {
        self.has_access = false;
        self
    }
}

/// A tracked website, owned by a user directly or through a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Website {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub domain: Option<String>,
}

impl Website {
    pub fn owned_by_user(id: Uuid, user_id: Uuid) -> Self {
        Self {
            id,
            user_id: Some(user_id),
            team_id: None,
            domain: None,
        }
    }

    pub fn owned_by_team(id: Uuid, team_id: Uuid) -> Self {
        Self {
            id,
            user_id: None,
            team_id: Some(team_id),
            domain: None,
        }
    }
}

/// Team membership reduced to what billing needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub owner_id: Uuid,
}

/// A saved report. Only retention touches it here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub website_id: Uuid,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
