//! In-memory store for development and tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{
    AccountDirectory, EventStore, ReportStore, SessionStore, StoreResult, UsageStore,
};
use crate::error::StoreError;
use crate::events::Event;
use crate::retention::YearMonth;
use crate::session::{Session, SessionData};
use crate::tenant::{Account, Report, Team, Website};

#[derive(Default)]
struct State {
    events: Vec<Event>,
    sessions: HashMap<(Uuid, Uuid), Session>,
    session_data: HashMap<(Uuid, Uuid), SessionData>,
    reports: Vec<Report>,
    usage: HashMap<(Uuid, YearMonth), u64>,
    accounts: HashMap<Uuid, Account>,
    websites: HashMap<Uuid, Website>,
    teams: HashMap<Uuid, Team>,
}

#[derive(Default)]
struct Failures {
    event_writes: bool,
    reads: bool,
    account_listing: bool,
    deletes_for: HashSet<Uuid>,
}

/// Store that keeps every table in process memory.
///
/// Failure modes can be toggled to exercise error paths without a backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    failures: Arc<Mutex<Failures>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Directory setup ===

    pub fn add_account(&self, account: Account) {
        self.state.lock().accounts.insert(account.owner_id, account);
    }

    pub fn add_team(&self, team: Team) {
        self.state.lock().teams.insert(team.id, team);
    }

    pub fn add_website(&self, website: Website) {
        self.state.lock().websites.insert(website.id, website);
    }

    pub fn add_report(&self, report: Report) {
        self.state.lock().reports.push(report);
    }

    /// Inserts an event bypassing failure injection.
    pub fn seed_event(&self, event: Event) {
        self.state.lock().events.push(event);
    }

    /// Inserts a session bypassing failure injection and uniqueness.
    pub fn seed_session(&self, session: Session) {
        self.state
            .lock()
            .sessions
            .insert((session.website_id, session.id), session);
    }

    pub fn set_usage(&self, owner_id: Uuid, month: YearMonth, value: u64) {
        self.state.lock().usage.insert((owner_id, month), value);
    }

    // === Inspection ===

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn events_for(&self, website_id: Uuid) -> Vec<Event> {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| e.website_id == website_id)
            .cloned()
            .collect()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.state.lock().sessions.values().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn session_data(&self, website_id: Uuid, session_id: Uuid) -> Option<SessionData> {
        self.state
            .lock()
            .session_data
            .get(&(website_id, session_id))
            .cloned()
    }

    pub fn report_count(&self) -> usize {
        self.state.lock().reports.len()
    }

    pub fn stored_usage(&self, owner_id: Uuid, month: YearMonth) -> u64 {
        self.state
            .lock()
            .usage
            .get(&(owner_id, month))
            .copied()
            .unwrap_or(0)
    }

    // === Failure injection ===

    /// Fails event inserts.
    pub fn set_fail_event_writes(&self, fail: bool) {
        self.failures.lock().event_writes = fail;
    }

    /// Fails directory, usage and session lookups.
    pub fn set_fail_reads(&self, fail: bool) {
        self.failures.lock().reads = fail;
    }

    /// Fails listing all accounts.
    pub fn set_fail_account_listing(&self, fail: bool) {
        self.failures.lock().account_listing = fail;
    }

    /// Fails every retention delete for one website.
    pub fn fail_deletes_for(&self, website_id: Uuid) {
        self.failures.lock().deletes_for.insert(website_id);
    }

    pub fn is_healthy(&self) -> bool {
        let failures = self.failures.lock();
        !failures.event_writes && !failures.reads
    }

    fn check_reads(&self) -> StoreResult<()> {
        if self.failures.lock().reads {
            return Err(StoreError::backend("memory store read failure"));
        }
        Ok(())
    }

    fn check_delete(&self, website_id: Uuid) -> StoreResult<()> {
        if self.failures.lock().deletes_for.contains(&website_id) {
            return Err(StoreError::backend(format!(
                "memory store delete failure for website {website_id}"
            )));
        }
        Ok(())
    }
}

/// Removes matching rows and returns how many were removed.
fn retain_count<T>(rows: &mut Vec<T>, keep: impl Fn(&T) -> bool) -> u64 {
    let before = rows.len();
    rows.retain(keep);
    (before - rows.len()) as u64
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        if self.failures.lock().event_writes {
            return Err(StoreError::backend("memory store write failure"));
        }
        self.state.lock().events.push(event.clone());
        Ok(())
    }

    async fn delete_events_before(
        &self,
        website_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.check_delete(website_id)?;
        let mut state = self.state.lock();
        Ok(retain_count(&mut state.events, |e| {
            e.website_id != website_id || e.created_at >= cutoff
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        if self.is_healthy() {
            Ok(())
        } else {
            Err(StoreError::backend("memory store failure mode enabled"))
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find_session(
        &self,
        website_id: Uuid,
        session_id: Uuid,
    ) -> StoreResult<Option<Session>> {
        self.check_reads()?;
        Ok(self
            .state
            .lock()
            .sessions
            .get(&(website_id, session_id))
            .cloned())
    }

    async fn create_session(&self, session: &Session) -> StoreResult<()> {
        let mut state = self.state.lock();
        let key = (session.website_id, session.id);
        if state.sessions.contains_key(&key) {
            return Err(StoreError::UniqueViolation(format!("session {}", session.id)));
        }
        state.sessions.insert(key, session.clone());
        Ok(())
    }

    async fn merge_session_data(
        &self,
        website_id: Uuid,
        session_id: Uuid,
        data: Map<String, Value>,
        distinct_id: Option<String>,
    ) -> StoreResult<SessionData> {
        let mut state = self.state.lock();
        let entry = state
            .session_data
            .entry((website_id, session_id))
            .or_insert_with(|| SessionData {
                website_id,
                session_id,
                ..Default::default()
            });
        entry.merge(data, distinct_id);
        Ok(entry.clone())
    }

    async fn delete_sessions_before(
        &self,
        website_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.check_delete(website_id)?;
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state
            .sessions
            .retain(|_, s| s.website_id != website_id || s.created_at >= cutoff);
        let removed = (before - state.sessions.len()) as u64;

        let live: HashSet<(Uuid, Uuid)> = state.sessions.keys().copied().collect();
        state
            .session_data
            .retain(|key, _| key.0 != website_id || live.contains(key));
        Ok(removed)
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn delete_reports_before(
        &self,
        website_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.check_delete(website_id)?;
        let mut state = self.state.lock();
        Ok(retain_count(&mut state.reports, |r| {
            r.website_id != website_id || r.created_at >= cutoff
        }))
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn usage(&self, owner_id: Uuid, month: YearMonth) -> StoreResult<u64> {
        self.check_reads()?;
        Ok(self.stored_usage(owner_id, month))
    }

    async fn add_usage(&self, owner_id: Uuid, month: YearMonth, delta: u64) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let counter = state.usage.entry((owner_id, month)).or_insert(0);
        *counter = counter.saturating_add(delta);
        Ok(*counter)
    }

    async fn reset_usage(&self, owner_id: Uuid, month: YearMonth) -> StoreResult<()> {
        self.state.lock().usage.insert((owner_id, month), 0);
        Ok(())
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn website(&self, website_id: Uuid) -> StoreResult<Option<Website>> {
        self.check_reads()?;
        Ok(self.state.lock().websites.get(&website_id).cloned())
    }

    async fn team_owner(&self, team_id: Uuid) -> StoreResult<Option<Uuid>> {
        self.check_reads()?;
        Ok(self.state.lock().teams.get(&team_id).map(|t| t.owner_id))
    }

    async fn account(&self, owner_id: Uuid) -> StoreResult<Option<Account>> {
        self.check_reads()?;
        Ok(self.state.lock().accounts.get(&owner_id).cloned())
    }

    async fn accounts(&self) -> StoreResult<Vec<Account>> {
        if self.failures.lock().account_listing {
            return Err(StoreError::backend("memory store account listing failure"));
        }
        let mut accounts: Vec<Account> = self.state.lock().accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.owner_id);
        Ok(accounts)
    }

    async fn websites_owned_by(&self, owner_id: Uuid) -> StoreResult<Vec<Uuid>> {
        self.check_reads()?;
        let state = self.state.lock();
        let teams: HashSet<Uuid> = state
            .teams
            .values()
            .filter(|t| t.owner_id == owner_id)
            .map(|t| t.id)
            .collect();

        let mut ids: Vec<Uuid> = state
            .websites
            .values()
            .filter(|w| {
                w.user_id == Some(owner_id) || w.team_id.is_some_and(|t| teams.contains(&t))
            })
            .map(|w| w.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}
