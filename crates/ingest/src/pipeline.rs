//! The collect pipeline.
//!
//! Stages, in order: validate, resolve owner, check access, filter bots,
//! admit, resolve identity, enrich, persist, count usage, sign token. Any
//! stage may end the request; nothing after a failing stage runs.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use collector_core::client::{ClientClassifier, GeoInfo};
use collector_core::identity::{IdentityInput, IdentityResolver, ResolvedIdentity};
use collector_core::limits::{truncate, MAX_EVENT_NAME_LEN, MAX_HOSTNAME_LEN, MAX_TAG_LEN, MAX_TITLE_LEN};
use collector_core::schema::validate_request;
use collector_core::store::Stores;
use collector_core::urls::{decompose_page_url, decompose_referrer};
use collector_core::{
    Account, CollectPayload, CollectRequest, Error, Event, EventType, PlanCatalog, Result,
    Session, SessionInfo, StoreError, Website,
};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::admission::AdmissionController;
use crate::ledger::UsageLedger;

/// `collect` section of the service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Strip trailing `/` from stored paths
    pub remove_trailing_slash: bool,
    /// Record crawler traffic like any other traffic
    pub disable_bot_check: bool,
    /// Client IPs whose traffic is dropped like bot traffic
    pub ignore_ips: Vec<String>,
}

/// Request attributes taken from the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct CollectContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub geo: GeoInfo,
    /// Continuity token from the previous response
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    Accepted { token: String, session: SessionInfo },
    /// Automated traffic: nothing recorded
    Bot,
}

/// Owner resolution result.
struct Tenant {
    website: Website,
    account: Account,
}

pub struct IngestPipeline {
    stores: Stores,
    identity: IdentityResolver,
    admission: AdmissionController,
    ledger: Arc<UsageLedger>,
    classifier: ClientClassifier,
    config: CollectConfig,
}

impl IngestPipeline {
    pub fn new(
        stores: Stores,
        plans: Arc<PlanCatalog>,
        secret: impl AsRef<[u8]>,
        config: CollectConfig,
    ) -> Self {
        let ledger = Arc::new(UsageLedger::new(stores.usage.clone()));
        let admission =
            AdmissionController::new(stores.directory.clone(), plans, ledger.clone());
        let classifier = ClientClassifier::new().with_ignored_ips(&config.ignore_ips);

        Self {
            stores,
            identity: IdentityResolver::new(secret),
            admission,
            ledger,
            classifier,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Processes one collect request.
    pub async fn collect(
        &self,
        request: CollectRequest,
        ctx: CollectContext,
    ) -> Result<CollectOutcome> {
        let start = Instant::now();
        metrics().collect.events_received.inc();

        let result = self.run(request, ctx, Utc::now()).await;

        match &result {
            Ok(_) => {}
            Err(Error::Validation(_) | Error::Serialization(_)) => {
                metrics().collect.events_failed_validation.inc()
            }
            Err(Error::LimitExceeded { .. }) => metrics().collect.events_rejected_limit.inc(),
            Err(Error::AccessDenied(_)) => metrics().collect.access_denied.inc(),
            Err(Error::TransientStore(_)) => metrics().collect.store_errors.inc(),
            Err(_) => {}
        }

        metrics()
            .ingest_latency
            .observe(start.elapsed().as_millis() as u64);
        result
    }

    async fn run(
        &self,
        request: CollectRequest,
        ctx: CollectContext,
        now: DateTime<Utc>,
    ) -> Result<CollectOutcome> {
        let website_id = validate_request(&request, now)?;
        let payload = request.payload();

        let tenant = self.resolve_tenant(website_id).await?;
        let owner_id = tenant.account.owner_id;

        if !tenant.account.has_access {
            warn!(website_id = %website_id, owner_id = %owner_id, "Collect denied: access suspended");
            return Err(Error::access_denied(format!("owner {owner_id} is suspended")));
        }

        let ip = payload.ip.clone().or(ctx.ip).unwrap_or_default();
        let user_agent = payload
            .user_agent
            .clone()
            .or(ctx.user_agent)
            .unwrap_or_default();

        if !self.config.disable_bot_check && self.classifier.is_bot(&user_agent, Some(ip.as_str())) {
            metrics().collect.bots_filtered.inc();
            debug!(website_id = %website_id, "Dropped bot traffic");
            return Ok(CollectOutcome::Bot);
        }

        if !request.is_identify() {
            self.admission
                .evaluate(&tenant.account)
                .await?
                .require(owner_id)
                .inspect_err(|_| {
                    info!(website_id = %website_id, owner_id = %owner_id, "Monthly event limit reached");
                })?;
        }

        let explicit_time = payload.explicit_timestamp();
        let input = IdentityInput {
            website_id,
            ip: &ip,
            user_agent: &user_agent,
            distinct_id: payload.distinct_id(),
            explicit_time,
            token: ctx.token.as_deref(),
        };
        let identity = self.identity.resolve(&input, now);
        let created_at = explicit_time.unwrap_or(now);

        if !identity.continued {
            self.ensure_session(
                &tenant.website,
                &identity,
                payload,
                &user_agent,
                &ctx.geo,
                created_at,
            )
            .await?;
        }

        match &request {
            CollectRequest::Event(payload) => {
                let event = self.build_event(website_id, &identity, payload, created_at);
                let store_start = Instant::now();
                self.stores.events.insert_event(&event).await.map_err(|e| {
                    error!(website_id = %website_id, error = %e, "Failed to persist event");
                    Error::TransientStore(e)
                })?;
                metrics()
                    .store_latency
                    .observe(store_start.elapsed().as_millis() as u64);
                metrics().collect.events_persisted.inc();

                // The event is durable; a counting failure must not fail the request
                if let Err(e) = self.admission.increment_events(owner_id, 1, created_at).await {
                    metrics().collect.usage_increment_errors.inc();
                    error!(owner_id = %owner_id, error = %e, "Failed to increment usage");
                }
            }
            CollectRequest::Identify(payload) => {
                metrics().collect.identify_calls.inc();
                self.stores
                    .sessions
                    .merge_session_data(
                        website_id,
                        identity.session_id,
                        payload.data.clone().unwrap_or_default(),
                        payload.distinct_id().map(str::to_string),
                    )
                    .await
                    .map_err(|e| {
                        error!(website_id = %website_id, error = %e, "Failed to merge session data");
                        Error::TransientStore(e)
                    })?;
            }
        }

        let token = self
            .identity
            .issue(website_id, &identity)
            .map_err(|e| Error::internal(format!("failed to sign token: {e}")))?;

        debug!(
            website_id = %website_id,
            session_id = %identity.session_id,
            visit_id = %identity.visit_id,
            kind = request.kind(),
            "Collected"
        );

        Ok(CollectOutcome::Accepted {
            token,
            session: SessionInfo {
                session_id: identity.session_id,
                visit_id: identity.visit_id,
            },
        })
    }

    /// Finds the website's paying account: its user, or its team's owner.
    async fn resolve_tenant(&self, website_id: Uuid) -> Result<Tenant> {
        let directory = &self.stores.directory;

        let website = directory
            .website(website_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("website {website_id}")))?;

        let owner_id = match (website.user_id, website.team_id) {
            (Some(user_id), _) => Some(user_id),
            (None, Some(team_id)) => directory.team_owner(team_id).await?,
            (None, None) => None,
        }
        .ok_or_else(|| Error::not_found(format!("owner of website {website_id}")))?;

        let account = directory
            .account(owner_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("account {owner_id}")))?;

        Ok(Tenant { website, account })
    }

    /// Creates the session row on first sight. Losing a creation race is fine.
    async fn ensure_session(
        &self,
        website: &Website,
        identity: &ResolvedIdentity,
        payload: &CollectPayload,
        user_agent: &str,
        geo: &GeoInfo,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let sessions = &self.stores.sessions;

        if sessions
            .find_session(website.id, identity.session_id)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let client = self.classifier.classify(
            user_agent,
            payload.screen.as_deref(),
            payload.language.as_deref(),
            geo,
        );
        let session = Session::new(
            identity.session_id,
            website.id,
            &client,
            payload.distinct_id().map(str::to_string),
            created_at,
        );

        match sessions.create_session(&session).await {
            Ok(()) => {
                metrics().collect.sessions_created.inc();
                Ok(())
            }
            Err(StoreError::UniqueViolation(_)) => {
                metrics().collect.session_create_races.inc();
                debug!(session_id = %session.id, "Session already created concurrently");
                Ok(())
            }
            Err(e) => {
                error!(website_id = %website.id, error = %e, "Failed to create session");
                Err(Error::TransientStore(e))
            }
        }
    }

    fn build_event(
        &self,
        website_id: Uuid,
        identity: &ResolvedIdentity,
        payload: &CollectPayload,
        created_at: DateTime<Utc>,
    ) -> Event {
        let strip = self.config.remove_trailing_slash;
        let (page, campaign) = decompose_page_url(payload.url.as_deref().unwrap_or("/"), strip);
        let referrer = payload
            .referrer
            .as_deref()
            .map(|r| decompose_referrer(r, strip))
            .unwrap_or_default();

        let event_name = payload
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(|n| truncate(n, MAX_EVENT_NAME_LEN));
        let event_type = if event_name.is_some() {
            EventType::CustomEvent
        } else {
            EventType::Pageview
        };

        Event {
            id: Uuid::new_v4(),
            website_id,
            session_id: identity.session_id,
            visit_id: identity.visit_id,
            created_at,
            event_type,
            event_name,
            url_path: page.path,
            url_query: page.query,
            referrer_path: referrer.path,
            referrer_query: referrer.query,
            referrer_domain: referrer.domain,
            page_title: truncate(payload.title.as_deref().unwrap_or_default(), MAX_TITLE_LEN),
            hostname: truncate(payload.hostname.as_deref().unwrap_or_default(), MAX_HOSTNAME_LEN),
            tag: payload.tag.as_deref().map(|t| truncate(t, MAX_TAG_LEN)),
            campaign,
            data: payload.data.clone(),
        }
    }
}
