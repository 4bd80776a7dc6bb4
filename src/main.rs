//! Pulse collector
//!
//! Multi-tenant web analytics collection service:
//! - `/api/send` validation, identity resolution and quota admission
//! - ClickHouse or in-memory storage
//! - Daily per-plan retention purge

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use api::{router, AppState};
use clickhouse_store::{ClickHouseClient, ClickHouseConfig, ClickHouseStore};
use collector_core::store::{MemoryStore, Stores};
use collector_core::{PlanCatalog, PlansConfig};
use ingest::{CollectConfig, IngestPipeline};
use telemetry::{health, init_tracing_from_env};
use worker::{RetentionJob, RetentionScheduler, SchedulerConfig, SchedulerGates};

/// Secret used outside production when none is configured.
const DEV_SECRET: &str = "pulse-development-secret";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
enum StorageBackend {
    #[default]
    Memory,
    Clickhouse,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct StorageConfig {
    #[serde(default)]
    backend: StorageBackend,
    #[serde(default)]
    clickhouse: ClickHouseConfig,
}

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// `production` arms the retention scheduler
    #[serde(default = "default_environment")]
    environment: String,

    /// Key for identity salts and continuity tokens
    #[serde(default)]
    secret: String,

    #[serde(default)]
    storage: StorageConfig,

    #[serde(default)]
    collect: CollectConfig,

    #[serde(default)]
    scheduler: SchedulerConfig,

    #[serde(default)]
    plans: PlansConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            secret: String::new(),
            storage: StorageConfig::default(),
            collect: CollectConfig::default(),
            scheduler: SchedulerConfig::default(),
            plans: PlansConfig::default(),
        }
    }
}

impl Config {
    fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting Pulse collector v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = load_config()?;

    if config.secret.is_empty() {
        if config.is_production() {
            bail!("PULSE_SECRET must be set in production");
        }
        warn!("No secret configured, using the development secret");
        config.secret = DEV_SECRET.to_string();
    }

    let plans = Arc::new(PlanCatalog::from_config(&config.plans).context("Invalid plan catalog")?);
    info!(
        plans = plans.len(),
        default_plan = %plans.default_plan().id,
        "Loaded plan catalog"
    );

    let stores = build_stores(&config).await;

    let pipeline = Arc::new(IngestPipeline::new(
        stores.clone(),
        plans.clone(),
        config.secret.as_bytes(),
        config.collect.clone(),
    ));

    // Retention scheduler: arms only when the environment gates pass
    let scheduler = Arc::new(RetentionScheduler::new(
        RetentionJob::new(stores, plans),
        config.scheduler.clone(),
        SchedulerGates::from_env(&config.environment),
    ));
    match scheduler.initialize() {
        Some(next_run) => info!(next_run = %next_run, "Retention scheduled"),
        None => info!(environment = %config.environment, "Retention scheduler dormant"),
    }

    // Create router
    let app = router(AppState::new(pipeline, scheduler.clone()));

    // Start HTTP server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server with graceful shutdown; the scheduler timer stops on the signal
    let on_signal = {
        let scheduler = scheduler.clone();
        async move {
            shutdown_signal().await;
            scheduler.shutdown();
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(on_signal)
    .await
    .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("PULSE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for nested fields
    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(secret) = std::env::var("PULSE_SECRET") {
        config.secret = secret;
    }
    if let Ok(environment) = std::env::var("PULSE_ENVIRONMENT") {
        config.environment = environment;
    }
    if let Ok(backend) = std::env::var("PULSE_STORAGE_BACKEND") {
        config.storage.backend = match backend.to_ascii_lowercase().as_str() {
            "clickhouse" => StorageBackend::Clickhouse,
            "memory" => StorageBackend::Memory,
            other => bail!("Unknown storage backend '{other}'"),
        };
    }

    // ClickHouse connection
    if let Ok(url) = std::env::var("PULSE_CLICKHOUSE_URL") {
        config.storage.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("PULSE_CLICKHOUSE_DATABASE") {
        config.storage.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("PULSE_CLICKHOUSE_USERNAME") {
        config.storage.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("PULSE_CLICKHOUSE_PASSWORD") {
        config.storage.clickhouse.password = Some(password);
    }

    // Collect behaviour
    if let Ok(ips) = std::env::var("PULSE_IGNORE_IPS") {
        config.collect.ignore_ips = ips
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(flag) = std::env::var("PULSE_DISABLE_BOT_CHECK") {
        config.collect.disable_bot_check = parse_flag(&flag);
    }
    if let Ok(flag) = std::env::var("PULSE_REMOVE_TRAILING_SLASH") {
        config.collect.remove_trailing_slash = parse_flag(&flag);
    }

    // Scheduler
    if let Ok(webhook) = std::env::var("PULSE_ALERT_WEBHOOK") {
        config.scheduler.alert_webhook = Some(webhook);
    }

    Ok(config)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Builds the configured storage backend and records its startup health.
async fn build_stores(config: &Config) -> Stores {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; data is lost on restart");
            health().storage.set_healthy();
            Stores::from_shared(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Clickhouse => {
            let client = ClickHouseClient::new(config.storage.clickhouse.clone());

            if config.storage.clickhouse.init_schema {
                if let Err(e) = clickhouse_store::init_schema(&client).await {
                    error!(error = %e, "Failed to initialize ClickHouse schema");
                    // Continue anyway - schema might already exist
                }
            }

            if client.is_reachable().await {
                health().storage.set_healthy();
                info!("ClickHouse connection: healthy");
            } else {
                health().storage.set_unhealthy("Connection failed");
                error!("ClickHouse connection: unhealthy");
            }

            Stores::from_shared(Arc::new(ClickHouseStore::new(client)))
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
