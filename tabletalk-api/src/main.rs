use actix_web::{web, App, HttpServer};
use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tabletalk_api::handlers::{self, AppState};
use tabletalk_api::rate_limit::RateLimiter;
use tabletalk_core::{AppConfig, Assistant, MemorySessionStore};
use tabletalk_llm_sdk::{ChatMessage, OpenAiClient, Planner, PlannerError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "tabletalk-api", about = "Guarded natural-language database assistant")]
struct Args {
    /// Path to the configuration file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Stand-in planner for deployments without an API key: every request fails
/// recoverably with the same message the caller needs to see
struct UnconfiguredPlanner;

#[async_trait]
impl Planner for UnconfiguredPlanner {
    async fn complete(&self, _messages: Vec<ChatMessage>) -> Result<String, PlannerError> {
        Err(PlannerError::internal(
            "OPENAI_API_KEY is required for NL processing",
        ))
    }

    fn provider_name(&self) -> &str {
        "unconfigured"
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (config, config_path) = match args.config {
        Some(path) => (AppConfig::load_from(&path)?, path),
        None => AppConfig::load()?,
    };

    let log_dir = config
        .database
        .path
        .parent()
        .map(|p| p.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tabletalk.log");
    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    info!(config = %config_path.display(), "Configuration loaded");

    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }
    let conn = Connection::open(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;

    let planner: Arc<dyn Planner> = match config.planner.api_key.as_deref() {
        Some(key) => {
            let mut client = OpenAiClient::new(key, &config.planner.model)?;
            if let Some(base_url) = &config.planner.base_url {
                client = client.with_base_url(base_url);
            }
            Arc::new(client)
        }
        None => {
            warn!("No planner API key configured; natural-language requests will fail until one is set");
            Arc::new(UnconfiguredPlanner)
        }
    };

    let config = Arc::new(config);
    let assistant = Assistant::new(
        planner,
        Arc::new(MemorySessionStore::new()),
        Arc::clone(&config),
    );
    let rate_limiter = RateLimiter::new(
        std::env::temp_dir().join("tabletalk-rate"),
        config.limits.rate_limit_window_sec,
        config.limits.rate_limit_max_requests,
    );

    let state = web::Data::new(AppState {
        assistant,
        db: Arc::new(Mutex::new(conn)),
        rate_limiter,
    });

    let bind_addr = (config.server.host.clone(), config.server.port);
    info!("Starting tabletalk-api at http://{}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(handlers::query)
            .service(handlers::confirm)
            .service(handlers::page)
            .service(handlers::schema)
    })
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}
