// src/main.rs
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpServer,
};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod allocation;
mod allocation_handlers;
mod approval;
mod audit;
mod auth;
mod auth_handlers;
mod batch_handlers;
mod config;
mod costing;
mod error;
mod handlers;
mod import_export;
mod models;
mod monitoring;
pub mod repositories;
mod routes;
mod seed;
mod stock_transactions;
pub mod validator;

use crate::audit::AuditLog;
use crate::auth::{AuthService, User, UserDirectory};
use crate::config::{load_config, Config};
use crate::models::Batch;
use crate::monitoring::{start_maintenance_tasks, Metrics, RequestLogger};
use crate::repositories::{BatchRepository, InMemoryBatchRepository, InMemoryTransactionRepository};
use crate::stock_transactions::StockTransactionService;

pub struct AppState {
    pub config: Config,
    pub batches: Arc<dyn BatchRepository>,
    pub stock: Arc<StockTransactionService>,
    pub audit: Arc<AuditLog>,
    pub users: Arc<UserDirectory>,
}

impl AppState {
    pub fn new(config: Config, batches: Vec<Batch>, users: Vec<User>) -> Self {
        let batch_repo: Arc<dyn BatchRepository> = Arc::new(InMemoryBatchRepository::with_batches(batches));
        let stock = StockTransactionService::new(
            batch_repo.clone(),
            Arc::new(InMemoryTransactionRepository::new()),
            config.inventory.clone(),
        );

        Self {
            batches: batch_repo,
            stock: Arc::new(stock),
            audit: Arc::new(AuditLog::new()),
            users: Arc::new(UserDirectory::new(users)),
            config,
        }
    }

    /// State preloaded with the demo stock and one account per role.
    pub fn seeded(config: Config) -> Self {
        let batches = seed::demo_batches(handlers::today());
        log::info!("Loaded {} demo batches", batches.len());
        Self::new(config, batches, seed::demo_users())
    }
}

// ==================== MAIN ====================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    setup_logging(&config)?;

    if config.is_production() {
        validate_production_config(&config)?;
    }

    config.print_startup_info();

    let auth_service = Arc::new(AuthService::new(
        &config.auth.jwt_secret,
        config.auth.token_expiration_hours,
    ));

    let app_state = Arc::new(AppState::seeded(config.clone()));

    start_maintenance_tasks(app_state.batches.clone(), app_state.audit.clone(), &config);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server at http://{}", bind_address);

    let metrics_arc = Arc::new(Metrics::new());
    let server_config = config.server.clone();

    let mut server = HttpServer::new(move || {
        let cors = setup_improved_cors(&config.security.allowed_origins, config.is_production());
        let security_headers = setup_security_headers();

        App::new()
            .wrap(cors)
            .wrap(security_headers)
            .wrap(Logger::default())
            .wrap(Compress::default())
            .wrap(RequestLogger::new(metrics_arc.clone()))
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(metrics_arc.clone()))
            .app_data(web::JsonConfig::default().limit(config.security.max_request_size))
            .configure(routes::configure)
    })
    .keep_alive(Duration::from_secs(server_config.keep_alive))
    .client_request_timeout(Duration::from_secs(server_config.client_timeout));

    if let Some(workers) = server_config.workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind_address)
        .with_context(|| format!("Failed to bind {}", bind_address))?
        .run()
        .await
        .context("Server failed to run")?;

    Ok(())
}

// ==================== HELPER FUNCTIONS ====================

fn setup_improved_cors(allowed_origins: &[String], is_production: bool) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .expose_headers(vec![header::CONTENT_LENGTH, header::CONTENT_DISPOSITION])
        .max_age(3600);

    if allowed_origins.iter().any(|o| o == "*") && !is_production {
        log::warn!("Using wildcard CORS (*) in development mode");
        return cors.allow_any_origin();
    }

    for origin in allowed_origins.iter().filter(|o| !o.is_empty() && o.as_str() != "*") {
        log::debug!("Adding CORS origin: {}", origin);
        cors = cors.allowed_origin(origin);
    }
    cors
}

fn setup_security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(())
}

fn validate_production_config(config: &Config) -> anyhow::Result<()> {
    if config.auth.jwt_secret.len() < 32 {
        anyhow::bail!("Insecure JWT secret in production! Must be at least 32 characters.");
    }

    if config.security.allowed_origins.iter().any(|o| o == "*") {
        anyhow::bail!("Wildcard CORS origins not allowed in production!");
    }

    Ok(())
}
