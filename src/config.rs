// src/config.rs - Configuration: defaults, optional TOML file, .env and environment overrides
use anyhow::{Context, Result};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

use crate::allocation::AllocationStrategy;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub inventory: InventoryConfig,
    pub approval: ApprovalConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub keep_alive: u64,
    pub client_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiration_hours: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub max_request_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InventoryConfig {
    pub default_strategy: AllocationStrategy,
    /// Leave batches past their expiry date out of allocation even before the sweep marks them.
    pub exclude_expired: bool,
    pub expiry_warning_days: i64,
    /// A batch is low on stock when its remaining share of the original quantity is at or below this.
    pub low_stock_percent: u32,
    pub expiry_sweep_interval_minutes: u64,
}

/// Purchase amount limits for the approval chain, in the company currency.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApprovalConfig {
    pub auto_approve_below: Decimal,
    pub department_head_limit: Decimal,
    pub director_limit: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuditConfig {
    pub retention_days: i64,
    pub cleanup_interval_hours: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
            keep_alive: 30,
            client_timeout: 30,
        }
    }
}

const DEV_JWT_SECRET: &str = "development_only_secret_0123456789abcdef";

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_expiration_hours: 12,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            max_request_size: 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            default_strategy: AllocationStrategy::Fefo,
            exclude_expired: true,
            expiry_warning_days: 30,
            low_stock_percent: 20,
            expiry_sweep_interval_minutes: 60,
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_approve_below: Decimal::from(1_000),
            department_head_limit: Decimal::from(10_000),
            director_limit: Decimal::from(100_000),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: 365,
            cleanup_interval_hours: 24,
        }
    }
}

pub fn generate_jwt_secret() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

pub fn load_config() -> Result<Config> {
    load_env_file()?;

    let mut config = match env::var("CONFIG_FILE") {
        Ok(config_file) => Config::from_file(Path::new(&config_file))?,
        Err(_) => Config::default(),
    };

    config.apply_overrides(|key| env::var(key).ok());

    if config.is_production() && config.auth.jwt_secret == DEV_JWT_SECRET {
        // logging is not initialised yet
        eprintln!("WARNING: JWT_SECRET not set; generated a random one, sessions will not survive a restart");
        config.auth.jwt_secret = generate_jwt_secret();
    }

    config.validate().context("Configuration validation failed")?;

    Ok(config)
}

pub fn load_env_file() -> Result<()> {
    if let Ok(env_file) = env::var("ENV_FILE") {
        dotenvy::from_filename(&env_file)
            .with_context(|| format!("Failed to load environment file: {}", env_file))?;
    } else if Path::new(".env").exists() {
        dotenvy::dotenv().context("Failed to load .env file")?;
    }
    Ok(())
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring invalid value for {}: '{}'", key, value);
            None
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Applies environment overrides; `lookup` returns the value of a variable if set.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("BIND_ADDRESS") {
            self.server.host = host;
        }
        if let Some(port) = lookup("ERP_PORT").and_then(|v| parse_or_warn("ERP_PORT", &v)) {
            self.server.port = port;
        }
        if let Some(workers) = lookup("ERP_WORKERS").and_then(|v| parse_or_warn("ERP_WORKERS", &v)) {
            self.server.workers = Some(workers);
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.security.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(strategy) = lookup("ERP_ALLOCATION_STRATEGY")
            .and_then(|v| parse_or_warn::<AllocationStrategy>("ERP_ALLOCATION_STRATEGY", &v))
        {
            self.inventory.default_strategy = strategy;
        }
        if let Some(exclude) = lookup("ERP_EXCLUDE_EXPIRED").and_then(|v| parse_or_warn("ERP_EXCLUDE_EXPIRED", &v)) {
            self.inventory.exclude_expired = exclude;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long (current: {})",
                self.auth.jwt_secret.len()
            ));
        }
        if self.auth.token_expiration_hours <= 0 {
            return Err(anyhow::anyhow!("token_expiration_hours must be positive"));
        }
        if self.inventory.expiry_warning_days < 0 {
            return Err(anyhow::anyhow!("expiry_warning_days cannot be negative"));
        }
        if self.inventory.low_stock_percent > 100 {
            return Err(anyhow::anyhow!(
                "low_stock_percent must be between 0 and 100 (current: {})",
                self.inventory.low_stock_percent
            ));
        }
        if self.inventory.expiry_sweep_interval_minutes == 0 || self.audit.cleanup_interval_hours == 0 {
            return Err(anyhow::anyhow!("Maintenance intervals must be positive"));
        }
        if self.audit.retention_days <= 0 {
            return Err(anyhow::anyhow!("audit retention_days must be positive"));
        }

        let a = &self.approval;
        if !(Decimal::ZERO < a.auto_approve_below
            && a.auto_approve_below <= a.department_head_limit
            && a.department_head_limit < a.director_limit)
        {
            return Err(anyhow::anyhow!(
                "Approval limits must be increasing: auto_approve_below ({}) <= department_head_limit ({}) < director_limit ({})",
                a.auto_approve_below,
                a.department_head_limit,
                a.director_limit
            ));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        env::var("ERP_ENV").map(|v| v == "production").unwrap_or(false)
    }

    pub fn print_startup_info(&self) {
        log::info!("Pharma ERP starting up");
        log::info!("Server: {}:{}", self.server.host, self.server.port);
        log::info!("Auth: JWT ({}h expiration)", self.auth.token_expiration_hours);
        log::info!(
            "Inventory: {} allocation, exclude expired = {}",
            self.inventory.default_strategy,
            self.inventory.exclude_expired
        );
        log::info!("Logging: {} level", self.logging.level);

        if !self.is_production() {
            log::warn!("Running in development mode with in-memory demo data");
        }
    }
}
