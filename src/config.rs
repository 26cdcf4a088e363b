use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_BACKOFF_SECS: u64 = 60;
const DEFAULT_MAX_JITTER_SECS: u64 = 30;
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CLAIM_TTL_SECS: u64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 15;

/// Order numbering and note limits
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct OrderConfig {
    /// Prefix of generated order numbers (`ORD-20240101-123456`)
    #[serde(default = "default_order_prefix")]
    #[validate(length(min = 1, max = 10))]
    pub number_prefix: String,

    /// Maximum accepted length of admin notes
    #[serde(default = "default_admin_notes_max_len")]
    pub admin_notes_max_len: usize,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            number_prefix: default_order_prefix(),
            admin_notes_max_len: default_admin_notes_max_len(),
        }
    }
}

/// Invoice numbering and payment terms
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct InvoiceConfig {
    #[serde(default = "default_invoice_prefix")]
    #[validate(length(min = 1, max = 10))]
    pub number_prefix: String,

    /// Days between issue date and due date when the caller gives none
    #[serde(default = "default_due_days")]
    #[validate(range(min = 0, max = 365))]
    pub default_due_days: i64,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            number_prefix: default_invoice_prefix(),
            default_due_days: default_due_days(),
        }
    }
}

/// Notification dispatch tuning
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    /// Automatic delivery attempts before a task becomes terminal
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    /// Backoff unit; the delay after attempt `n` is `base * 2^n`
    #[serde(default = "default_base_backoff_secs")]
    #[validate(range(min = 1))]
    pub base_backoff_secs: u64,

    /// Upper bound (exclusive) of the random jitter added to each retry
    #[serde(default = "default_max_jitter_secs")]
    pub max_jitter_secs: u64,

    /// Bound on a single call to the send capability
    #[serde(default = "default_send_timeout_secs")]
    #[validate(range(min = 1))]
    pub send_timeout_secs: u64,

    /// How long a claim is honoured before the task is considered abandoned
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,

    /// Tick of the background dispatch loop
    #[serde(default = "default_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,

    /// Maximum number of due tasks examined per sweep
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 1000))]
    pub batch_size: u64,

    /// Concurrent sends within one sweep
    #[serde(default = "default_send_concurrency")]
    #[validate(range(min = 1, max = 64))]
    pub send_concurrency: usize,

    #[serde(default = "default_from_address")]
    #[validate(email)]
    pub from_address: String,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Admin distribution list for alert notifications
    #[serde(default)]
    pub admin_recipients: Vec<String>,

    /// Send capability: "log" or "http"
    #[serde(default = "default_provider")]
    #[validate(custom = "validate_provider")]
    pub provider: String,

    #[serde(default)]
    pub provider_url: Option<String>,

    #[serde(default)]
    pub provider_api_key: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_secs: default_base_backoff_secs(),
            max_jitter_secs: default_max_jitter_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            claim_ttl_secs: default_claim_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            batch_size: default_batch_size(),
            send_concurrency: default_send_concurrency(),
            from_address: default_from_address(),
            from_name: default_from_name(),
            admin_recipients: Vec::new(),
            provider: default_provider(),
            provider_url: None,
            provider_api_key: None,
        }
    }
}

impl NotificationConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    fn validate_additional_constraints(&self, errors: &mut ValidationErrors) {
        if self.claim_ttl_secs <= self.send_timeout_secs {
            let mut err = ValidationError::new("claim_ttl_secs");
            err.message =
                Some("claim_ttl_secs must be greater than send_timeout_secs".into());
            errors.add("claim_ttl_secs", err);
        }

        if self.provider.eq_ignore_ascii_case("http")
            && self
                .provider_url
                .as_deref()
                .map(|url| url.trim().is_empty())
                .unwrap_or(true)
        {
            let mut err = ValidationError::new("provider_url");
            err.message = Some("provider_url is required when provider = \"http\"".into());
            errors.add("provider_url", err);
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub orders: OrderConfig,

    #[serde(default)]
    #[validate]
    pub invoices: InvoiceConfig,

    #[serde(default)]
    #[validate]
    pub notifications: NotificationConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            orders: OrderConfig::default(),
            invoices: InvoiceConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        self.notifications
            .validate_additional_constraints(&mut errors);

        if self.is_production() && self.notifications.provider.eq_ignore_ascii_case("log") {
            let mut err = ValidationError::new("provider");
            err.message =
                Some("The log-only notification provider must not be used in production".into());
            errors.add("provider", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_order_prefix() -> String {
    "ORD".to_string()
}

fn default_admin_notes_max_len() -> usize {
    2000
}

fn default_invoice_prefix() -> String {
    "INV".to_string()
}

fn default_due_days() -> i64 {
    30
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_backoff_secs() -> u64 {
    DEFAULT_BASE_BACKOFF_SECS
}
fn default_max_jitter_secs() -> u64 {
    DEFAULT_MAX_JITTER_SECS
}
fn default_send_timeout_secs() -> u64 {
    DEFAULT_SEND_TIMEOUT_SECS
}
fn default_claim_ttl_secs() -> u64 {
    DEFAULT_CLAIM_TTL_SECS
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_batch_size() -> u64 {
    50
}
fn default_send_concurrency() -> usize {
    4
}

fn default_from_address() -> String {
    "orders@example.com".to_string()
}

fn default_from_name() -> String {
    "Order Desk".to_string()
}

fn default_provider() -> String {
    "log".to_string()
}

fn validate_provider(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "log" | "http" => Ok(()),
        _ => {
            let mut err = ValidationError::new("provider");
            err.message = Some("Must be one of: log, http".into());
            Err(err)
        }
    }
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("orderflow={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://orderflow.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("auto_migrate", run_env == DEFAULT_ENV)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("notifications.admin_recipients"),
        )
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
