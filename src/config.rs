use std::collections::HashMap;
use std::env;

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_TAX_RATE: Decimal = dec!(0.08);
const DEFAULT_DUPLICATE_WINDOW_SECS: u64 = 30;
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_FEED_BACKOFF_SECS: u64 = 5;

/// Payment gateway credentials and endpoint. Absent configuration makes
/// every charge path fail fast with `GatewayConfigMissing`.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GatewayConfig {
    #[validate(length(min = 1))]
    pub api_login_id: String,
    #[validate(length(min = 1))]
    pub transaction_key: String,
    /// Provider API endpoint, e.g. the sandbox or production URL.
    pub endpoint: String,
    /// Per-call timeout. A timeout leaves charge success ambiguous and is
    /// surfaced as `GatewayTimeout`, never retried by the core.
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

/// Which change-detection backend drives order notifications.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifierMode {
    /// Subscribe to the in-process order change feed.
    Push,
    /// Periodically scan `updated_at` against a checkpoint.
    Poll,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_notifier_mode")]
    pub mode: NotifierMode,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Delay before resubscribing after a broken change feed.
    #[serde(default = "default_feed_backoff_secs")]
    pub feed_backoff_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            mode: default_notifier_mode(),
            poll_interval_secs: default_poll_interval_secs(),
            feed_backoff_secs: default_feed_backoff_secs(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// JWT verification secret
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Tenant key -> database URL. Requests select a tenant with the
    /// `X-Store-Db` header; there is no default tenant.
    #[serde(default)]
    pub tenants: HashMap<String, String>,

    /// Create tables on first connect to a tenant database.
    #[serde(default)]
    pub auto_migrate: bool,

    /// Sales tax rate applied to the cart subtotal.
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,

    /// Trailing window during which a repeat charge for the same payer and
    /// amount is treated as a client retry and rejected.
    #[serde(default = "default_duplicate_window_secs")]
    pub duplicate_window_secs: u64,

    /// Comma-separated list of allowed CORS origins. Permissive when unset
    /// in development.
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    pub gateway: Option<GatewayConfig>,

    #[serde(default)]
    pub notifier: NotifierConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_tax_rate() -> Decimal {
    DEFAULT_TAX_RATE
}
fn default_duplicate_window_secs() -> u64 {
    DEFAULT_DUPLICATE_WINDOW_SECS
}
fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}
fn default_notifier_mode() -> NotifierMode {
    NotifierMode::Push
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_feed_backoff_secs() -> u64 {
    DEFAULT_FEED_BACKOFF_SECS
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
    pub fn new(host: String, port: u16, jwt_secret: String, environment: String) -> Self {
        Self {
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            jwt_secret,
            tenants: HashMap::new(),
            auto_migrate: false,
            tax_rate: default_tax_rate(),
            duplicate_window_secs: default_duplicate_window_secs(),
            cors_allowed_origins: None,
            gateway: None,
            notifier: NotifierConfig::default(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }
}

/// Load configuration from `config/default.toml`, an environment-specific
/// overlay, and `APP__`-prefixed environment variables (highest priority).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;
    Ok(app_config)
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}
