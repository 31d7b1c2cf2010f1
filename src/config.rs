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
const DEFAULT_ACTIONS_API_BASE_URL: &str = "https://actions.googleapis.com/v3";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PRODUCT_IDS: [&str; 2] = ["premium", "coins"];
const DEFAULT_CONSUMABLE_PRODUCT_IDS: [&str; 1] = ["coins"];

/// Settings the required keys are checked against before deserialization
const REQUIRED_KEYS: [(&str, &str); 2] = [
    ("package_name", "APP__PACKAGE_NAME"),
    ("service_account_key_file", "APP__SERVICE_ACCOUNT_KEY_FILE"),
];

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment name (development, production, ...)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub log_json: bool,

    /// Android package name the digital goods belong to
    #[validate(length(min = 1))]
    pub package_name: String,

    /// Path to the service-account JSON key used for commerce API authorization
    #[validate(length(min = 1))]
    pub service_account_key_file: String,

    /// Base URL of the commerce API, without trailing slash
    #[serde(default = "default_actions_api_base_url")]
    #[validate(custom = "validate_base_url")]
    pub actions_api_base_url: String,

    /// Product ids offered when listing SKUs
    #[serde(default = "default_product_ids")]
    #[validate(length(min = 1))]
    pub product_ids: Vec<String>,

    /// Product ids that may be bought again once consumed
    #[serde(default = "default_consumable_product_ids")]
    pub consumable_product_ids: Vec<String>,

    /// Consume an owned consumable instead of starting a new purchase
    #[serde(default = "default_true_bool")]
    pub consume_owned_consumables: bool,

    /// Timeout in seconds for each outbound HTTP call
    #[serde(default = "default_http_timeout_secs")]
    #[validate(range(min = 1))]
    pub http_timeout_secs: u64,
}

impl AppConfig {
    /// Builds a configuration with defaults for everything but the required keys.
    pub fn new(package_name: String, service_account_key_file: String) -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            package_name,
            service_account_key_file,
            actions_api_base_url: default_actions_api_base_url(),
            product_ids: default_product_ids(),
            consumable_product_ids: default_consumable_product_ids(),
            consume_owned_consumables: true,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Base URL with any trailing slash removed, ready for path concatenation.
    pub fn api_base_url(&self) -> &str {
        self.actions_api_base_url.trim_end_matches('/')
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.product_ids.iter().any(|id| id.trim().is_empty()) {
            let mut err = ValidationError::new("product_ids");
            err.message = Some("product ids cannot be blank".into());
            errors.add("product_ids", err);
        }

        // Option keys are "{skuType},{id}", so a comma would make selections ambiguous
        if self
            .product_ids
            .iter()
            .chain(self.consumable_product_ids.iter())
            .any(|id| id.contains(','))
        {
            let mut err = ValidationError::new("product_ids");
            err.message = Some("product ids cannot contain ','".into());
            errors.add("product_ids", err);
        }

        if errors.is_empty() {
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
    Validation(#[from] ValidationErrors),
}

/// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
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

fn default_actions_api_base_url() -> String {
    DEFAULT_ACTIONS_API_BASE_URL.to_string()
}

fn default_product_ids() -> Vec<String> {
    DEFAULT_PRODUCT_IDS.iter().map(|s| s.to_string()).collect()
}

fn default_consumable_product_ids() -> Vec<String> {
    DEFAULT_CONSUMABLE_PRODUCT_IDS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true_bool() -> bool {
    true
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
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

fn validate_base_url(url: &str) -> Result<(), ValidationError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        let mut err = ValidationError::new("actions_api_base_url");
        err.message = Some("Must be an http(s) URL".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("digital_goods_fulfillment={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let result = if json {
        fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init()
    } else {
        fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init()
    };

    if let Err(err) = result {
        // A global subscriber was already installed (tests, embedding)
        tracing::debug!("tracing already initialized: {}", err);
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

    let builder = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("product_ids")
                .with_list_parse_key("consumable_product_ids"),
        );

    load_from(builder)
}

/// Finishes loading from a prepared builder: required-key check, deserialization, validation.
pub(crate) fn load_from(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<AppConfig, AppConfigError> {
    let config = builder.build()?;

    for (key, env_var) in REQUIRED_KEYS {
        if config.get_string(key).is_err() {
            error!(
                "{} is not configured. Set {} or add it to {}/default.toml.",
                key, env_var, CONFIG_DIR
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{} is required but not configured. Set {} environment variable.",
                key, env_var
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
