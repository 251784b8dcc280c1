use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_LEDGER_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_AVAILABILITY_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_LOCK_MODE: &str = "reject";

/// How a second transition request on an aggregate that is already mid-transition is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Fail fast with `ConcurrentModification`.
    Reject,
    /// Queue behind the in-flight transition.
    Wait,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct WmsConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Upper bound for a single ledger document creation call
    #[serde(default = "default_ledger_timeout_ms")]
    #[validate(range(min = 1, max = 600000))]
    pub ledger_timeout_ms: u64,

    /// Upper bound for a single bin resolution call
    #[serde(default = "default_availability_timeout_ms")]
    #[validate(range(min = 1, max = 600000))]
    pub availability_timeout_ms: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// "reject" or "wait"
    #[serde(default = "default_lock_mode")]
    #[validate(custom = "validate_lock_mode")]
    pub lock_mode: String,

    /// Run the pick-route optimizer on the task a wave creates when picking starts
    #[serde(default = "default_true_bool")]
    pub auto_route_wave_tasks: bool,
}

impl Default for WmsConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            ledger_timeout_ms: default_ledger_timeout_ms(),
            availability_timeout_ms: default_availability_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            lock_mode: default_lock_mode(),
            auto_route_wave_tasks: true,
        }
    }
}

impl WmsConfig {
    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    pub fn availability_timeout(&self) -> Duration {
        Duration::from_millis(self.availability_timeout_ms)
    }

    pub fn lock_mode(&self) -> LockMode {
        if self.lock_mode.eq_ignore_ascii_case("wait") {
            LockMode::Wait
        } else {
            LockMode::Reject
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

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_ledger_timeout_ms() -> u64 {
    DEFAULT_LEDGER_TIMEOUT_MS
}

fn default_availability_timeout_ms() -> u64 {
    DEFAULT_AVAILABILITY_TIMEOUT_MS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_lock_mode() -> String {
    DEFAULT_LOCK_MODE.to_string()
}

fn default_true_bool() -> bool {
    true
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

fn validate_lock_mode(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "reject" | "wait" => Ok(()),
        _ => {
            let mut err = ValidationError::new("lock_mode");
            err.message = Some("Must be one of: reject, wait".into());
            Err(err)
        }
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("stateset_wms={},wms_cli={}", level, level);
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

/// Loads configuration from the default `config` directory.
pub fn load_config() -> Result<WmsConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. `{dir}/default.toml`
/// 3. `{dir}/{env}.toml`
/// 4. Environment variables (APP__*)
pub fn load_config_from(dir: &Path) -> Result<WmsConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.clone())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("ledger_timeout_ms", DEFAULT_LEDGER_TIMEOUT_MS as i64)?
        .set_default("availability_timeout_ms", DEFAULT_AVAILABILITY_TIMEOUT_MS as i64)?
        .set_default("event_channel_capacity", DEFAULT_EVENT_CHANNEL_CAPACITY as i64)?
        .set_default("lock_mode", DEFAULT_LOCK_MODE)?
        .set_default("auto_route_wave_tasks", true)?
        .add_source(
            File::with_name(&dir.join("default").to_string_lossy()).required(false),
        )
        .add_source(File::with_name(&dir.join(&run_env).to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let wms_config: WmsConfig = config.try_deserialize()?;

    wms_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(wms_config)
}
