use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::ChannelKind;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Document store configuration
    pub state: StateConfig,

    /// Send quota configuration
    pub quota: QuotaConfig,

    /// Dispatch configuration
    pub dispatch: DispatchConfig,

    /// Channel backend configuration
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Rolling metrics configuration
    pub metrics: MetricsConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/dispatcher.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: NOTIFY__)
            .add_source(
                config::Environment::with_prefix("NOTIFY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults only, without reading files or the environment
    pub fn from_defaults() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Store backend type
    #[serde(default)]
    pub backend: StateBackend,

    /// Path for the embedded database (sled)
    pub path: Option<PathBuf>,

    /// Collection holding per-day usage counters
    #[serde(default = "default_counters_collection")]
    pub counters_collection: String,

    /// Collection holding channel configurations
    #[serde(default = "default_configs_collection")]
    pub configs_collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Maximum successful sends per calendar month
    #[serde(default = "default_monthly_send_limit")]
    pub monthly_send_limit: u64,

    /// Attempts before a conflicting counter increment gives up
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    /// Backoff before the first retry (milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling (milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Timeout applied to every document store call (milliseconds)
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Approximate email size limit (bytes)
    #[serde(default = "default_email_size_limit")]
    pub email_size_limit_bytes: usize,

    /// Channel kinds that may be dispatched to
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<ChannelKind>,

    /// Hosts webhook-family channels refuse to contact
    #[serde(default)]
    pub host_deny_list: Vec<String>,

    /// HTTP request timeout for webhook-family backends (seconds)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// HTTP connect timeout (seconds)
    #[serde(default = "default_http_connect_timeout")]
    pub http_connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    /// Account used for `smtp:` destinations given on the command line
    pub smtp: Option<SmtpDefaults>,

    /// Account used for `ses:` destinations given on the command line
    pub ses: Option<SesDefaults>,

    /// AWS credentials and endpoints for SNS/SES
    #[serde(default)]
    pub aws: AwsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpDefaults {
    pub name: String,
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub method: crate::models::SmtpMethod,
    pub from_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SesDefaults {
    pub name: String,
    pub region: String,
    pub role_arn: Option<String>,
    pub from_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Region used when a destination does not name one
    #[serde(default = "default_aws_region")]
    pub region: String,

    /// Access key (from env var)
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,

    /// Secret key (from env var)
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,

    /// Session token (from env var)
    #[serde(default = "default_session_token_env")]
    pub session_token_env: String,

    /// SNS endpoint override, e.g. for local testing
    pub sns_endpoint: Option<String>,

    /// SES endpoint override
    pub ses_endpoint: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_aws_region(),
            access_key_env: default_access_key_env(),
            secret_key_env: default_secret_key_env(),
            session_token_env: default_session_token_env(),
            sns_endpoint: None,
            ses_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Rolling counter retention window (seconds)
    #[serde(default = "default_rolling_window")]
    pub rolling_window_secs: u64,

    /// Rolling counter bucket width (seconds)
    #[serde(default = "default_bucket_interval")]
    pub bucket_interval_secs: u64,

    /// Trim buckets once live buckets exceed this multiple of window / interval
    #[serde(default = "default_trim_factor")]
    pub trim_factor: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_counters_collection() -> String {
    "notification-usage".to_string()
}

fn default_configs_collection() -> String {
    "notification-config".to_string()
}

fn default_monthly_send_limit() -> u64 {
    10_000
}

fn default_max_conflict_retries() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    1_000
}

fn default_operation_timeout_ms() -> u64 {
    5_000
}

fn default_email_size_limit() -> usize {
    10_000_000 // 10 MB
}

fn default_allowed_types() -> Vec<ChannelKind> {
    ChannelKind::all()
}

fn default_http_timeout() -> u64 {
    10
}

fn default_http_connect_timeout() -> u64 {
    5
}

fn default_smtp_port() -> u16 {
    587
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}

fn default_access_key_env() -> String {
    "AWS_ACCESS_KEY_ID".to_string()
}

fn default_secret_key_env() -> String {
    "AWS_SECRET_ACCESS_KEY".to_string()
}

fn default_session_token_env() -> String {
    "AWS_SESSION_TOKEN".to_string()
}

fn default_rolling_window() -> u64 {
    3_600
}

fn default_bucket_interval() -> u64 {
    60
}

fn default_trim_factor() -> u64 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "notification-dispatcher".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_monthly_send_limit(), 10_000);
        assert_eq!(default_email_size_limit(), 10_000_000);
        assert_eq!(default_rolling_window() / default_bucket_interval(), 60);
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn test_state_backend() {
        assert_eq!(StateBackend::default(), StateBackend::Memory);
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config = Config::from_defaults().unwrap();
        assert_eq!(config.state.backend, StateBackend::Memory);
        assert_eq!(config.quota.monthly_send_limit, 10_000);
        assert_eq!(config.dispatch.allowed_types.len(), ChannelKind::all().len());
        assert!(config.channels.smtp.is_none());
    }
}
