use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub cart: CartConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// HMAC secret for verifying session cookies. If empty, a random key is generated at startup.
    #[serde(default)]
    pub session_secret: String,
    /// Session TTL in hours (default 24).
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
    /// Base URL used for links in outgoing mail and payment redirects.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Borrowing policy.
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    /// Days between `requested_at` and `due_at`.
    #[serde(default = "default_loan_days")]
    pub loan_days: i64,
    /// Maximum simultaneous active/awaiting-confirmation requests per citizen.
    #[serde(default = "default_max_active_requests")]
    pub max_active_requests: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartConfig {
    #[serde(default = "default_max_qty")]
    pub max_qty: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    /// Write messages to the log only.
    #[default]
    Log,
    Smtp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub transport: MailTransport,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Seconds before an SMTP conversation is abandoned.
    #[serde(default = "default_integration_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default)]
    pub stripe_secret_key: String,
    #[serde(default)]
    pub stripe_webhook_secret: String,
    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,
    #[serde(default = "default_integration_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum age in seconds of a webhook signature timestamp.
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: i64,
}

/// A minute-resolution schedule. Empty lists match every value.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes to fire at (0..=59). Empty = every minute.
    #[serde(default)]
    pub schedule_minutes: Vec<u32>,
    /// Hours to fire at (0..=23). Empty = every hour.
    #[serde(default)]
    pub schedule_hours: Vec<u32>,
    /// Days of week to fire on (1=Mon..7=Sun, ISO). Empty = every day.
    #[serde(default)]
    pub schedule_day_of_week: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Due-tomorrow reminders (default: daily at 09:00).
    #[serde(default = "default_reminders_schedule")]
    pub reminders: ScheduleConfig,
    /// Abandoned-cart sweep (default: every 15 minutes).
    #[serde(default = "default_cart_sweep_schedule")]
    pub cart_sweep: ScheduleConfig,
    /// Minutes of inactivity after which a cart with items counts as abandoned.
    #[serde(default = "default_cart_abandon_after_minutes")]
    pub cart_abandon_after_minutes: i64,
    /// Maximum carts claimed per sweep.
    #[serde(default = "default_cart_sweep_limit")]
    pub cart_sweep_limit: i64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            loan_days: default_loan_days(),
            max_active_requests: default_max_active_requests(),
        }
    }
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            max_qty: default_max_qty(),
            currency: default_currency(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: MailTransport::default(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_address: default_from_address(),
            from_name: default_from_name(),
            timeout_secs: default_integration_timeout_secs(),
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            stripe_secret_key: String::new(),
            stripe_webhook_secret: String::new(),
            api_base: default_stripe_api_base(),
            timeout_secs: default_integration_timeout_secs(),
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enable: true,
            reminders: default_reminders_schedule(),
            cart_sweep: default_cart_sweep_schedule(),
            cart_abandon_after_minutes: default_cart_abandon_after_minutes(),
            cart_sweep_limit: default_cart_sweep_limit(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.library.loan_days < 1 {
            return Err(ConfigError::Invalid(
                "library.loan_days must be at least 1".to_string(),
            ));
        }
        if self.library.max_active_requests < 1 {
            return Err(ConfigError::Invalid(
                "library.max_active_requests must be at least 1".to_string(),
            ));
        }
        if self.cart.max_qty < 1 {
            return Err(ConfigError::Invalid(
                "cart.max_qty must be at least 1".to_string(),
            ));
        }
        if self.mail.transport == MailTransport::Smtp && self.mail.smtp_host.is_empty() {
            return Err(ConfigError::Invalid(
                "mail.smtp_host is required when mail.transport = \"smtp\"".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// Default value functions

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_session_ttl_hours() -> u64 {
    24
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_db_url() -> String {
    "sqlite://libris.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_loan_days() -> i64 {
    5
}

fn default_max_active_requests() -> i64 {
    3
}

fn default_max_qty() -> i64 {
    99
}

fn default_currency() -> String {
    "eur".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "library@localhost".to_string()
}

fn default_from_name() -> String {
    "Libris".to_string()
}

fn default_integration_timeout_secs() -> u64 {
    10
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_webhook_tolerance_secs() -> i64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_reminders_schedule() -> ScheduleConfig {
    ScheduleConfig {
        schedule_minutes: vec![0],
        schedule_hours: vec![9],
        schedule_day_of_week: vec![],
    }
}

fn default_cart_sweep_schedule() -> ScheduleConfig {
    ScheduleConfig {
        schedule_minutes: vec![0, 15, 30, 45],
        schedule_hours: vec![],
        schedule_day_of_week: vec![],
    }
}

fn default_cart_abandon_after_minutes() -> i64 {
    60
}

fn default_cart_sweep_limit() -> i64 {
    100
}
