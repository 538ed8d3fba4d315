//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub billing: BillingConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Billing-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Default horizon in days for consumption projections
    #[serde(default = "default_projection_days")]
    pub default_projection_days: i64,

    /// Number of recent usage reports averaged for machinery projections
    #[serde(default = "default_usage_history_window")]
    pub usage_history_window: i64,

    /// Minimum hours between repeated low-balance alerts for one account
    #[serde(default = "default_alert_interval")]
    pub alert_interval_hours: i64,

    /// How many days back the missing-report job looks for usage reports
    #[serde(default = "default_missing_report_lookback")]
    pub missing_report_lookback_days: i64,
}

fn default_projection_days() -> i64 {
    7
}

fn default_usage_history_window() -> i64 {
    7
}

fn default_alert_interval() -> i64 {
    24
}

fn default_missing_report_lookback() -> i64 {
    1
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("database.max_connections", 10)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("billing.default_projection_days", 7)?
            .set_default("billing.usage_history_window", 7)?
            .set_default("billing.alert_interval_hours", 24)?
            .set_default("billing.missing_report_lookback_days", 1)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with RENTA_ prefix
            .add_source(
                Environment::with_prefix("RENTA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("RENTA").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_projection_days: 7,
            usage_history_window: 7,
            alert_interval_hours: 24,
            missing_report_lookback_days: 1,
        }
    }
}
