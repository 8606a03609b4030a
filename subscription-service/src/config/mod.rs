use chrono::FixedOffset;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::clock::parse_utc_offset;
use crate::services::engine::{EngineSettings, GraceDays};

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongodb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub mongodb: MongoConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Business timezone as `+HH:MM`.
    pub business_utc_offset: String,
    pub activation_threshold: Decimal,
    pub invoice_due_days: i64,
    pub grace_days_vip: i64,
    pub grace_days_trusted: i64,
    pub grace_days_default: i64,
    pub notifier_timeout_ms: u64,
    pub notifications_enabled: bool,
}

impl EngineConfig {
    pub fn business_offset(&self) -> Result<FixedOffset, AppError> {
        parse_utc_offset(&self.business_utc_offset)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            activation_threshold: self.activation_threshold,
            invoice_due_days: self.invoice_due_days,
            grace_days: GraceDays {
                vip: self.grace_days_vip,
                trusted: self.grace_days_trusted,
                default: self.grace_days_default,
            },
            notifier_timeout: Duration::from_millis(self.notifier_timeout_ms),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let defaults = EngineSettings::default();
        Self {
            business_utc_offset: "+03:00".to_string(),
            activation_threshold: defaults.activation_threshold,
            invoice_due_days: defaults.invoice_due_days,
            grace_days_vip: defaults.grace_days.vip,
            grace_days_trusted: defaults.grace_days.trusted,
            grace_days_default: defaults.grace_days.default,
            notifier_timeout_ms: defaults.notifier_timeout.as_millis() as u64,
            notifications_enabled: false,
        }
    }
}

impl SubscriptionConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = common_config.is_production();

        let backend = match get_env("STORAGE_BACKEND", Some("mongodb"), false)?
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "mongodb" => StorageBackend::Mongodb,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "unsupported STORAGE_BACKEND '{}'",
                    other
                )))
            }
        };
        // The in-memory backend never needs a connection string.
        let mongo_required = is_prod && backend == StorageBackend::Mongodb;
        let defaults = EngineConfig::default();

        let config = SubscriptionConfig {
            common: common_config,
            service_name: get_env("SERVICE_NAME", Some("subscription-service"), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            storage: StorageConfig {
                backend,
                mongodb: MongoConfig {
                    uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), mongo_required)?,
                    database: get_env(
                        "MONGODB_DATABASE",
                        Some("subscription_db"),
                        mongo_required,
                    )?,
                },
            },
            engine: EngineConfig {
                business_utc_offset: get_env(
                    "BUSINESS_UTC_OFFSET",
                    Some(&defaults.business_utc_offset),
                    false,
                )?,
                activation_threshold: parse_env(
                    "ACTIVATION_THRESHOLD",
                    defaults.activation_threshold,
                )?,
                invoice_due_days: parse_env("INVOICE_DUE_DAYS", defaults.invoice_due_days)?,
                grace_days_vip: parse_env("GRACE_DAYS_VIP", defaults.grace_days_vip)?,
                grace_days_trusted: parse_env("GRACE_DAYS_TRUSTED", defaults.grace_days_trusted)?,
                grace_days_default: parse_env("GRACE_DAYS_DEFAULT", defaults.grace_days_default)?,
                notifier_timeout_ms: parse_env(
                    "NOTIFIER_TIMEOUT_MS",
                    defaults.notifier_timeout_ms,
                )?,
                notifications_enabled: env::var("NOTIFICATIONS_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
            },
        };

        config.engine.business_offset()?;
        if config.engine.activation_threshold < Decimal::ZERO {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACTIVATION_THRESHOLD must not be negative"
            )));
        }
        Ok(config)
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("invalid value for {}: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_engine_config_matches_engine_defaults() {
        let config = EngineConfig::default();
        let settings = config.settings();
        assert_eq!(settings.activation_threshold, dec!(1));
        assert_eq!(settings.invoice_due_days, 7);
        assert_eq!(settings.grace_days, GraceDays::default());
        assert_eq!(settings.notifier_timeout, Duration::from_millis(2000));
        assert_eq!(
            config.business_offset().unwrap().local_minus_utc(),
            3 * 3600
        );
    }

    #[test]
    fn bad_offset_is_a_config_error() {
        let config = EngineConfig {
            business_utc_offset: "Riyadh".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.business_offset(),
            Err(AppError::ConfigError(_))
        ));
    }
}
