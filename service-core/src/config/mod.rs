use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Settings shared by every service: listener port and deployment
/// environment, read from an optional `configuration` file overlaid with
/// `APP__*` variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    "dev".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            environment: default_environment(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let mut builder = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        // Plain ENVIRONMENT wins over APP__ENVIRONMENT, matching deploy manifests.
        if let Ok(environment) = std::env::var("ENVIRONMENT") {
            builder = builder.set_override("environment", environment)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Production requires every connection setting to be explicit.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("prod")
            || self.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_development() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert!(!config.is_production());
    }

    #[test]
    fn recognises_production_names() {
        for name in ["prod", "PROD", "production"] {
            let config = Config {
                environment: name.to_string(),
                ..Config::default()
            };
            assert!(config.is_production(), "{} should be production", name);
        }
    }
}
