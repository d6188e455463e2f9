use thiserror::Error;

use super::Config;
use crate::rates::RateProvider;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database.url cannot be empty".to_string(),
            ));
        }

        if self.database.db_type().is_none() {
            return Err(ConfigError::InvalidConfig(format!(
                "database.url has an unsupported scheme: {}",
                self.database.url
            )));
        }

        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }

        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(ConfigError::InvalidConfig(
                "auth.bcrypt_cost must be between 4 and 31".to_string(),
            ));
        }

        if self.auth.session_ttl_hours == 0 {
            return Err(ConfigError::InvalidConfig(
                "auth.session_ttl_hours must be positive".to_string(),
            ));
        }

        if self.scheduler.enabled
            && (self.scheduler.budget_history_interval_secs == 0
                || self.scheduler.rates_refresh_interval_secs == 0)
        {
            return Err(ConfigError::InvalidConfig(
                "scheduler intervals must be positive".to_string(),
            ));
        }

        for (name, provider) in &self.rates.providers {
            if name.parse::<RateProvider>().is_err() {
                return Err(ConfigError::InvalidConfig(format!(
                    "rates.providers.{name} is not a known provider"
                )));
            }
            if provider.url.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "rates.providers.{name}.url cannot be empty"
                )));
            }
        }

        Ok(())
    }
}
