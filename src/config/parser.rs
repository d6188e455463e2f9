use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub planning: PlanningConfig,
    #[serde(default)]
    pub rates: RatesConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Mysql,
    Sqlite,
}

impl DatabaseConfig {
    pub fn db_type(&self) -> Option<DbType> {
        let url = self.url.trim();
        if url.starts_with("sqlite://") {
            Some(DbType::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(DbType::Postgres)
        } else if url.starts_with("mysql://") {
            Some(DbType::Mysql)
        } else {
            None
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        match self.db_type() {
            Some(DbType::Sqlite) => self
                .url
                .trim()
                .strip_prefix("sqlite://")
                .map(str::to_string),
            _ => None,
        }
    }

    pub fn max_connections(&self) -> u32 {
        match self.db_type() {
            Some(DbType::Sqlite) => self.max_connections.unwrap_or(1),
            _ => self.max_connections.unwrap_or(10),
        }
    }

    pub fn min_connections(&self) -> u32 {
        self.min_connections.unwrap_or(1).min(self.max_connections())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
            bcrypt_cost: default_bcrypt_cost(),
            cookie_name: default_cookie_name(),
            secure_cookies: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    #[serde(default = "default_budget_history_interval")]
    pub budget_history_interval_secs: u64,
    #[serde(default = "default_rates_refresh_interval")]
    pub rates_refresh_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            budget_history_interval_secs: default_budget_history_interval(),
            rates_refresh_interval_secs: default_rates_refresh_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlanningConfig {
    #[serde(default = "default_health_cache_ttl")]
    pub health_cache_ttl_secs: u64,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            health_cache_ttl_secs: default_health_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RatesConfig {
    #[serde(default)]
    pub providers: BTreeMap<String, RateProviderConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateProviderConfig {
    pub url: String,
    #[serde(default = "default_rate_timeout")]
    pub timeout_secs: u64,
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config_path = path
            .map(str::to_string)
            .or_else(|| std::env::var("CONFIG_PATH").ok())
            .unwrap_or_else(|| "config.yaml".to_string());

        Self::load_from_file(&config_path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("FINANCE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = lookup("FINANCE_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(port) = lookup("FINANCE_PORT").and_then(|value| value.parse().ok()) {
            self.server.port = port;
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_session_ttl_hours() -> u64 {
    24 * 30
}

fn default_bcrypt_cost() -> u32 {
    12
}

fn default_cookie_name() -> String {
    "finance_session".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_budget_history_interval() -> u64 {
    30 * 60
}

fn default_rates_refresh_interval() -> u64 {
    60 * 60
}

fn default_health_cache_ttl() -> u64 {
    30 * 60
}

fn default_rate_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const MINIMAL: &str = r#"
database:
  url: sqlite://finance.db
"#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.cookie_name, "finance_session");
        assert_eq!(config.scheduler.budget_history_interval_secs, 1800);
        assert_eq!(config.planning.health_cache_ttl_secs, 1800);
        assert_eq!(config.database.db_type(), Some(DbType::Sqlite));
        assert_eq!(config.database.sqlite_path().as_deref(), Some("finance.db"));
        assert_eq!(config.database.max_connections(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn database_scheme_selects_backend() {
        let mut db = DatabaseConfig {
            url: "postgresql://u:p@localhost/finance".to_string(),
            max_connections: None,
            min_connections: Some(4),
        };
        assert_eq!(db.db_type(), Some(DbType::Postgres));
        assert_eq!(db.max_connections(), 10);
        assert_eq!(db.min_connections(), 4);
        assert!(db.sqlite_path().is_none());

        db.url = "mysql://u:p@localhost/finance".to_string();
        assert_eq!(db.db_type(), Some(DbType::Mysql));

        db.url = "redis://localhost".to_string();
        assert_eq!(db.db_type(), None);
    }

    #[test]
    fn env_overrides_replace_values() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("FINANCE_DATABASE_URL", "postgres://db/finance"),
            ("FINANCE_PORT", "9090"),
        ]);
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.database.url, "postgres://db/finance");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.bind_address, "0.0.0.0");
    }

    #[test]
    fn rate_providers_are_parsed() {
        let config = Config::from_yaml(
            r#"
database:
  url: sqlite://finance.db
rates:
  providers:
    official:
      url: https://rates.example.org/official
    parallel:
      url: https://rates.example.org/parallel
      timeout_secs: 3
"#,
        )
        .unwrap();
        assert_eq!(config.rates.providers.len(), 2);
        assert_eq!(config.rates.providers["official"].timeout_secs, 10);
        assert_eq!(config.rates.providers["parallel"].timeout_secs, 3);
    }
}
