pub use self::parser::{
    AuthConfig, Config, DatabaseConfig, DbType, LoggingConfig, RateProviderConfig, RatesConfig,
    SchedulerConfig, ServerConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
