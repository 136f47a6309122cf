use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Payment-gateway connection settings.
#[derive(Clone, Debug, Deserialize)]
pub struct PaymentConfig {
    pub base_url: String,
    pub app_id: String,
    pub secret_key: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: i64,
    pub log_level: String,
    pub environment: String,
    pub event_buffer: usize,
    pub payment: Option<PaymentConfig>,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Loads configuration from `config/{default,local}.toml` with `APP__`
/// environment overrides (e.g. `APP__PORT=8080`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", 3000)?
        .set_default("jwt_secret", "change-me-in-production")?
        .set_default("jwt_expiration", 86400)?
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("event_buffer", 1024)?
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()
}
