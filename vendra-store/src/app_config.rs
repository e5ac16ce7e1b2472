use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    pub business_rules: BusinessRules,
    pub governor: GovernorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub platform_fee_bps: u32,
    pub currency: String,
    #[serde(default = "default_client_timeout")]
    pub client_timeout_seconds: u64,
    #[serde(default = "default_idempotency_ttl")]
    pub idempotency_ttl_seconds: u64,
    pub inventory_endpoint: String,
    pub cart_endpoint: String,
}

fn default_client_timeout() -> u64 {
    5
}

fn default_idempotency_ttl() -> u64 {
    86_400
}

#[derive(Debug, Deserialize, Clone)]
pub struct GovernorConfig {
    pub max_in_flight: usize,
    pub default_deadline_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub webhook_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub consumer_group: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Layer the current environment file on top (optional)
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Environment variables win, e.g. VENDRA__SERVER__PORT=8080
            .add_source(config::Environment::with_prefix("VENDRA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
