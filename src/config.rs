use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::CachePolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("missing required setting: {0}")]
    MissingField(&'static str),

    #[error("invalid bind address: {0}")]
    InvalidAddr(#[from] std::net::AddrParseError),
}

/// Relay configuration.
///
/// Read from an optional `image-insights.{toml,yaml,json}` file, then
/// overridden by `INSIGHTS__*` environment variables (`.env` is loaded first).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Account that owns the AI binding
    #[serde(default)]
    pub account_id: String,

    #[serde(default)]
    pub api_token: String,

    /// AI gateway identifier; calls go direct when unset
    #[serde(default)]
    pub gateway_id: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_gateway_base")]
    pub gateway_base: String,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            log_level: default_log_level(),
            log_json: false,
            account_id: String::new(),
            api_token: String::new(),
            gateway_id: None,
            model: default_model(),
            api_base: default_api_base(),
            gateway_base: default_gateway_base(),
            cache_enabled: true,
            cache_ttl_secs: default_cache_ttl_secs(),
            enable_cors: true,
        }
    }
}

impl RelayConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::File::with_name("image-insights").required(false))
            .add_source(
                config::Environment::with_prefix("INSIGHTS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Credentials must be present before the relay can reach the model.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account_id.trim().is_empty() {
            return Err(ConfigError::MissingField("account_id"));
        }
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::MissingField("api_token"));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(format!("{}:{}", self.bind_addr, self.port).parse()?)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            enabled: self.cache_enabled,
            ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> String {
    "@cf/meta/llama-3.2-11b-vision-instruct".to_string()
}

fn default_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_gateway_base() -> String {
    "https://gateway.ai.cloudflare.com/v1".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}
