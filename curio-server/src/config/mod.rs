//! Configuration module for curio-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables, and turns it into the validated runtime
//! types used by the order core.

pub mod file;

use crate::config::file::FileConfig;
use curio_core::config::{GatewayConfig, MarketplacePolicy};
use curio_core::gateway::OmiseGateway;
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const PUBLIC_KEY_ENV: &str = "OMISE_PUBLIC_KEY";
const SECRET_KEY_ENV: &str = "OMISE_SECRET_KEY";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Session verification settings.
#[derive(Clone)]
pub struct SessionSettings {
    pub secret: Box<[u8]>,
    /// Maximum token age in seconds.
    pub token_ttl: i64,
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub session: SessionSettings,
    pub policy: MarketplacePolicy,
    pub gateway: GatewayConfig,
    pub gateway_timeout: Duration,
}

/// Gateway keys taken from the environment, overriding the file.
#[derive(Debug, Clone, Default)]
pub struct KeyOverrides {
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
}

impl KeyOverrides {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v: &String| !v.is_empty());
        Self {
            public_key: read(PUBLIC_KEY_ENV),
            secret_key: read(SECRET_KEY_ENV),
        }
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read, override and validate the configuration file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        build_loaded_config(file_config, KeyOverrides::from_env())
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.session.secret.is_empty() {
        return Err(invalid("session.secret must not be empty"));
    }
    if config.session.token_ttl_secs <= 0 {
        return Err(invalid("session.token_ttl_secs must be positive"));
    }
    let marketplace = &config.marketplace;
    if marketplace.currency.len() != 3 || !marketplace.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid(format!(
            "marketplace.currency {:?} is not a 3-letter code",
            marketplace.currency
        )));
    }
    if marketplace.shipping_fee < Decimal::ZERO {
        return Err(invalid("marketplace.shipping_fee must not be negative"));
    }
    if marketplace.payment_window_secs < 1 {
        return Err(invalid("marketplace.payment_window_secs must be at least 1"));
    }
    if marketplace.sweep_interval_secs < 1 {
        return Err(invalid("marketplace.sweep_interval_secs must be at least 1"));
    }
    if !(1..=60).contains(&config.gateway.request_timeout_secs) {
        return Err(invalid(
            "gateway.request_timeout_secs must be between 1 and 60",
        ));
    }
    Ok(())
}

/// Apply key overrides, validate, and convert to runtime types.
pub fn build_loaded_config(
    mut file_config: FileConfig,
    overrides: KeyOverrides,
) -> Result<LoadedConfig, ConfigError> {
    if let Some(key) = overrides.public_key {
        file_config.gateway.public_key = key;
    }
    if let Some(key) = overrides.secret_key {
        file_config.gateway.secret_key = key;
    }
    validate(&file_config)?;
    if file_config.gateway.public_key.is_empty() || file_config.gateway.secret_key.is_empty() {
        return Err(invalid(format!(
            "gateway keys missing, set them in [gateway] or via {PUBLIC_KEY_ENV}/{SECRET_KEY_ENV}"
        )));
    }

    let api_url = match file_config.gateway.api_url {
        Some(url) => url,
        None => Url::parse(OmiseGateway::DEFAULT_API_URL)
            .map_err(|e| invalid(format!("gateway.api_url: {e}")))?,
    };
    let gateway_timeout = Duration::from_secs(file_config.gateway.request_timeout_secs);
    let marketplace = file_config.marketplace;

    Ok(LoadedConfig {
        listen: file_config.server.listen,
        session: SessionSettings {
            secret: file_config.session.secret.into_bytes().into_boxed_slice(),
            token_ttl: file_config.session.token_ttl_secs,
        },
        policy: MarketplacePolicy {
            currency: marketplace.currency.to_ascii_lowercase(),
            shipping_fee: marketplace.shipping_fee,
            payment_window: time::Duration::seconds(
                i64::try_from(marketplace.payment_window_secs)
                    .map_err(|_| invalid("marketplace.payment_window_secs is too large"))?,
            ),
            sweep_interval: Duration::from_secs(marketplace.sweep_interval_secs),
            gateway_timeout,
            sandbox: marketplace.sandbox,
        },
        gateway: GatewayConfig {
            public_key: file_config.gateway.public_key,
            secret_key: file_config.gateway.secret_key,
            api_url,
        },
        gateway_timeout,
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
