//! TOML file configuration structures.
//!
//! These structs directly map to the `curio-config.toml` file format.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Session token verification.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// HMAC secret shared with the login service.
    pub secret: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: i64,
}

fn default_token_ttl_secs() -> i64 {
    curio_sdk::session::DEFAULT_SESSION_TTL
}

/// Marketplace pricing and timing policy.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Flat shipping fee in major units, e.g. `"40"`.
    #[serde(default = "default_shipping_fee")]
    pub shipping_fee: Decimal,
    #[serde(default = "default_payment_window_secs")]
    pub payment_window_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Enables `POST /orders/{id}/mark-paid`.
    #[serde(default)]
    pub sandbox: bool,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            shipping_fee: default_shipping_fee(),
            payment_window_secs: default_payment_window_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sandbox: false,
        }
    }
}

fn default_currency() -> String {
    "thb".to_string()
}

fn default_shipping_fee() -> Decimal {
    Decimal::from(40)
}

fn default_payment_window_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Payment gateway credentials. Keys may be left empty here and supplied
/// through `OMISE_PUBLIC_KEY` / `OMISE_SECRET_KEY` instead.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Defaults to the provider's public endpoint.
    #[serde(default)]
    pub api_url: Option<Url>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            public_key: String::new(),
            secret_key: String::new(),
            api_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[session]
secret = "session-secret"
token_ttl_secs = 3600

[marketplace]
currency = "thb"
shipping_fee = "50"
payment_window_secs = 120
sweep_interval_secs = 30
sandbox = true

[gateway]
public_key = "pkey_test_123"
secret_key = "skey_test_123"
api_url = "https://api.omise.co/"
request_timeout_secs = 8
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.session.token_ttl_secs, 3600);
        assert_eq!(config.marketplace.shipping_fee, Decimal::from(50));
        assert_eq!(config.marketplace.payment_window_secs, 120);
        assert!(config.marketplace.sandbox);
        assert_eq!(config.gateway.public_key, "pkey_test_123");
        assert_eq!(config.gateway.request_timeout_secs, 8);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: FileConfig = toml::from_str("[session]\nsecret = \"s\"\n").unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(
            config.session.token_ttl_secs,
            curio_sdk::session::DEFAULT_SESSION_TTL
        );
        assert_eq!(config.marketplace.currency, "thb");
        assert_eq!(config.marketplace.shipping_fee, Decimal::from(40));
        assert_eq!(config.marketplace.payment_window_secs, 60);
        assert!(!config.marketplace.sandbox);
        assert_eq!(config.gateway.api_url, None);
        assert_eq!(config.gateway.request_timeout_secs, 10);
    }

    #[test]
    fn test_missing_session_is_rejected() {
        assert!(toml::from_str::<FileConfig>("[server]\nlisten = \"127.0.0.1:1\"\n").is_err());
    }
}
