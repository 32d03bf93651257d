//! Payment gateway credentials.

use url::Url;

/// Credentials and endpoint of the card/PromptPay payment provider.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Public key, used only to create payment sources.
    pub public_key: String,
    /// Secret key, used for charges, transfers and recipients.
    pub secret_key: String,
    pub api_url: Url,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .field("api_url", &self.api_url.as_str())
            .finish()
    }
}
