//! Marketplace-wide pricing and timing policy.

use rust_decimal::Decimal;
use std::time::Duration;

/// Policy knobs read by the order engine on every operation.
///
/// Held inside a [`ConfigStore`](super::ConfigStore) so a SIGHUP reload
/// takes effect without restarting in-flight processors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplacePolicy {
    /// ISO 4217 code sent to the gateway, lowercase (e.g. `thb`).
    pub currency: String,
    /// Flat shipping fee added to every order, in major units.
    pub shipping_fee: Decimal,
    /// How long a PromptPay order waits for payment before it is swept.
    pub payment_window: time::Duration,
    /// Period of the expiry sweeper.
    pub sweep_interval: Duration,
    /// Deadline applied to every payment gateway call.
    pub gateway_timeout: Duration,
    /// Enables the test-only "mark paid" simulation.
    pub sandbox: bool,
}

impl Default for MarketplacePolicy {
    fn default() -> Self {
        Self {
            currency: "thb".to_string(),
            shipping_fee: Decimal::from(40),
            payment_window: time::Duration::minutes(1),
            sweep_interval: Duration::from_secs(60),
            gateway_timeout: Duration::from_secs(10),
            sandbox: false,
        }
    }
}
