//! Payment gateway client.
//!
//! [`PaymentGateway`] is the seam between the order engine and the card /
//! PromptPay provider. [`OmiseGateway`] talks to the provider's HTTPS API;
//! tests substitute a scripted fake.
//!
//! Amounts cross this boundary in minor units (satang for THB).

mod omise;

pub use omise::OmiseGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by gateway calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider answered with an error object.
    #[error("gateway API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The provider accepted the request but refused the payment.
    #[error("charge {charge_id} declined: {message}")]
    Declined { charge_id: String, message: String },

    /// The request deadline elapsed before an answer arrived.
    #[error("gateway request timed out")]
    Timeout,

    /// The request may or may not have reached the provider.
    #[error("gateway transport error: {0}")]
    Transport(String),

    /// An answer arrived but could not be understood.
    #[error("gateway response decode error: {0}")]
    Decode(String),

    #[error("amount {0} cannot be expressed in minor units")]
    InvalidAmount(Decimal),
}

impl GatewayError {
    /// Whether the provider may have applied the operation despite the error.
    ///
    /// Such failures must be reconciled by retrying with the same
    /// idempotency key, never by assuming nothing happened.
    pub fn is_outcome_unknown(&self) -> bool {
        match self {
            GatewayError::Timeout | GatewayError::Transport(_) | GatewayError::Decode(_) => true,
            GatewayError::Api { status, .. } => *status >= 500,
            GatewayError::Declined { .. } | GatewayError::InvalidAmount(_) => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

/// Convert a major-unit amount to integral minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64, GatewayError> {
    let minor = amount * Decimal::ONE_HUNDRED;
    if amount <= Decimal::ZERO || minor.fract() != Decimal::ZERO {
        return Err(GatewayError::InvalidAmount(amount));
    }
    minor.to_i64().ok_or(GatewayError::InvalidAmount(amount))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeSource {
    /// Tokenized card.
    Card(String),
    /// Previously created payment source (PromptPay).
    Source(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub source: ChargeSource,
    pub idempotency_key: String,
    /// Stored on the charge so it can be traced back to its order.
    pub order_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    Successful,
    Pending,
    Failed,
    Expired,
    Reversed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub id: String,
    pub status: ChargeStatus,
    pub paid: bool,
    pub source_id: Option<String>,
    pub qr_image_url: Option<String>,
    pub failure_message: Option<String>,
    /// Order recorded on the charge when it was created.
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: String,
    pub qr_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub amount_minor: i64,
    pub recipient_id: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientRequest {
    pub name: String,
    pub email: Option<String>,
    pub bank_brand: String,
    pub account_number: String,
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub id: String,
    pub verified: bool,
}

/// Operations the order engine needs from the payment provider.
///
/// Implementations must not retry on their own; deadlines are applied by
/// the caller.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(&self, req: ChargeRequest) -> Result<Charge, GatewayError>;

    async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, GatewayError>;

    /// Create a PromptPay source for `amount_minor`.
    async fn create_source(&self, req: SourceRequest) -> Result<Source, GatewayError>;

    /// Sandbox-only: simulate the buyer scanning and paying a source.
    async fn mark_source_paid(&self, source_id: &str) -> Result<(), GatewayError>;

    async fn create_transfer(&self, req: TransferRequest) -> Result<Transfer, GatewayError>;

    async fn create_recipient(&self, req: RecipientRequest) -> Result<Recipient, GatewayError>;
}
