//! Omise REST client.
//!
//! Charges, transfers and recipients authenticate with the secret key;
//! sources are created with the public key. Charge and transfer calls carry
//! an `Idempotency-Key` header so a retried request never moves money twice.

use super::{
    Charge, ChargeRequest, ChargeSource, ChargeStatus, GatewayError, PaymentGateway, Recipient,
    RecipientRequest, Source, SourceRequest, Transfer, TransferRequest,
};
use crate::config::GatewayConfig;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

pub struct OmiseGateway {
    config: GatewayConfig,
    http_client: reqwest::Client,
}

impl OmiseGateway {
    pub const DEFAULT_API_URL: &str = "https://api.omise.co/";

    /// Build the client with `request_timeout` applied to every call.
    pub fn new(
        config: GatewayConfig,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.config
            .api_url
            .join(path)
            .map_err(|e| GatewayError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    fn secret_post(&self, path: &str) -> Result<reqwest::RequestBuilder, GatewayError> {
        Ok(self
            .http_client
            .post(self.endpoint(path)?)
            .basic_auth(&self.config.secret_key, None::<&str>))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        decode_response(status, &body)
    }
}

/// Turn a raw provider answer into `T` or a classified error.
fn decode_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, GatewayError> {
    if (200..300).contains(&status) {
        return serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()));
    }
    match serde_json::from_str::<OmiseError>(body) {
        Ok(err) => Err(GatewayError::Api {
            status,
            code: err.code,
            message: err.message,
        }),
        Err(_) => Err(GatewayError::Api {
            status,
            code: "unexpected_response".to_string(),
            message: body.chars().take(200).collect(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OmiseError {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct OmiseCharge {
    id: String,
    status: String,
    #[serde(default)]
    paid: bool,
    failure_message: Option<String>,
    source: Option<OmiseSource>,
    #[serde(default)]
    metadata: Option<ChargeMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChargeMetadata {
    order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OmiseSource {
    id: String,
    scannable_code: Option<ScannableCode>,
}

#[derive(Debug, Deserialize)]
struct ScannableCode {
    image: Option<ScannableImage>,
}

#[derive(Debug, Deserialize)]
struct ScannableImage {
    download_uri: Option<String>,
}

impl OmiseSource {
    fn qr_image_url(&self) -> Option<String> {
        self.scannable_code
            .as_ref()
            .and_then(|code| code.image.as_ref())
            .and_then(|image| image.download_uri.clone())
    }
}

#[derive(Debug, Deserialize)]
struct OmiseTransfer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OmiseRecipient {
    id: String,
    #[serde(default)]
    verified: bool,
}

#[derive(Debug, Serialize)]
struct ChargeBody<'a> {
    amount: i64,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    card: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    metadata: ChargeMetadata,
}

#[derive(Debug, Serialize)]
struct SourceBody<'a> {
    amount: i64,
    currency: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct TransferBody<'a> {
    amount: i64,
    recipient: &'a str,
}

#[derive(Debug, Serialize)]
struct RecipientBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(rename = "type")]
    kind: &'static str,
    bank_account: BankAccountBody<'a>,
}

#[derive(Debug, Serialize)]
struct BankAccountBody<'a> {
    brand: &'a str,
    number: &'a str,
    name: &'a str,
}

impl From<OmiseCharge> for Charge {
    fn from(charge: OmiseCharge) -> Self {
        let status = match charge.status.as_str() {
            "successful" => ChargeStatus::Successful,
            "pending" => ChargeStatus::Pending,
            "failed" => ChargeStatus::Failed,
            "expired" => ChargeStatus::Expired,
            "reversed" => ChargeStatus::Reversed,
            _ => ChargeStatus::Unknown,
        };
        Charge {
            qr_image_url: charge.source.as_ref().and_then(OmiseSource::qr_image_url),
            source_id: charge.source.map(|s| s.id),
            id: charge.id,
            status,
            paid: charge.paid,
            failure_message: charge.failure_message,
            order_id: charge
                .metadata
                .and_then(|m| m.order_id)
                .and_then(|id| id.parse().ok()),
        }
    }
}

// ---------------------------------------------------------------------------
// PaymentGateway implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl PaymentGateway for OmiseGateway {
    async fn create_charge(&self, req: ChargeRequest) -> Result<Charge, GatewayError> {
        let (card, source) = match &req.source {
            ChargeSource::Card(token) => (Some(token.as_str()), None),
            ChargeSource::Source(id) => (None, Some(id.as_str())),
        };
        let body = ChargeBody {
            amount: req.amount_minor,
            currency: &req.currency,
            card,
            source,
            metadata: ChargeMetadata {
                order_id: Some(req.order_id.to_string()),
            },
        };
        let request = self
            .secret_post("charges")?
            .header(IDEMPOTENCY_HEADER, &req.idempotency_key)
            .json(&body);
        let charge: OmiseCharge = self.send(request).await?;
        debug!(charge_id = %charge.id, status = %charge.status, "Charge created");
        Ok(charge.into())
    }

    async fn retrieve_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        let request = self
            .http_client
            .get(self.endpoint(&format!("charges/{charge_id}"))?)
            .basic_auth(&self.config.secret_key, None::<&str>);
        let charge: OmiseCharge = self.send(request).await?;
        Ok(charge.into())
    }

    async fn create_source(&self, req: SourceRequest) -> Result<Source, GatewayError> {
        let body = SourceBody {
            amount: req.amount_minor,
            currency: &req.currency,
            kind: "promptpay",
        };
        let request = self
            .http_client
            .post(self.endpoint("sources")?)
            .basic_auth(&self.config.public_key, None::<&str>)
            .json(&body);
        let source: OmiseSource = self.send(request).await?;
        Ok(Source {
            qr_image_url: source.qr_image_url(),
            id: source.id,
        })
    }

    async fn mark_source_paid(&self, source_id: &str) -> Result<(), GatewayError> {
        let request = self.secret_post(&format!("sources/{source_id}/mark_as_paid"))?;
        let _: serde_json::Value = self.send(request).await?;
        warn!(source_id, "Source marked as paid through the sandbox endpoint");
        Ok(())
    }

    async fn create_transfer(&self, req: TransferRequest) -> Result<Transfer, GatewayError> {
        let body = TransferBody {
            amount: req.amount_minor,
            recipient: &req.recipient_id,
        };
        let request = self
            .secret_post("transfers")?
            .header(IDEMPOTENCY_HEADER, &req.idempotency_key)
            .json(&body);
        let transfer: OmiseTransfer = self.send(request).await?;
        Ok(Transfer { id: transfer.id })
    }

    async fn create_recipient(&self, req: RecipientRequest) -> Result<Recipient, GatewayError> {
        let body = RecipientBody {
            name: &req.name,
            email: req.email.as_deref(),
            kind: "individual",
            bank_account: BankAccountBody {
                brand: &req.bank_brand,
                number: &req.account_number,
                name: &req.account_name,
            },
        };
        let request = self.secret_post("recipients")?.json(&body);
        let recipient: OmiseRecipient = self.send(request).await?;
        Ok(Recipient {
            id: recipient.id,
            verified: recipient.verified,
        })
    }
}
