//! Checkout request and response bodies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::OrderResponse;

/// A product the buyer wants to purchase.
///
/// A missing quantity means one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// Payment method chosen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum PaymentSelection {
    /// Charge a tokenized card right away.
    Card { token: String },
    /// Issue a PromptPay QR code the buyer scans within the payment window.
    PromptPay,
}

/// Request body for `POST /orders/checkout`.
///
/// Without an `address_id` the buyer's default address is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub address_id: Option<Uuid>,
    pub payment: PaymentSelection,
}

/// Request body for `POST /orders/{order_id}/pay`, retrying a card order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPayment {
    pub token: String,
}

/// What the buyer needs to complete (or confirm) payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum PaymentArtifact {
    Card {
        charge_id: String,
        paid: bool,
    },
    PromptPay {
        source_id: String,
        charge_id: String,
        qr_image_url: String,
        expires_at: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    pub payment: PaymentArtifact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_request_parsing() {
        let json = r#"{
            "items": [
                {"product_id": "0190c0de-0000-7000-8000-000000000001"},
                {"product_id": "0190c0de-0000-7000-8000-000000000002", "quantity": 2}
            ],
            "payment": {"method": "card", "token": "tokn_test_123"}
        }"#;
        let req: CheckoutRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.items.len(), 2);
        assert_eq!(req.items[0].quantity, None);
        assert_eq!(req.items[1].quantity, Some(2));
        assert_eq!(req.address_id, None);
        assert_eq!(
            req.payment,
            PaymentSelection::Card {
                token: "tokn_test_123".to_string()
            }
        );
    }

    #[test]
    fn test_promptpay_selection_parsing() {
        let selection: PaymentSelection =
            serde_json::from_str(r#"{"method": "promptpay"}"#).unwrap();
        assert_eq!(selection, PaymentSelection::PromptPay);
    }
}
