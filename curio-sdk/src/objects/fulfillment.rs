//! Seller-side fulfillment bodies.

use serde::{Deserialize, Serialize};

/// Request body for `PUT /orders/{order_id}/tracking`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub tracking_number: String,
    pub sender_name: String,
}

/// Request body for `POST /seller/recipient`.
///
/// `bank_name` takes either the Thai display name of the bank or its
/// brand code (`kbank`, `scb`, `bbl`, `bay`, `ktb`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRegistration {
    pub first_name: String,
    pub last_name: String,
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientResponse {
    pub recipient_id: String,
    pub bank_brand: String,
    pub verified: bool,
}
