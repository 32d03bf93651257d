//! Order read model and status vocabulary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `curio-core::entities`.
///
/// The legacy spelling `waiting_payment` is still accepted on input and
/// maps to [`OrderStatus::AwaitingPayment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Unpaid,
    #[serde(alias = "waiting_payment")]
    AwaitingPayment,
    Paid,
    Pending,
    Processing,
    Shipping,
    Completed,
    Rejected,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Unpaid,
        OrderStatus::AwaitingPayment,
        OrderStatus::Paid,
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipping,
        OrderStatus::Completed,
        OrderStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Unpaid => "unpaid",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Completed => "completed",
            OrderStatus::Rejected => "rejected",
        }
    }

    /// Whether money has been captured for an order in this status.
    pub fn is_post_payment(&self) -> bool {
        !matches!(self, OrderStatus::Unpaid | OrderStatus::AwaitingPayment)
    }

    /// Unsettled orders count against the one-open-order-per-buyer rule.
    pub fn is_unsettled(&self) -> bool {
        !self.is_post_payment()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct ParseOrderStatusError(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = ParseOrderStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting_payment" => Ok(OrderStatus::AwaitingPayment),
            other => OrderStatus::ALL
                .into_iter()
                .find(|status| status.as_str() == other)
                .ok_or_else(|| ParseOrderStatusError(other.to_owned())),
        }
    }
}

/// How the buyer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    PromptPay,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::PromptPay => write!(f, "promptpay"),
        }
    }
}

/// Delivery address captured on the order when it is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    pub line: String,
    pub subdistrict: String,
    pub district: String,
    pub province: String,
    pub zipcode: String,
}

/// One purchased product, priced at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl OrderLine {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Order as returned to buyers and sellers.
///
/// Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub items: Vec<OrderLine>,
    pub merchandise_total: Decimal,
    pub shipping_fee: Decimal,
    pub grand_total: Decimal,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_source_id: Option<String>,
    pub charge_id: Option<String>,
    pub transfer_id: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier_sender_name: Option<String>,
    pub shipping_address: ShippingAddress,
    pub created_at: i64,
    pub expires_at: i64,
    pub paid_at: Option<i64>,
}
