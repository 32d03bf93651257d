pub mod order_records;
pub mod products;
pub mod users;

use curio_sdk::objects::{OrderStatus as SdkOrderStatus, PaymentMethod as SdkPaymentMethod};

/// Order status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `curio_sdk::objects::OrderStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "order_status")]
pub enum OrderStatus {
    Unpaid,
    AwaitingPayment,
    Paid,
    Pending,
    Processing,
    Shipping,
    Completed,
    Rejected,
}

impl OrderStatus {
    /// Statuses a seller sees in their order list: anything already paid for.
    pub const SELLER_VISIBLE: [OrderStatus; 6] = [
        OrderStatus::Paid,
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipping,
        OrderStatus::Completed,
        OrderStatus::Rejected,
    ];

    /// Statuses from which the seller may hand the parcel to a carrier.
    pub const TRACKABLE: [OrderStatus; 3] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Shipping,
    ];

    /// Statuses from which the buyer may confirm delivery.
    pub const DELIVERABLE: [OrderStatus; 2] = [OrderStatus::Processing, OrderStatus::Paid];

    pub fn as_str(&self) -> &'static str {
        SdkOrderStatus::from(*self).as_str()
    }

    pub fn is_unsettled(&self) -> bool {
        matches!(self, OrderStatus::Unpaid | OrderStatus::AwaitingPayment)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<OrderStatus> for SdkOrderStatus {
    fn from(value: OrderStatus) -> Self {
        match value {
            OrderStatus::Unpaid => SdkOrderStatus::Unpaid,
            OrderStatus::AwaitingPayment => SdkOrderStatus::AwaitingPayment,
            OrderStatus::Paid => SdkOrderStatus::Paid,
            OrderStatus::Pending => SdkOrderStatus::Pending,
            OrderStatus::Processing => SdkOrderStatus::Processing,
            OrderStatus::Shipping => SdkOrderStatus::Shipping,
            OrderStatus::Completed => SdkOrderStatus::Completed,
            OrderStatus::Rejected => SdkOrderStatus::Rejected,
        }
    }
}

impl From<SdkOrderStatus> for OrderStatus {
    fn from(value: SdkOrderStatus) -> Self {
        match value {
            SdkOrderStatus::Unpaid => OrderStatus::Unpaid,
            SdkOrderStatus::AwaitingPayment => OrderStatus::AwaitingPayment,
            SdkOrderStatus::Paid => OrderStatus::Paid,
            SdkOrderStatus::Pending => OrderStatus::Pending,
            SdkOrderStatus::Processing => OrderStatus::Processing,
            SdkOrderStatus::Shipping => OrderStatus::Shipping,
            SdkOrderStatus::Completed => OrderStatus::Completed,
            SdkOrderStatus::Rejected => OrderStatus::Rejected,
        }
    }
}

/// Payment method for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "payment_method")]
pub enum PaymentMethod {
    Card,
    PromptPay,
}

impl From<PaymentMethod> for SdkPaymentMethod {
    fn from(value: PaymentMethod) -> Self {
        match value {
            PaymentMethod::Card => SdkPaymentMethod::Card,
            PaymentMethod::PromptPay => SdkPaymentMethod::PromptPay,
        }
    }
}

impl From<SdkPaymentMethod> for PaymentMethod {
    fn from(value: SdkPaymentMethod) -> Self {
        match value {
            SdkPaymentMethod::Card => PaymentMethod::Card,
            SdkPaymentMethod::PromptPay => PaymentMethod::PromptPay,
        }
    }
}
