pub mod checkout;
pub mod fulfillment;
pub mod order;
pub mod webhook;

pub use checkout::{
    CardPayment, CheckoutItem, CheckoutRequest, CheckoutResponse, PaymentArtifact,
    PaymentSelection,
};
pub use fulfillment::{RecipientRegistration, RecipientResponse, TrackingUpdate};
pub use order::{
    OrderLine, OrderResponse, OrderStatus, ParseOrderStatusError, PaymentMethod, ShippingAddress,
};
pub use webhook::{GatewayEvent, GatewayEventData};
