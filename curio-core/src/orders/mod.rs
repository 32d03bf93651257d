//! Order lifecycle engine.
//!
//! [`OrderEngine`] owns every status transition of an order. It reads and
//! writes through the store traits and only ever persists a state that the
//! gateway has already confirmed: charges and transfers are sent first, the
//! matching conditional update follows.
//!
//! Operations are split by phase:
//! - `checkout`: order creation, card payment and cancellation
//! - `payment`: PromptPay confirmation, gateway events, sandbox mark-paid
//! - `fulfillment`: tracking, accept/reject and order queries
//! - `payout`: delivery confirmation and seller recipients
//! - `expiry`: the sweep of abandoned PromptPay orders

mod checkout;
mod errors;
mod expiry;
mod fulfillment;
mod payment;
mod payout;

#[cfg(test)]
pub(crate) mod test_support;

pub use checkout::{CheckoutCommand, CheckoutOutcome, OrderTotals, price_lines};
pub use errors::{ConflictReason, ErrorKind, OrderError, Resource};

use crate::config::{ConfigStore, MarketplacePolicy};
use crate::entities::order_records::OrderRecord;
use crate::gateway::{GatewayError, PaymentGateway};
use crate::store::{OrderRepository, ProductStore, UserDirectory};
use crate::utils::clock::{Clock, SystemClock};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct OrderEngine {
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductStore>,
    users: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    policy: ConfigStore<MarketplacePolicy>,
    clock: Arc<dyn Clock>,
}

impl OrderEngine {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductStore>,
        users: Arc<dyn UserDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        policy: ConfigStore<MarketplacePolicy>,
    ) -> Self {
        Self {
            orders,
            products,
            users,
            gateway,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    /// Build an engine over a single store that implements all three traits.
    pub fn from_store<S>(
        store: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        policy: ConfigStore<MarketplacePolicy>,
    ) -> Self
    where
        S: OrderRepository + ProductStore + UserDirectory + 'static,
    {
        Self::new(store.clone(), store.clone(), store, gateway, policy)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &ConfigStore<MarketplacePolicy> {
        &self.policy
    }

    async fn load_order(&self, order_id: Uuid) -> Result<OrderRecord, OrderError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(Resource::Order))
    }

    /// Bound a gateway call by `deadline`. An elapsed deadline is reported as
    /// [`GatewayError::Timeout`], which callers treat as an unknown outcome.
    async fn call_gateway<T>(
        &self,
        deadline: Duration,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        tokio::time::timeout(deadline, call)
            .await
            .unwrap_or_else(|_| Err(GatewayError::Timeout))
    }
}

/// Fresh idempotency key for a gateway operation.
fn new_idempotency_key(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::now_v7().simple())
}
