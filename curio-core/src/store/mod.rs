//! Persistence seams of the order engine.
//!
//! The engine only talks to these traits. [`DatabaseProcessor`] implements
//! them on Postgres; [`InMemoryStore`] implements the same conditional-update
//! semantics under a mutex for tests and local tooling.
//!
//! Every mutating method is a compare-and-set: it returns whether the
//! precondition held and the write happened. A `false` is authoritative and
//! must not be second-guessed with a prior read.
//!
//! [`DatabaseProcessor`]: crate::framework::DatabaseProcessor

mod memory;
mod postgres;

pub use memory::InMemoryStore;

use crate::entities::OrderStatus;
use crate::entities::order_records::{NewOrder, OrderRecord};
use crate::entities::products::ProductRecord;
use crate::entities::users::{AddressRecord, SellerProfile, UserRecord};
use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors raised by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let constraint = e
            .as_database_error()
            .filter(|db| db.is_unique_violation())
            .map(|db| db.constraint().unwrap_or("unknown").to_string());
        match constraint {
            Some(constraint) => StoreError::UniqueViolation { constraint },
            None => StoreError::Database(e),
        }
    }
}

/// Name of the partial unique index guarding one unsettled order per buyer.
pub const UNSETTLED_ORDER_CONSTRAINT: &str = "orders_one_unsettled_per_buyer";

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order. A second unsettled order for the same buyer fails
    /// with [`StoreError::UniqueViolation`] on [`UNSETTLED_ORDER_CONSTRAINT`].
    async fn insert_order(&self, order: NewOrder) -> Result<OrderRecord, StoreError>;

    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>, StoreError>;

    async fn find_order_by_charge(&self, charge_id: &str)
    -> Result<Option<OrderRecord>, StoreError>;

    async fn has_unsettled_order(&self, buyer_id: Uuid) -> Result<bool, StoreError>;

    async fn list_buyer_orders(&self, buyer_id: Uuid) -> Result<Vec<OrderRecord>, StoreError>;

    async fn list_seller_orders(
        &self,
        seller_id: Uuid,
        statuses: &[OrderStatus],
    ) -> Result<Vec<OrderRecord>, StoreError>;

    /// Mark a card charge as in flight on an `unpaid` order and return the
    /// idempotency key to send it with.
    async fn begin_card_charge(&self, order_id: Uuid) -> Result<Option<String>, StoreError>;

    /// Remember the charge id of an in-flight attempt on an `unpaid` order.
    async fn attach_card_charge(&self, order_id: Uuid, charge_id: String)
    -> Result<bool, StoreError>;

    /// Whether some `unpaid` order has a charge in flight with no charge id.
    async fn has_unattached_card_charge(&self) -> Result<bool, StoreError>;

    /// Clear the in-flight mark and charge id after a definite decline,
    /// rotating the key. Applies only while the order's charge id equals
    /// `charge_id`.
    async fn abandon_card_charge(
        &self,
        order_id: Uuid,
        charge_id: Option<String>,
        next_key: String,
    ) -> Result<bool, StoreError>;

    /// `unpaid` -> `paid`, setting the charge id unless another one is
    /// already attached.
    async fn record_card_payment(
        &self,
        order_id: Uuid,
        charge_id: String,
        paid_at: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    /// `awaiting_payment` -> `pending` if `expires_at > paid_at`.
    async fn confirm_qr_payment(
        &self,
        order_id: Uuid,
        paid_at: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    /// Trackable status -> `processing`, storing tracking once.
    async fn record_tracking(
        &self,
        order_id: Uuid,
        tracking_number: String,
        sender_name: String,
    ) -> Result<bool, StoreError>;

    async fn transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError>;

    /// Assign (or reuse) the payout idempotency key of a deliverable order.
    async fn begin_payout(
        &self,
        order_id: Uuid,
        candidate_key: String,
    ) -> Result<Option<String>, StoreError>;

    /// Deliverable -> `completed`, setting the write-once transfer id.
    async fn complete_payout(&self, order_id: Uuid, transfer_id: String)
    -> Result<bool, StoreError>;

    async fn delete_unsettled_order(&self, order_id: Uuid, buyer_id: Uuid)
    -> Result<bool, StoreError>;

    /// Delete `awaiting_payment` orders with `expires_at <= now`.
    async fn delete_expired_orders(&self, now: OffsetDateTime) -> Result<Vec<Uuid>, StoreError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<ProductRecord>, StoreError>;

    /// All-or-nothing hold of `ids` for `order_id`.
    async fn reserve_products(&self, ids: &[Uuid], order_id: Uuid) -> Result<bool, StoreError>;

    async fn release_products(&self, ids: &[Uuid], order_id: Uuid) -> Result<u64, StoreError>;

    /// All-or-nothing `sold = false -> true` for `order_id`.
    async fn mark_sold(&self, ids: &[Uuid], order_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<AddressRecord>, StoreError>;

    async fn get_seller_profile(&self, user_id: Uuid) -> Result<Option<SellerProfile>, StoreError>;

    async fn account_number_taken(&self, account_number: &str) -> Result<bool, StoreError>;

    async fn insert_seller_profile(&self, profile: SellerProfile)
    -> Result<SellerProfile, StoreError>;
}
