use super::OrderEngine;
use super::errors::{ConflictReason, OrderError};
use crate::entities::OrderStatus;
use crate::entities::order_records::OrderRecord;
use crate::utils::tracking::normalize_tracking_number;
use curio_sdk::objects::TrackingUpdate;
use tracing::{debug, info, warn};
use uuid::Uuid;

impl OrderEngine {
    async fn load_seller_order(
        &self,
        order_id: Uuid,
        seller_id: Uuid,
    ) -> Result<OrderRecord, OrderError> {
        let order = self.load_order(order_id).await?;
        if order.seller_id != seller_id {
            debug!(%order_id, %seller_id, "Caller is not the seller");
            return Err(OrderError::Unauthorized);
        }
        Ok(order)
    }

    /// Record the carrier tracking number and move the order to `processing`.
    ///
    /// Tracking is write-once.
    #[tracing::instrument(skip_all, fields(order_id = %order_id))]
    pub async fn submit_tracking(
        &self,
        order_id: Uuid,
        seller_id: Uuid,
        update: TrackingUpdate,
    ) -> Result<OrderRecord, OrderError> {
        let order = self.load_seller_order(order_id, seller_id).await?;
        let sender_name = update.sender_name.trim();
        if sender_name.is_empty() {
            return Err(OrderError::validation("sender name is required"));
        }
        let tracking_number = normalize_tracking_number(&update.tracking_number)
            .ok_or_else(|| OrderError::validation("unrecognised tracking number"))?;
        if order.tracking_number.is_some() {
            return Err(OrderError::Conflict(ConflictReason::TrackingAlreadySet));
        }
        if !OrderStatus::TRACKABLE.contains(&order.status) {
            return Err(OrderError::invalid_transition(order.status));
        }

        if !self
            .orders
            .record_tracking(order_id, tracking_number.clone(), sender_name.to_string())
            .await?
        {
            let current = self.load_order(order_id).await?;
            if current.tracking_number.is_some() {
                return Err(OrderError::Conflict(ConflictReason::TrackingAlreadySet));
            }
            return Err(OrderError::invalid_transition(current.status));
        }
        info!(%tracking_number, "Order shipped");
        self.load_order(order_id).await
    }

    #[tracing::instrument(skip_all, fields(order_id = %order_id))]
    pub async fn accept_order(
        &self,
        order_id: Uuid,
        seller_id: Uuid,
    ) -> Result<OrderRecord, OrderError> {
        self.seller_transition(order_id, seller_id, OrderStatus::Pending, OrderStatus::Shipping)
            .await
    }

    /// Refuse a paid card order. Its products stay sold; the refund is
    /// handled outside the marketplace.
    #[tracing::instrument(skip_all, fields(order_id = %order_id))]
    pub async fn reject_order(
        &self,
        order_id: Uuid,
        seller_id: Uuid,
    ) -> Result<OrderRecord, OrderError> {
        let order = self
            .seller_transition(order_id, seller_id, OrderStatus::Paid, OrderStatus::Rejected)
            .await?;
        warn!(charge_id = ?order.charge_id, grand_total = %order.grand_total, "Paid order rejected, refund owed to buyer");
        Ok(order)
    }

    async fn seller_transition(
        &self,
        order_id: Uuid,
        seller_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<OrderRecord, OrderError> {
        let order = self.load_seller_order(order_id, seller_id).await?;
        if order.status != from {
            return Err(OrderError::invalid_transition(order.status));
        }
        if !self.orders.transition(order_id, from, to).await? {
            let current = self.load_order(order_id).await?;
            return Err(OrderError::invalid_transition(current.status));
        }
        info!(%from, %to, "Order status changed");
        self.load_order(order_id).await
    }

    /// An order as seen by its buyer or seller.
    pub async fn get_order(
        &self,
        order_id: Uuid,
        caller_id: Uuid,
    ) -> Result<OrderRecord, OrderError> {
        let order = self.load_order(order_id).await?;
        if order.buyer_id != caller_id && order.seller_id != caller_id {
            return Err(OrderError::Unauthorized);
        }
        Ok(order)
    }

    /// All orders of a buyer, newest first.
    pub async fn list_buyer_orders(&self, buyer_id: Uuid) -> Result<Vec<OrderRecord>, OrderError> {
        Ok(self.orders.list_buyer_orders(buyer_id).await?)
    }

    /// Orders a seller has to act on or has settled, newest first.
    pub async fn list_seller_orders(
        &self,
        seller_id: Uuid,
    ) -> Result<Vec<OrderRecord>, OrderError> {
        Ok(self
            .orders
            .list_seller_orders(seller_id, &OrderStatus::SELLER_VISIBLE)
            .await?)
    }
}
