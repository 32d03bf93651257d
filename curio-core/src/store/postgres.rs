//! Store traits on top of the entity processors.

use super::{OrderRepository, ProductStore, StoreError, UserDirectory};
use crate::entities::OrderStatus;
use crate::entities::order_records::{
    AbandonCardCharge, AttachCardCharge, BeginCardCharge, BeginPayout, CompletePayout,
    ConfirmQrPayment, DeleteExpiredOrders, DeleteUnsettledOrder, GetOrderByChargeId,
    GetOrderById, HasUnattachedCardCharge, HasUnsettledOrder, ListOrdersByBuyer, ListOrdersBySeller, NewOrder, OrderRecord,
    RecordCardPayment, RecordTracking, TransitionOrderStatus,
};
use crate::entities::products::{
    GetProductsByIds, MarkProductsSold, ProductRecord, ReleaseProducts, ReserveProducts,
};
use crate::entities::users::{
    AccountNumberTaken, AddressRecord, GetSellerProfile, GetUserById, ListAddressesByUser,
    SellerProfile, UserRecord,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[async_trait]
impl OrderRepository for DatabaseProcessor {
    async fn insert_order(&self, order: NewOrder) -> Result<OrderRecord, StoreError> {
        Ok(self.process(order).await?)
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.process(GetOrderById { order_id }).await?)
    }

    async fn find_order_by_charge(
        &self,
        charge_id: &str,
    ) -> Result<Option<OrderRecord>, StoreError> {
        let query = GetOrderByChargeId {
            charge_id: charge_id.to_string(),
        };
        Ok(self.process(query).await?)
    }

    async fn has_unsettled_order(&self, buyer_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.process(HasUnsettledOrder { buyer_id }).await?)
    }

    async fn list_buyer_orders(&self, buyer_id: Uuid) -> Result<Vec<OrderRecord>, StoreError> {
        Ok(self.process(ListOrdersByBuyer { buyer_id }).await?)
    }

    async fn list_seller_orders(
        &self,
        seller_id: Uuid,
        statuses: &[OrderStatus],
    ) -> Result<Vec<OrderRecord>, StoreError> {
        let query = ListOrdersBySeller {
            seller_id,
            statuses: statuses.to_vec(),
        };
        Ok(self.process(query).await?)
    }

    async fn begin_card_charge(&self, order_id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self.process(BeginCardCharge { order_id }).await?)
    }

    async fn attach_card_charge(
        &self,
        order_id: Uuid,
        charge_id: String,
    ) -> Result<bool, StoreError> {
        Ok(self.process(AttachCardCharge { order_id, charge_id }).await?)
    }

    async fn has_unattached_card_charge(&self) -> Result<bool, StoreError> {
        Ok(self.process(HasUnattachedCardCharge).await?)
    }

    async fn abandon_card_charge(
        &self,
        order_id: Uuid,
        charge_id: Option<String>,
        next_key: String,
    ) -> Result<bool, StoreError> {
        let cmd = AbandonCardCharge {
            order_id,
            charge_id,
            next_key,
        };
        Ok(self.process(cmd).await?)
    }

    async fn record_card_payment(
        &self,
        order_id: Uuid,
        charge_id: String,
        paid_at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let cmd = RecordCardPayment {
            order_id,
            charge_id,
            paid_at,
        };
        Ok(self.process(cmd).await?)
    }

    async fn confirm_qr_payment(
        &self,
        order_id: Uuid,
        paid_at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self.process(ConfirmQrPayment { order_id, paid_at }).await?)
    }

    async fn record_tracking(
        &self,
        order_id: Uuid,
        tracking_number: String,
        sender_name: String,
    ) -> Result<bool, StoreError> {
        let cmd = RecordTracking {
            order_id,
            tracking_number,
            sender_name,
        };
        Ok(self.process(cmd).await?)
    }

    async fn transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        Ok(self
            .process(TransitionOrderStatus { order_id, from, to })
            .await?)
    }

    async fn begin_payout(
        &self,
        order_id: Uuid,
        candidate_key: String,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .process(BeginPayout {
                order_id,
                candidate_key,
            })
            .await?)
    }

    async fn complete_payout(
        &self,
        order_id: Uuid,
        transfer_id: String,
    ) -> Result<bool, StoreError> {
        Ok(self
            .process(CompletePayout {
                order_id,
                transfer_id,
            })
            .await?)
    }

    async fn delete_unsettled_order(
        &self,
        order_id: Uuid,
        buyer_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self
            .process(DeleteUnsettledOrder { order_id, buyer_id })
            .await?)
    }

    async fn delete_expired_orders(&self, now: OffsetDateTime) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.process(DeleteExpiredOrders { now }).await?)
    }
}

#[async_trait]
impl ProductStore for DatabaseProcessor {
    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<ProductRecord>, StoreError> {
        Ok(self.process(GetProductsByIds { ids: ids.to_vec() }).await?)
    }

    async fn reserve_products(&self, ids: &[Uuid], order_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .process(ReserveProducts {
                ids: ids.to_vec(),
                order_id,
            })
            .await?)
    }

    async fn release_products(&self, ids: &[Uuid], order_id: Uuid) -> Result<u64, StoreError> {
        Ok(self
            .process(ReleaseProducts {
                ids: ids.to_vec(),
                order_id,
            })
            .await?)
    }

    async fn mark_sold(&self, ids: &[Uuid], order_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .process(MarkProductsSold {
                ids: ids.to_vec(),
                order_id,
            })
            .await?)
    }
}

#[async_trait]
impl UserDirectory for DatabaseProcessor {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.process(GetUserById { user_id }).await?)
    }

    async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<AddressRecord>, StoreError> {
        Ok(self.process(ListAddressesByUser { user_id }).await?)
    }

    async fn get_seller_profile(&self, user_id: Uuid) -> Result<Option<SellerProfile>, StoreError> {
        Ok(self.process(GetSellerProfile { user_id }).await?)
    }

    async fn account_number_taken(&self, account_number: &str) -> Result<bool, StoreError> {
        let query = AccountNumberTaken {
            account_number: account_number.to_string(),
        };
        Ok(self.process(query).await?)
    }

    async fn insert_seller_profile(
        &self,
        profile: SellerProfile,
    ) -> Result<SellerProfile, StoreError> {
        Ok(self.process(profile).await?)
    }
}
