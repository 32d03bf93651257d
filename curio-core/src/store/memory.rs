//! In-process store with the same conditional-update semantics as Postgres.

use super::{
    OrderRepository, ProductStore, StoreError, UNSETTLED_ORDER_CONSTRAINT, UserDirectory,
};
use crate::entities::OrderStatus;
use crate::entities::order_records::{NewOrder, OrderRecord};
use crate::entities::products::ProductRecord;
use crate::entities::users::{AddressRecord, SellerProfile, UserRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Default)]
struct State {
    orders: HashMap<Uuid, OrderRecord>,
    products: HashMap<Uuid, ProductRecord>,
    users: HashMap<Uuid, UserRecord>,
    addresses: Vec<AddressRecord>,
    profiles: HashMap<Uuid, SellerProfile>,
}

impl State {
    fn takeable_by(&self, product: &ProductRecord, order_id: Uuid) -> bool {
        !product.sold
            && match product.reserved_by {
                None => true,
                Some(holder) => holder == order_id || !self.orders.contains_key(&holder),
            }
    }

    /// Apply `update` to every product in `ids` if all of them are takeable.
    fn update_all_takeable(
        &mut self,
        ids: &[Uuid],
        order_id: Uuid,
        update: impl Fn(&mut ProductRecord),
    ) -> bool {
        let all_takeable = ids.iter().all(|id| {
            self.products
                .get(id)
                .is_some_and(|p| self.takeable_by(p, order_id))
        });
        if !all_takeable {
            return false;
        }
        for id in ids {
            if let Some(product) = self.products.get_mut(id) {
                update(product);
            }
        }
        true
    }

    /// Apply `update` to the order if `guard` holds for it.
    fn update_order_if(
        &mut self,
        order_id: Uuid,
        guard: impl FnOnce(&OrderRecord) -> bool,
        update: impl FnOnce(&mut OrderRecord),
    ) -> bool {
        match self.orders.get_mut(&order_id) {
            Some(order) if guard(order) => {
                update(order);
                true
            }
            _ => false,
        }
    }
}

/// All three store traits over a single mutex.
///
/// Every trait method takes the lock once, so each conditional update is
/// atomic with respect to the others.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_user(&self, user: UserRecord) {
        self.lock().users.insert(user.id, user);
    }

    pub fn add_address(&self, address: AddressRecord) {
        self.lock().addresses.push(address);
    }

    pub fn add_product(&self, product: ProductRecord) {
        self.lock().products.insert(product.id, product);
    }

    pub fn product(&self, id: Uuid) -> Option<ProductRecord> {
        self.lock().products.get(&id).cloned()
    }

    pub fn order(&self, id: Uuid) -> Option<OrderRecord> {
        self.lock().orders.get(&id).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: NewOrder) -> Result<OrderRecord, StoreError> {
        let mut state = self.lock();
        if order.status.is_unsettled()
            && state
                .orders
                .values()
                .any(|o| o.buyer_id == order.buyer_id && o.status.is_unsettled())
        {
            return Err(StoreError::UniqueViolation {
                constraint: UNSETTLED_ORDER_CONSTRAINT.to_string(),
            });
        }
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::UniqueViolation {
                constraint: "orders_pkey".to_string(),
            });
        }
        let record = order.into_record();
        state.orders.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.lock().orders.get(&order_id).cloned())
    }

    async fn find_order_by_charge(
        &self,
        charge_id: &str,
    ) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self
            .lock()
            .orders
            .values()
            .find(|o| o.charge_id.as_deref() == Some(charge_id))
            .cloned())
    }

    async fn has_unsettled_order(&self, buyer_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .orders
            .values()
            .any(|o| o.buyer_id == buyer_id && o.status.is_unsettled()))
    }

    async fn list_buyer_orders(&self, buyer_id: Uuid) -> Result<Vec<OrderRecord>, StoreError> {
        let mut orders: Vec<_> = self
            .lock()
            .orders
            .values()
            .filter(|o| o.buyer_id == buyer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_seller_orders(
        &self,
        seller_id: Uuid,
        statuses: &[OrderStatus],
    ) -> Result<Vec<OrderRecord>, StoreError> {
        let mut orders: Vec<_> = self
            .lock()
            .orders
            .values()
            .filter(|o| o.seller_id == seller_id && statuses.contains(&o.status))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn begin_card_charge(&self, order_id: Uuid) -> Result<Option<String>, StoreError> {
        let mut state = self.lock();
        Ok(state
            .orders
            .get_mut(&order_id)
            .filter(|o| o.status == OrderStatus::Unpaid)
            .map(|o| {
                o.charge_in_flight = true;
                o.charge_idempotency_key.clone()
            }))
    }

    async fn attach_card_charge(
        &self,
        order_id: Uuid,
        charge_id: String,
    ) -> Result<bool, StoreError> {
        Ok(self.lock().update_order_if(
            order_id,
            |o| {
                o.status == OrderStatus::Unpaid
                    && o.charge_in_flight
                    && o.charge_id.as_ref().is_none_or(|id| *id == charge_id)
            },
            |o| o.charge_id = Some(charge_id.clone()),
        ))
    }

    async fn has_unattached_card_charge(&self) -> Result<bool, StoreError> {
        Ok(self.lock().orders.values().any(|o| {
            o.status == OrderStatus::Unpaid && o.charge_in_flight && o.charge_id.is_none()
        }))
    }

    async fn abandon_card_charge(
        &self,
        order_id: Uuid,
        charge_id: Option<String>,
        next_key: String,
    ) -> Result<bool, StoreError> {
        Ok(self.lock().update_order_if(
            order_id,
            |o| o.status == OrderStatus::Unpaid && o.charge_id == charge_id,
            |o| {
                o.charge_in_flight = false;
                o.charge_id = None;
                o.charge_idempotency_key = next_key;
            },
        ))
    }

    async fn record_card_payment(
        &self,
        order_id: Uuid,
        charge_id: String,
        paid_at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self.lock().update_order_if(
            order_id,
            |o| {
                o.status == OrderStatus::Unpaid
                    && o.charge_id.as_ref().is_none_or(|id| *id == charge_id)
            },
            |o| {
                o.status = OrderStatus::Paid;
                o.charge_id = Some(charge_id.clone());
                o.paid_at = Some(paid_at);
                o.charge_in_flight = false;
            },
        ))
    }

    async fn confirm_qr_payment(
        &self,
        order_id: Uuid,
        paid_at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self.lock().update_order_if(
            order_id,
            |o| o.status == OrderStatus::AwaitingPayment && o.expires_at > paid_at,
            |o| {
                o.status = OrderStatus::Pending;
                o.paid_at = Some(paid_at);
            },
        ))
    }

    async fn record_tracking(
        &self,
        order_id: Uuid,
        tracking_number: String,
        sender_name: String,
    ) -> Result<bool, StoreError> {
        Ok(self.lock().update_order_if(
            order_id,
            |o| OrderStatus::TRACKABLE.contains(&o.status) && o.tracking_number.is_none(),
            |o| {
                o.status = OrderStatus::Processing;
                o.tracking_number = Some(tracking_number);
                o.carrier_sender_name = Some(sender_name);
            },
        ))
    }

    async fn transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .update_order_if(order_id, |o| o.status == from, |o| o.status = to))
    }

    async fn begin_payout(
        &self,
        order_id: Uuid,
        candidate_key: String,
    ) -> Result<Option<String>, StoreError> {
        let mut state = self.lock();
        Ok(state
            .orders
            .get_mut(&order_id)
            .filter(|o| {
                OrderStatus::DELIVERABLE.contains(&o.status)
                    && o.tracking_number.is_some()
                    && o.transfer_id.is_none()
            })
            .map(|o| {
                o.payout_idempotency_key
                    .get_or_insert(candidate_key)
                    .clone()
            }))
    }

    async fn complete_payout(
        &self,
        order_id: Uuid,
        transfer_id: String,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        if state
            .orders
            .values()
            .any(|o| o.id != order_id && o.transfer_id.as_deref() == Some(transfer_id.as_str()))
        {
            return Err(StoreError::UniqueViolation {
                constraint: "orders_transfer_id_key".to_string(),
            });
        }
        Ok(state.update_order_if(
            order_id,
            |o| OrderStatus::DELIVERABLE.contains(&o.status) && o.transfer_id.is_none(),
            |o| {
                o.status = OrderStatus::Completed;
                o.transfer_id = Some(transfer_id);
            },
        ))
    }

    async fn delete_unsettled_order(
        &self,
        order_id: Uuid,
        buyer_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let deletable = state.orders.get(&order_id).is_some_and(|o| {
            o.buyer_id == buyer_id
                && match o.status {
                    OrderStatus::Unpaid => !o.charge_in_flight,
                    OrderStatus::AwaitingPayment => true,
                    _ => false,
                }
        });
        if deletable {
            state.orders.remove(&order_id);
        }
        Ok(deletable)
    }

    async fn delete_expired_orders(&self, now: OffsetDateTime) -> Result<Vec<Uuid>, StoreError> {
        let mut state = self.lock();
        let expired: Vec<Uuid> = state
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::AwaitingPayment && o.expires_at <= now)
            .map(|o| o.id)
            .collect();
        for id in &expired {
            state.orders.remove(id);
        }
        Ok(expired)
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<ProductRecord>, StoreError> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn reserve_products(&self, ids: &[Uuid], order_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .update_all_takeable(ids, order_id, |p| p.reserved_by = Some(order_id)))
    }

    async fn release_products(&self, ids: &[Uuid], order_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.lock();
        let mut released = 0;
        for id in ids {
            let Some(product) = state.products.get_mut(id) else {
                continue;
            };
            if !product.sold && product.reserved_by == Some(order_id) {
                product.reserved_by = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn mark_sold(&self, ids: &[Uuid], order_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.lock().update_all_takeable(ids, order_id, |p| {
            p.sold = true;
            p.reserved_by = Some(order_id);
        }))
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.lock().users.get(&user_id).cloned())
    }

    async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<AddressRecord>, StoreError> {
        let mut addresses: Vec<_> = self
            .lock()
            .addresses
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        addresses.sort_by_key(|a| !a.is_default);
        Ok(addresses)
    }

    async fn get_seller_profile(&self, user_id: Uuid) -> Result<Option<SellerProfile>, StoreError> {
        Ok(self.lock().profiles.get(&user_id).cloned())
    }

    async fn account_number_taken(&self, account_number: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .profiles
            .values()
            .any(|p| p.account_number == account_number))
    }

    async fn insert_seller_profile(
        &self,
        profile: SellerProfile,
    ) -> Result<SellerProfile, StoreError> {
        let mut state = self.lock();
        if state.profiles.contains_key(&profile.user_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "seller_profiles_pkey".to_string(),
            });
        }
        if state
            .profiles
            .values()
            .any(|p| p.account_number == profile.account_number)
        {
            return Err(StoreError::UniqueViolation {
                constraint: "seller_profiles_account_number_key".to_string(),
            });
        }
        state.profiles.insert(profile.user_id, profile.clone());
        Ok(profile)
    }
}
