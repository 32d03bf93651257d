use super::checkout::minor_units;
use super::errors::{ConflictReason, OrderError, Resource};
use super::{OrderEngine, new_idempotency_key};
use crate::entities::OrderStatus;
use crate::entities::order_records::OrderRecord;
use crate::entities::users::SellerProfile;
use crate::gateway::{RecipientRequest, TransferRequest};
use crate::store::StoreError;
use crate::utils::bank::bank_brand;
use curio_sdk::objects::RecipientRegistration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

impl OrderEngine {
    /// Buyer confirms the parcel arrived: pay the seller the order's grand
    /// total and complete the order.
    ///
    /// The transfer is sent before the order is completed. A failed or
    /// unanswered transfer leaves the order as it was, and a retry reuses the
    /// stored idempotency key so the seller is paid at most once.
    #[tracing::instrument(skip_all, fields(order_id = %order_id))]
    pub async fn confirm_delivery(
        &self,
        order_id: Uuid,
        buyer_id: Uuid,
    ) -> Result<OrderRecord, OrderError> {
        let order = self.load_order(order_id).await?;
        if order.buyer_id != buyer_id {
            return Err(OrderError::Unauthorized);
        }
        check_payout_eligible(&order)?;

        let recipient_id = self
            .users
            .get_seller_profile(order.seller_id)
            .await?
            .filter(|profile| profile.verified)
            .map(|profile| profile.recipient_id)
            .ok_or(OrderError::Conflict(ConflictReason::RecipientMissing))?;

        let Some(idempotency_key) = self
            .orders
            .begin_payout(order_id, new_idempotency_key("trsf"))
            .await?
        else {
            let current = self.load_order(order_id).await?;
            check_payout_eligible(&current)?;
            return Err(OrderError::invalid_transition(current.status));
        };

        let policy = self.policy.snapshot().await;
        let transfer = self
            .call_gateway(
                policy.gateway_timeout,
                self.gateway.create_transfer(TransferRequest {
                    amount_minor: minor_units(order.grand_total)?,
                    recipient_id,
                    idempotency_key,
                }),
            )
            .await
            .map_err(|e| {
                warn!(error = %e, outcome_unknown = e.is_outcome_unknown(), "Payout transfer failed");
                OrderError::Gateway(e)
            })?;

        let completed = match self
            .orders
            .complete_payout(order_id, transfer.id.clone())
            .await
        {
            Ok(completed) => completed,
            Err(StoreError::UniqueViolation { constraint }) => {
                error!(transfer_id = %transfer.id, %constraint, "Transfer already recorded on another order");
                return Err(OrderError::Conflict(ConflictReason::AlreadySettled));
            }
            Err(e) => {
                error!(transfer_id = %transfer.id, error = %e, "Seller paid but order could not be completed");
                return Err(e.into());
            }
        };
        if !completed {
            let current = self.load_order(order_id).await?;
            if current.transfer_id.as_deref() == Some(transfer.id.as_str()) {
                return Ok(current);
            }
            error!(transfer_id = %transfer.id, status = %current.status, "Seller paid but order could not be completed");
            return Err(OrderError::Conflict(ConflictReason::AlreadySettled));
        }
        info!(transfer_id = %transfer.id, amount = %order.grand_total, "Order completed, seller paid");
        self.load_order(order_id).await
    }

    /// Register the seller's bank account with the gateway for payouts.
    #[tracing::instrument(skip_all, fields(seller_id = %seller_id))]
    pub async fn register_payout_recipient(
        &self,
        seller_id: Uuid,
        registration: RecipientRegistration,
    ) -> Result<SellerProfile, OrderError> {
        let first_name = registration.first_name.trim();
        let last_name = registration.last_name.trim();
        let account_number = registration.account_number.trim();
        let account_name = registration.account_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(OrderError::validation("first and last name are required"));
        }
        let brand = bank_brand(&registration.bank_name)
            .ok_or_else(|| OrderError::validation("unsupported bank"))?;
        if account_number.len() < 10 || !account_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(OrderError::validation(
                "account number must be at least 10 digits",
            ));
        }
        if account_name != format!("{first_name} {last_name}") {
            return Err(OrderError::validation(
                "account name must match first and last name",
            ));
        }

        let user = self
            .users
            .get_user(seller_id)
            .await?
            .ok_or(OrderError::NotFound(Resource::User))?;
        if self.users.get_seller_profile(seller_id).await?.is_some() {
            return Err(OrderError::Conflict(ConflictReason::RecipientExists));
        }
        if self.users.account_number_taken(account_number).await? {
            debug!("Account number registered to another seller");
            return Err(OrderError::Conflict(ConflictReason::AccountInUse));
        }

        let policy = self.policy.snapshot().await;
        let recipient = self
            .call_gateway(
                policy.gateway_timeout,
                self.gateway.create_recipient(RecipientRequest {
                    name: account_name.to_string(),
                    email: Some(user.email),
                    bank_brand: brand.to_string(),
                    account_number: account_number.to_string(),
                    account_name: account_name.to_string(),
                }),
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to create payout recipient");
                OrderError::Gateway(e)
            })?;

        let profile = SellerProfile {
            user_id: seller_id,
            recipient_id: recipient.id,
            bank_brand: brand.to_string(),
            account_number: account_number.to_string(),
            account_name: account_name.to_string(),
            verified: true,
            created_at: self.clock.now(),
        };
        match self.users.insert_seller_profile(profile).await {
            Ok(profile) => {
                info!(recipient_id = %profile.recipient_id, bank = brand, "Payout recipient registered");
                Ok(profile)
            }
            Err(StoreError::UniqueViolation { constraint }) => {
                warn!(%constraint, "Recipient created but profile insert collided");
                if constraint.contains("account_number") {
                    Err(OrderError::Conflict(ConflictReason::AccountInUse))
                } else {
                    Err(OrderError::Conflict(ConflictReason::RecipientExists))
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn check_payout_eligible(order: &OrderRecord) -> Result<(), OrderError> {
    if order.transfer_id.is_some() || order.status == OrderStatus::Completed {
        return Err(OrderError::Conflict(ConflictReason::AlreadySettled));
    }
    if !OrderStatus::DELIVERABLE.contains(&order.status) {
        return Err(OrderError::invalid_transition(order.status));
    }
    if order.tracking_number.is_none() {
        return Err(OrderError::Conflict(ConflictReason::TrackingMissing));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::test_support::{Harness, TransferBehavior, card};
    use crate::store::UserDirectory;

    fn registration(account_name: &str) -> RecipientRegistration {
        RecipientRegistration {
            first_name: "Somchai".to_string(),
            last_name: "Jaidee".to_string(),
            bank_name: "กสิกรไทย".to_string(),
            account_number: "0123456789".to_string(),
            account_name: account_name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_delivery_pays_grand_total_once() {
        let h = Harness::new();
        h.verify_seller().await;
        let order = h.shipped_order(500).await;

        let completed = h.engine.confirm_delivery(order.id, h.buyer).await.unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(completed.transfer_id.is_some());
        assert_eq!(h.gateway.transfer_amounts(), vec![54_000]);

        let again = h.engine.confirm_delivery(order.id, h.buyer).await;
        assert!(matches!(
            again,
            Err(OrderError::Conflict(ConflictReason::AlreadySettled))
        ));
        assert_eq!(h.gateway.transfer_calls(), 1);
    }

    #[tokio::test]
    async fn test_delivery_without_tracking_sends_nothing() {
        let h = Harness::new();
        h.verify_seller().await;
        let product = h.list_product(h.seller, 500);
        let paid = h
            .engine
            .checkout(h.command(h.buyer, &[product], card("tokn_test_ok")))
            .await
            .unwrap()
            .order;
        assert_eq!(paid.status, OrderStatus::Paid);

        let err = h.engine.confirm_delivery(paid.id, h.buyer).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::Conflict(ConflictReason::TrackingMissing)
        ));
        assert_eq!(h.gateway.transfer_calls(), 0);
    }

    #[tokio::test]
    async fn test_only_buyer_confirms_delivery() {
        let h = Harness::new();
        h.verify_seller().await;
        let order = h.shipped_order(500).await;

        let err = h
            .engine
            .confirm_delivery(order.id, h.seller)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Unauthorized));
    }

    #[tokio::test]
    async fn test_delivery_requires_verified_recipient() {
        let h = Harness::new();
        let order = h.shipped_order(500).await;

        let err = h.engine.confirm_delivery(order.id, h.buyer).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::Conflict(ConflictReason::RecipientMissing)
        ));
        assert_eq!(h.gateway.transfer_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_transfer_keeps_status_and_key() {
        let h = Harness::new();
        h.verify_seller().await;
        let order = h.shipped_order(500).await;
        h.gateway.set_transfer_behavior(TransferBehavior::Reject);

        let err = h.engine.confirm_delivery(order.id, h.buyer).await.unwrap_err();
        assert!(matches!(err, OrderError::Gateway(_)));
        let stored = h.store.order(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
        assert_eq!(stored.transfer_id, None);
        let key = stored.payout_idempotency_key.clone().unwrap();

        h.gateway.set_transfer_behavior(TransferBehavior::Succeed);
        let completed = h.engine.confirm_delivery(order.id, h.buyer).await.unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);
        assert_eq!(completed.payout_idempotency_key, Some(key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_transfer_is_gateway_error() {
        let h = Harness::new();
        h.verify_seller().await;
        let order = h.shipped_order(500).await;
        h.gateway.set_transfer_behavior(TransferBehavior::Hang);

        let err = h.engine.confirm_delivery(order.id, h.buyer).await.unwrap_err();
        match err {
            OrderError::Gateway(e) => assert!(e.is_outcome_unknown()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            h.store.order(order.id).unwrap().status,
            OrderStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_concurrent_delivery_confirmations_pay_once() {
        let h = Harness::new();
        h.verify_seller().await;
        let order = h.shipped_order(500).await;

        let attempts: Vec<_> = (0..4)
            .map(|_| {
                let engine = h.engine.clone();
                let buyer = h.buyer;
                tokio::spawn(async move { engine.confirm_delivery(order.id, buyer).await })
            })
            .collect();
        for attempt in attempts {
            let _ = attempt.await.unwrap();
        }

        assert_eq!(h.gateway.transfer_amounts(), vec![54_000]);
        assert_eq!(
            h.store.order(order.id).unwrap().status,
            OrderStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_register_recipient() {
        let h = Harness::new();

        let profile = h
            .engine
            .register_payout_recipient(h.seller, registration("Somchai Jaidee"))
            .await
            .unwrap();

        assert_eq!(profile.bank_brand, "kbank");
        assert!(profile.verified);
        assert_eq!(
            h.store.get_seller_profile(h.seller).await.unwrap(),
            Some(profile)
        );
        assert_eq!(h.gateway.recipients()[0].account_number, "0123456789");

        let again = h
            .engine
            .register_payout_recipient(h.seller, registration("Somchai Jaidee"))
            .await;
        assert!(matches!(
            again,
            Err(OrderError::Conflict(ConflictReason::RecipientExists))
        ));
    }

    #[tokio::test]
    async fn test_register_recipient_validation() {
        let h = Harness::new();

        let mismatch = h
            .engine
            .register_payout_recipient(h.seller, registration("Somchai J."))
            .await;
        assert!(matches!(mismatch, Err(OrderError::Validation(_))));

        let mut unknown_bank = registration("Somchai Jaidee");
        unknown_bank.bank_name = "Bank of Atlantis".to_string();
        let unknown = h
            .engine
            .register_payout_recipient(h.seller, unknown_bank)
            .await;
        assert!(matches!(unknown, Err(OrderError::Validation(_))));
        assert!(h.gateway.recipients().is_empty());
    }

    #[tokio::test]
    async fn test_account_number_is_unique_across_sellers() {
        let h = Harness::new();
        h.engine
            .register_payout_recipient(h.seller, registration("Somchai Jaidee"))
            .await
            .unwrap();
        let other = h.add_user("Somchai", "Jaidee");

        let err = h
            .engine
            .register_payout_recipient(other, registration("Somchai Jaidee"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Conflict(ConflictReason::AccountInUse)
        ));
    }
}
