use super::OrderEngine;
use super::errors::{ConflictReason, OrderError};
use crate::entities::order_records::OrderRecord;
use crate::entities::{OrderStatus, PaymentMethod};
use crate::gateway::{Charge, ChargeStatus};
use curio_sdk::objects::GatewayEvent;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

impl OrderEngine {
    /// Move a paid PromptPay order from `awaiting_payment` to `pending` and
    /// sell its products.
    ///
    /// Callers must already know the charge is paid. Confirming an order that
    /// is past payment is a no-op.
    #[tracing::instrument(skip_all, fields(order_id = %order_id))]
    pub async fn confirm_promptpay_payment(
        &self,
        order_id: Uuid,
    ) -> Result<OrderRecord, OrderError> {
        let order = self.load_order(order_id).await?;
        if order.payment_method != PaymentMethod::PromptPay {
            return Err(OrderError::invalid_transition(order.status));
        }
        if order.paid_at.is_some() && !order.status.is_unsettled() {
            debug!(status = %order.status, "Payment already confirmed");
            return Ok(order);
        }
        if order.status != OrderStatus::AwaitingPayment {
            return Err(OrderError::invalid_transition(order.status));
        }
        let now = self.clock.now();
        if order.is_expired_at(now) {
            debug!(expires_at = %order.expires_at, "Payment window closed");
            return Err(OrderError::Expired);
        }

        if !self.orders.confirm_qr_payment(order_id, now).await? {
            return match self.orders.get_order(order_id).await? {
                // Swept between the read and the update.
                None => Err(OrderError::Expired),
                Some(current) if current.paid_at.is_some() && !current.status.is_unsettled() => {
                    Ok(current)
                }
                Some(current) if current.is_expired_at(now) => Err(OrderError::Expired),
                Some(current) => Err(OrderError::invalid_transition(current.status)),
            };
        }
        if !self
            .products
            .mark_sold(&order.product_ids(), order_id)
            .await?
        {
            error!(charge_id = ?order.charge_id, "Paid order lost its products, refund required");
            return Err(OrderError::Conflict(ConflictReason::ProductUnavailable));
        }
        info!(charge_id = ?order.charge_id, "PromptPay payment confirmed");
        self.load_order(order_id).await
    }

    /// Sandbox only: pay the order's QR code through the gateway and confirm.
    #[tracing::instrument(skip_all, fields(order_id = %order_id))]
    pub async fn mark_paid_for_testing(
        &self,
        order_id: Uuid,
        buyer_id: Uuid,
    ) -> Result<OrderRecord, OrderError> {
        let policy = self.policy.snapshot().await;
        if !policy.sandbox {
            return Err(OrderError::Unauthorized);
        }
        let order = self.load_order(order_id).await?;
        if order.buyer_id != buyer_id {
            return Err(OrderError::Unauthorized);
        }
        if order.status != OrderStatus::AwaitingPayment {
            return Err(OrderError::invalid_transition(order.status));
        }
        if order.is_expired_at(self.clock.now()) {
            return Err(OrderError::Expired);
        }
        let source_id = order
            .payment_source_id
            .as_deref()
            .ok_or_else(|| OrderError::invalid_transition(order.status))?;

        self.call_gateway(
            policy.gateway_timeout,
            self.gateway.mark_source_paid(source_id),
        )
        .await
        .map_err(|e| {
            warn!(source_id, error = %e, "Failed to mark source paid");
            OrderError::Gateway(e)
        })?;
        self.confirm_promptpay_payment(order_id).await
    }

    /// Apply a gateway webhook.
    ///
    /// The event body is not trusted: the charge is fetched back from the
    /// gateway and its own status decides the outcome. A paid charge settles
    /// its order; a refused card charge reopens the order for another
    /// attempt. Returns the order the event settled, if any.
    #[tracing::instrument(skip_all, fields(event_id = %event.id))]
    pub async fn handle_gateway_event(
        &self,
        event: &GatewayEvent,
    ) -> Result<Option<OrderRecord>, OrderError> {
        let Some(charge_id) = event.completed_charge_id() else {
            debug!(key = %event.key, "Ignoring gateway event");
            return Ok(None);
        };
        let known = self.orders.find_order_by_charge(charge_id).await?;
        // A card attempt whose response never arrived does not know its
        // charge id yet; only then can an unmatched charge belong to us.
        if known.is_none() && !self.orders.has_unattached_card_charge().await? {
            debug!(charge_id, "No order for charge");
            return Ok(None);
        }

        let policy = self.policy.snapshot().await;
        let charge = self
            .call_gateway(
                policy.gateway_timeout,
                self.gateway.retrieve_charge(charge_id),
            )
            .await
            .map_err(|e| {
                warn!(charge_id, error = %e, "Failed to retrieve charge for event");
                OrderError::Gateway(e)
            })?;

        let order = match known {
            Some(order) => order,
            None => match self.unattached_card_order(&charge).await? {
                Some(order) => order,
                None => {
                    if charge.paid {
                        error!(charge_id, "Paid charge has no order, refund required");
                    } else {
                        debug!(charge_id, "No order for charge");
                    }
                    return Ok(None);
                }
            },
        };

        match order.payment_method {
            PaymentMethod::PromptPay if charge.paid => {
                match self.confirm_promptpay_payment(order.id).await {
                    Ok(order) => Ok(Some(order)),
                    Err(OrderError::Expired) => {
                        error!(order_id = %order.id, charge_id, "Charge paid after the payment window, refund required");
                        Err(OrderError::Expired)
                    }
                    Err(e) => Err(e),
                }
            }
            PaymentMethod::Card if charge.paid => {
                self.settle_card_charge(&order, &charge).await.map(Some)
            }
            PaymentMethod::Card
                if matches!(
                    charge.status,
                    ChargeStatus::Failed | ChargeStatus::Expired | ChargeStatus::Reversed
                ) =>
            {
                if self.abandon_card_charge(&order, Some(charge_id)).await? {
                    info!(order_id = %order.id, charge_id, "Card charge failed, order reopened");
                }
                Ok(None)
            }
            _ => {
                debug!(order_id = %order.id, charge_id, "Charge completed without payment");
                Ok(None)
            }
        }
    }

    /// The in-flight card order a paid charge was created for, when the
    /// charge response was lost before its id could be stored.
    async fn unattached_card_order(
        &self,
        charge: &Charge,
    ) -> Result<Option<OrderRecord>, OrderError> {
        let Some(order_id) = charge.order_id else {
            return Ok(None);
        };
        if !charge.paid {
            return Ok(None);
        }
        Ok(self.orders.get_order(order_id).await?.filter(|order| {
            order.payment_method == PaymentMethod::Card
                && order.status == OrderStatus::Unpaid
                && order.charge_in_flight
                && order.charge_id.is_none()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketplacePolicy;
    use crate::orders::test_support::{ChargeBehavior, Harness, card};
    use crate::utils::clock::Clock;
    use curio_sdk::objects::GatewayEventData;
    use rust_decimal::Decimal;

    fn charge_complete(charge_id: &str) -> GatewayEvent {
        GatewayEvent {
            id: "evnt_test_1".to_string(),
            key: "charge.complete".to_string(),
            data: GatewayEventData {
                object: "charge".to_string(),
                id: charge_id.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_confirm_sells_products_and_sets_paid_at() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 500);
        let outcome = h.promptpay_checkout(&[product]).await;
        assert_eq!(outcome.order.grand_total, Decimal::from(540));
        assert!(!h.store.product(product).unwrap().sold);

        h.clock.advance(time::Duration::seconds(30));
        let confirmed = h
            .engine
            .confirm_promptpay_payment(outcome.order.id)
            .await
            .unwrap();

        assert_eq!(confirmed.status, OrderStatus::Pending);
        assert_eq!(confirmed.paid_at, Some(h.clock.now()));
        assert!(h.store.product(product).unwrap().sold);

        let again = h
            .engine
            .confirm_promptpay_payment(outcome.order.id)
            .await
            .unwrap();
        assert_eq!(again, confirmed);
    }

    #[tokio::test]
    async fn test_confirm_after_window_is_expired() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 500);
        let outcome = h.promptpay_checkout(&[product]).await;

        h.clock.set(outcome.order.expires_at);
        let err = h
            .engine
            .confirm_promptpay_payment(outcome.order.id)
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Expired));
        assert_eq!(err.kind(), crate::orders::ErrorKind::Conflict);
        assert!(!h.store.product(product).unwrap().sold);
    }

    #[tokio::test]
    async fn test_gateway_event_confirms_only_paid_charges() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 500);
        let outcome = h.promptpay_checkout(&[product]).await;
        let charge_id = outcome.order.charge_id.clone().unwrap();

        let unpaid = h
            .engine
            .handle_gateway_event(&charge_complete(&charge_id))
            .await
            .unwrap();
        assert_eq!(unpaid, None);
        assert_eq!(
            h.store.order(outcome.order.id).unwrap().status,
            OrderStatus::AwaitingPayment
        );

        h.gateway.settle_charge(&charge_id);
        let settled = h
            .engine
            .handle_gateway_event(&charge_complete(&charge_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled.status, OrderStatus::Pending);
        assert!(h.store.product(product).unwrap().sold);
    }

    #[tokio::test]
    async fn test_gateway_event_settles_card_charge_with_lost_response() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 450);
        h.gateway.set_charge_behavior(ChargeBehavior::LoseResponse);
        let err = h
            .engine
            .checkout(h.command(h.buyer, &[product], card("tokn_test_ok")))
            .await
            .unwrap_err();
        let OrderError::PaymentOutcomeUnknown { order_id } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(h.store.order(order_id).unwrap().charge_id, None);

        let charge_id = h.gateway.last_charge_id().unwrap();
        let settled = h
            .engine
            .handle_gateway_event(&charge_complete(&charge_id))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(settled.id, order_id);
        assert_eq!(settled.status, OrderStatus::Paid);
        assert_eq!(settled.charge_id.as_deref(), Some(charge_id.as_str()));
        assert!(!settled.charge_in_flight);
        assert!(h.store.product(product).unwrap().sold);
        assert_eq!(h.gateway.charge_count(), 1);

        // Redelivery of the same event changes nothing.
        let again = h
            .engine
            .handle_gateway_event(&charge_complete(&charge_id))
            .await
            .unwrap();
        assert_eq!(again, Some(settled));
        assert!(matches!(
            h.engine.pay_with_card(order_id, h.buyer, "tokn_test_ok").await,
            Err(OrderError::Conflict(ConflictReason::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_gateway_event_settles_pending_card_charge() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 450);
        h.gateway.set_charge_behavior(ChargeBehavior::Pending);
        let err = h
            .engine
            .checkout(h.command(h.buyer, &[product], card("tokn_test_3ds")))
            .await
            .unwrap_err();
        let OrderError::PaymentOutcomeUnknown { order_id } = err else {
            panic!("unexpected error: {err}");
        };
        let charge_id = h.gateway.last_charge_id().unwrap();
        let pending = h.store.order(order_id).unwrap();
        assert_eq!(pending.charge_id.as_deref(), Some(charge_id.as_str()));
        assert!(pending.charge_in_flight);

        let still_pending = h
            .engine
            .handle_gateway_event(&charge_complete(&charge_id))
            .await
            .unwrap();
        assert_eq!(still_pending, None);
        assert_eq!(h.store.order(order_id).unwrap().status, OrderStatus::Unpaid);

        h.gateway.settle_charge(&charge_id);
        let settled = h
            .engine
            .handle_gateway_event(&charge_complete(&charge_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled.status, OrderStatus::Paid);
        assert_eq!(settled.paid_at, Some(h.clock.now()));
        assert!(h.store.product(product).unwrap().sold);
    }

    #[tokio::test]
    async fn test_gateway_event_reopens_failed_card_charge() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 450);
        h.gateway.set_charge_behavior(ChargeBehavior::Pending);
        let err = h
            .engine
            .checkout(h.command(h.buyer, &[product], card("tokn_test_3ds")))
            .await
            .unwrap_err();
        let OrderError::PaymentOutcomeUnknown { order_id } = err else {
            panic!("unexpected error: {err}");
        };
        let charge_id = h.gateway.last_charge_id().unwrap();

        h.gateway.fail_charge(&charge_id);
        let outcome = h
            .engine
            .handle_gateway_event(&charge_complete(&charge_id))
            .await
            .unwrap();
        assert_eq!(outcome, None);

        let reopened = h.store.order(order_id).unwrap();
        assert_eq!(reopened.status, OrderStatus::Unpaid);
        assert!(!reopened.charge_in_flight);
        assert_eq!(reopened.charge_id, None);
        assert_eq!(h.store.product(product).unwrap().reserved_by, None);

        h.gateway.set_charge_behavior(ChargeBehavior::Approve);
        let retried = h
            .engine
            .pay_with_card(order_id, h.buyer, "tokn_test_ok")
            .await
            .unwrap();
        assert_eq!(retried.order.status, OrderStatus::Paid);
        assert_eq!(h.gateway.charge_count(), 2);
    }

    #[tokio::test]
    async fn test_unmatched_charge_event_skips_gateway_lookup() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 500);
        h.promptpay_checkout(&[product]).await;

        let outcome = h
            .engine
            .handle_gateway_event(&charge_complete("chrg_test_elsewhere"))
            .await
            .unwrap();

        assert_eq!(outcome, None);
        assert_eq!(h.gateway.retrieve_calls(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_events_are_ignored() {
        let h = Harness::new();
        let mut event = charge_complete("chrg_test_1");
        event.key = "transfer.create".to_string();
        assert_eq!(h.engine.handle_gateway_event(&event).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mark_paid_in_sandbox() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 500);
        let outcome = h.promptpay_checkout(&[product]).await;

        let order = h
            .engine
            .mark_paid_for_testing(outcome.order.id, h.buyer)
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(
            h.gateway.marked_sources(),
            vec![outcome.order.payment_source_id.unwrap()]
        );
    }

    #[tokio::test]
    async fn test_mark_paid_requires_sandbox() {
        let h = Harness::with_policy(MarketplacePolicy::default());
        let product = h.list_product(h.seller, 500);
        let outcome = h.promptpay_checkout(&[product]).await;

        let err = h
            .engine
            .mark_paid_for_testing(outcome.order.id, h.buyer)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Unauthorized));
        assert!(h.gateway.marked_sources().is_empty());
    }
}
