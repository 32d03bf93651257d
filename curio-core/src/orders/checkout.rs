use super::errors::{ConflictReason, OrderError, Resource};
use super::{OrderEngine, new_idempotency_key};
use crate::config::MarketplacePolicy;
use crate::entities::order_records::{NewOrder, OrderRecord};
use crate::entities::{OrderStatus, PaymentMethod};
use crate::gateway::{
    Charge, ChargeRequest, ChargeSource, ChargeStatus, GatewayError, SourceRequest,
    to_minor_units,
};
use crate::store::{StoreError, UNSETTLED_ORDER_CONSTRAINT};
use curio_sdk::objects::{
    CheckoutItem, CheckoutRequest, OrderLine, PaymentArtifact, PaymentSelection, ShippingAddress,
};
use itertools::Itertools;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shown in sandbox mode when the provider returns a source without a code.
const SANDBOX_QR_IMAGE_URL: &str = "https://cdn.omise.co/scannable_code/test_qr.png";

#[derive(Debug, Clone)]
pub struct CheckoutCommand {
    pub buyer_id: Uuid,
    pub items: Vec<CheckoutItem>,
    pub address_id: Option<Uuid>,
    pub payment: PaymentSelection,
}

impl CheckoutCommand {
    pub fn from_request(buyer_id: Uuid, request: CheckoutRequest) -> Self {
        Self {
            buyer_id,
            items: request.items,
            address_id: request.address_id,
            payment: request.payment,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: OrderRecord,
    pub payment: PaymentArtifact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub merchandise_total: Decimal,
    pub shipping_fee: Decimal,
    pub grand_total: Decimal,
}

pub fn price_lines(lines: &[OrderLine], shipping_fee: Decimal) -> OrderTotals {
    let merchandise_total: Decimal = lines.iter().map(OrderLine::subtotal).sum();
    OrderTotals {
        merchandise_total,
        shipping_fee,
        grand_total: merchandise_total + shipping_fee,
    }
}

/// Everything a checkout resolved before the payment method matters.
struct Draft {
    buyer_id: Uuid,
    seller_id: Uuid,
    lines: Vec<OrderLine>,
    totals: OrderTotals,
    address: ShippingAddress,
}

impl Draft {
    fn into_new_order(
        self,
        method: PaymentMethod,
        status: OrderStatus,
        created_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> NewOrder {
        NewOrder {
            id: Uuid::now_v7(),
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            items: self.lines,
            merchandise_total: self.totals.merchandise_total,
            shipping_fee: self.totals.shipping_fee,
            grand_total: self.totals.grand_total,
            status,
            payment_method: method,
            shipping_address: self.address,
            payment_source_id: None,
            charge_id: None,
            charge_idempotency_key: new_idempotency_key("chrg"),
            created_at,
            expires_at,
        }
    }
}

/// Validate the requested items, defaulting quantities to one.
fn requested_quantities(items: &[CheckoutItem]) -> Result<Vec<(Uuid, u32)>, OrderError> {
    if items.is_empty() {
        return Err(OrderError::validation("at least one item is required"));
    }
    if !items.iter().map(|item| item.product_id).all_unique() {
        return Err(OrderError::validation("a product may only appear once"));
    }
    items
        .iter()
        .map(|item| match item.quantity.unwrap_or(1) {
            0 => Err(OrderError::validation("quantity must be at least 1")),
            quantity => Ok((item.product_id, quantity)),
        })
        .collect()
}

pub(super) fn minor_units(amount: Decimal) -> Result<i64, OrderError> {
    to_minor_units(amount)
        .map_err(|_| OrderError::validation(format!("amount {amount} cannot be charged")))
}

impl OrderEngine {
    /// Turn the buyer's selection into an order and start payment.
    ///
    /// Card orders are charged right away. PromptPay orders wait in
    /// `awaiting_payment` until the QR code is paid or the window closes.
    #[tracing::instrument(skip_all, fields(buyer_id = %cmd.buyer_id))]
    pub async fn checkout(&self, cmd: CheckoutCommand) -> Result<CheckoutOutcome, OrderError> {
        let policy = self.policy.snapshot().await;
        let requested = requested_quantities(&cmd.items)?;
        if matches!(&cmd.payment, PaymentSelection::Card { token } if token.trim().is_empty()) {
            return Err(OrderError::validation("card token is required"));
        }

        if self.orders.has_unsettled_order(cmd.buyer_id).await? {
            debug!("Buyer already has an unsettled order");
            return Err(OrderError::Conflict(ConflictReason::UnsettledOrderExists));
        }
        let address = self.resolve_address(cmd.buyer_id, cmd.address_id).await?;
        let lines = self.build_lines(cmd.buyer_id, &requested).await?;
        let seller_id = lines
            .iter()
            .map(|line| line.seller_id)
            .all_equal_value()
            .map_err(|_| OrderError::validation("all items must come from the same seller"))?;
        let totals = price_lines(&lines, policy.shipping_fee);
        let draft = Draft {
            buyer_id: cmd.buyer_id,
            seller_id,
            lines,
            totals,
            address,
        };

        match cmd.payment {
            PaymentSelection::Card { token } => self.checkout_with_card(draft, token, &policy).await,
            PaymentSelection::PromptPay => self.checkout_with_promptpay(draft, &policy).await,
        }
    }

    async fn resolve_address(
        &self,
        buyer_id: Uuid,
        address_id: Option<Uuid>,
    ) -> Result<ShippingAddress, OrderError> {
        let addresses = self.users.list_addresses(buyer_id).await?;
        let address = match address_id {
            Some(id) => addresses
                .into_iter()
                .find(|a| a.id == id)
                .ok_or_else(|| OrderError::validation("address does not belong to the buyer"))?,
            None => addresses
                .into_iter()
                .find(|a| a.is_default)
                .ok_or_else(|| OrderError::validation("buyer has no default address"))?,
        };
        Ok(address.into())
    }

    /// Snapshot the requested products as order lines.
    ///
    /// The sold check here only fails fast; the reservation that follows is
    /// the authoritative one.
    async fn build_lines(
        &self,
        buyer_id: Uuid,
        requested: &[(Uuid, u32)],
    ) -> Result<Vec<OrderLine>, OrderError> {
        let ids: Vec<Uuid> = requested.iter().map(|(id, _)| *id).collect();
        let products = self.products.get_products(&ids).await?;
        requested
            .iter()
            .map(|&(product_id, quantity)| {
                let product = products
                    .iter()
                    .find(|p| p.id == product_id)
                    .ok_or(OrderError::NotFound(Resource::Product))?;
                if product.sold {
                    return Err(OrderError::Conflict(ConflictReason::ProductUnavailable));
                }
                if product.seller_id == buyer_id {
                    return Err(OrderError::validation("cannot buy your own listing"));
                }
                Ok(OrderLine {
                    product_id,
                    seller_id: product.seller_id,
                    unit_price: product.price,
                    quantity,
                })
            })
            .collect()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<OrderRecord, OrderError> {
        match self.orders.insert_order(order).await {
            Ok(record) => Ok(record),
            Err(StoreError::UniqueViolation { constraint })
                if constraint == UNSETTLED_ORDER_CONSTRAINT =>
            {
                debug!("Lost the race for the buyer's unsettled order slot");
                Err(OrderError::Conflict(ConflictReason::UnsettledOrderExists))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reserve the order's products, deleting the order if any is taken.
    async fn reserve_or_discard(&self, order: &OrderRecord) -> Result<(), OrderError> {
        if self
            .products
            .reserve_products(&order.product_ids(), order.id)
            .await?
        {
            return Ok(());
        }
        if let Err(e) = self
            .orders
            .delete_unsettled_order(order.id, order.buyer_id)
            .await
        {
            warn!(order_id = %order.id, error = %e, "Failed to discard order after losing its products");
        }
        debug!(order_id = %order.id, "Products taken by another order");
        Err(OrderError::Conflict(ConflictReason::ProductUnavailable))
    }

    async fn checkout_with_card(
        &self,
        draft: Draft,
        token: String,
        policy: &MarketplacePolicy,
    ) -> Result<CheckoutOutcome, OrderError> {
        let amount_minor = minor_units(draft.totals.grand_total)?;
        let now = self.clock.now();
        let order = draft.into_new_order(
            PaymentMethod::Card,
            OrderStatus::Unpaid,
            now,
            now + policy.payment_window,
        );
        let order = self.insert_order(order).await?;
        self.reserve_or_discard(&order).await?;
        info!(order_id = %order.id, grand_total = %order.grand_total, "Card order created");

        let (order, charge) = self
            .charge_card(order, amount_minor, &token, policy)
            .await?;
        Ok(CheckoutOutcome {
            order,
            payment: PaymentArtifact::Card {
                charge_id: charge.id,
                paid: charge.paid,
            },
        })
    }

    async fn checkout_with_promptpay(
        &self,
        draft: Draft,
        policy: &MarketplacePolicy,
    ) -> Result<CheckoutOutcome, OrderError> {
        let amount_minor = minor_units(draft.totals.grand_total)?;
        // Nothing is persisted yet and no money moves until the code is
        // scanned, so any gateway failure here is safe to surface as is.
        let source = self
            .call_gateway(
                policy.gateway_timeout,
                self.gateway.create_source(SourceRequest {
                    amount_minor,
                    currency: policy.currency.clone(),
                }),
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to create PromptPay source");
                OrderError::Gateway(e)
            })?;

        let now = self.clock.now();
        let mut order = draft.into_new_order(
            PaymentMethod::PromptPay,
            OrderStatus::AwaitingPayment,
            now,
            now + policy.payment_window,
        );
        let charge = self
            .call_gateway(
                policy.gateway_timeout,
                self.gateway.create_charge(ChargeRequest {
                    amount_minor,
                    currency: policy.currency.clone(),
                    source: ChargeSource::Source(source.id.clone()),
                    idempotency_key: order.charge_idempotency_key.clone(),
                    order_id: order.id,
                }),
            )
            .await
            .map_err(|e| {
                warn!(source_id = %source.id, error = %e, "Failed to create PromptPay charge");
                OrderError::Gateway(e)
            })?;

        let qr_image_url = charge
            .qr_image_url
            .clone()
            .or(source.qr_image_url)
            .or_else(|| policy.sandbox.then(|| SANDBOX_QR_IMAGE_URL.to_string()))
            .ok_or_else(|| {
                OrderError::Gateway(GatewayError::Decode(
                    "charge carries no scannable code".to_string(),
                ))
            })?;

        order.payment_source_id = Some(source.id.clone());
        order.charge_id = Some(charge.id.clone());
        let order = self.insert_order(order).await?;
        self.reserve_or_discard(&order).await?;
        info!(
            order_id = %order.id,
            charge_id = %charge.id,
            grand_total = %order.grand_total,
            expires_at = %order.expires_at,
            "PromptPay order awaiting payment"
        );

        Ok(CheckoutOutcome {
            payment: PaymentArtifact::PromptPay {
                source_id: source.id,
                charge_id: charge.id,
                qr_image_url,
                expires_at: order.expires_at.unix_timestamp(),
            },
            order,
        })
    }

    /// Charge an `unpaid` card order, e.g. after a declined or unanswered
    /// first attempt.
    #[tracing::instrument(skip_all, fields(order_id = %order_id))]
    pub async fn pay_with_card(
        &self,
        order_id: Uuid,
        buyer_id: Uuid,
        token: &str,
    ) -> Result<CheckoutOutcome, OrderError> {
        if token.trim().is_empty() {
            return Err(OrderError::validation("card token is required"));
        }
        let policy = self.policy.snapshot().await;
        let order = self.load_order(order_id).await?;
        if order.buyer_id != buyer_id {
            return Err(OrderError::Unauthorized);
        }
        if order.payment_method != PaymentMethod::Card || order.status != OrderStatus::Unpaid {
            return Err(OrderError::invalid_transition(order.status));
        }
        let amount_minor = minor_units(order.grand_total)?;
        // Idempotent for the order's own reservation.
        if !self
            .products
            .reserve_products(&order.product_ids(), order.id)
            .await?
        {
            debug!("Products were taken after the last failed attempt");
            return Err(OrderError::Conflict(ConflictReason::ProductUnavailable));
        }

        let (order, charge) = self
            .charge_card(order, amount_minor, token, &policy)
            .await?;
        Ok(CheckoutOutcome {
            order,
            payment: PaymentArtifact::Card {
                charge_id: charge.id,
                paid: charge.paid,
            },
        })
    }

    /// Send the card charge and persist its result.
    ///
    /// The charge is marked in flight before the call and its id is stored
    /// on the order as soon as the gateway returns one, so a later gateway
    /// event can settle the order. Only a definite refusal clears the marker,
    /// rotates the idempotency key and releases the products; an unknown
    /// outcome keeps all three so the next attempt replays the same charge.
    async fn charge_card(
        &self,
        order: OrderRecord,
        amount_minor: i64,
        token: &str,
        policy: &MarketplacePolicy,
    ) -> Result<(OrderRecord, Charge), OrderError> {
        let Some(idempotency_key) = self.orders.begin_card_charge(order.id).await? else {
            let current = self.load_order(order.id).await?;
            return Err(OrderError::invalid_transition(current.status));
        };
        let result = self
            .call_gateway(
                policy.gateway_timeout,
                self.gateway.create_charge(ChargeRequest {
                    amount_minor,
                    currency: policy.currency.clone(),
                    source: ChargeSource::Card(token.to_string()),
                    idempotency_key,
                    order_id: order.id,
                }),
            )
            .await;

        let charge = match result {
            Ok(charge) => charge,
            Err(e) if e.is_outcome_unknown() => {
                warn!(order_id = %order.id, error = %e, "Card charge outcome unknown");
                return Err(OrderError::PaymentOutcomeUnknown { order_id: order.id });
            }
            Err(e) => {
                self.abandon_card_charge(&order, None).await?;
                warn!(order_id = %order.id, error = %e, "Card charge refused by gateway");
                return Err(OrderError::Gateway(e));
            }
        };

        if !self
            .orders
            .attach_card_charge(order.id, charge.id.clone())
            .await?
        {
            debug!(order_id = %order.id, charge_id = %charge.id, "Charge already attached or settled");
        }
        if charge.paid {
            let order = self.settle_card_charge(&order, &charge).await?;
            return Ok((order, charge));
        }
        match charge.status {
            ChargeStatus::Failed | ChargeStatus::Expired | ChargeStatus::Reversed => {
                self.abandon_card_charge(&order, Some(&charge.id)).await?;
                warn!(order_id = %order.id, charge_id = %charge.id, "Card charge declined");
                Err(OrderError::Gateway(GatewayError::Declined {
                    message: charge
                        .failure_message
                        .unwrap_or_else(|| "charge was not paid".to_string()),
                    charge_id: charge.id,
                }))
            }
            _ => {
                warn!(order_id = %order.id, charge_id = %charge.id, "Card charge not settled yet");
                Err(OrderError::PaymentOutcomeUnknown { order_id: order.id })
            }
        }
    }

    /// Record a paid card charge on its order and sell the products.
    ///
    /// Settling an order that already holds this charge as paid returns the
    /// order unchanged.
    pub(super) async fn settle_card_charge(
        &self,
        order: &OrderRecord,
        charge: &Charge,
    ) -> Result<OrderRecord, OrderError> {
        let paid_at = self.clock.now();
        if !self
            .orders
            .record_card_payment(order.id, charge.id.clone(), paid_at)
            .await?
        {
            let current = self.load_order(order.id).await?;
            if current.charge_id.as_deref() == Some(charge.id.as_str()) {
                // Another attempt or a gateway event recorded it first.
                return Ok(current);
            }
            error!(
                order_id = %order.id,
                charge_id = %charge.id,
                status = %current.status,
                "Card charged but order could not record it, refund required"
            );
            return Err(OrderError::invalid_transition(current.status));
        }
        if !self
            .products
            .mark_sold(&order.product_ids(), order.id)
            .await?
        {
            error!(order_id = %order.id, charge_id = %charge.id, "Paid order lost its products, refund required");
            return Err(OrderError::Conflict(ConflictReason::ProductUnavailable));
        }
        info!(order_id = %order.id, charge_id = %charge.id, "Card payment recorded");
        self.load_order(order.id).await
    }

    /// Reopen the order for a new attempt after `charge_id` was refused.
    ///
    /// Returns `false`, leaving the products reserved, when the order moved
    /// on to another charge or out of `unpaid` in the meantime.
    pub(super) async fn abandon_card_charge(
        &self,
        order: &OrderRecord,
        charge_id: Option<&str>,
    ) -> Result<bool, OrderError> {
        if !self
            .orders
            .abandon_card_charge(
                order.id,
                charge_id.map(str::to_string),
                new_idempotency_key("chrg"),
            )
            .await?
        {
            debug!(order_id = %order.id, charge_id = ?charge_id, "Order no longer holds the refused charge");
            return Ok(false);
        }
        self.products
            .release_products(&order.product_ids(), order.id)
            .await?;
        Ok(true)
    }

    /// Delete an order the buyer no longer wants to pay for.
    ///
    /// Its product reservations lapse with it.
    #[tracing::instrument(skip_all, fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: Uuid, buyer_id: Uuid) -> Result<(), OrderError> {
        let order = self.load_order(order_id).await?;
        if order.buyer_id != buyer_id {
            return Err(OrderError::Unauthorized);
        }
        if !order.status.is_unsettled() {
            return Err(OrderError::invalid_transition(order.status));
        }
        if order.charge_in_flight {
            return Err(OrderError::Conflict(ConflictReason::PaymentInFlight));
        }
        if !self.orders.delete_unsettled_order(order_id, buyer_id).await? {
            let current = self.load_order(order_id).await?;
            if current.charge_in_flight {
                return Err(OrderError::Conflict(ConflictReason::PaymentInFlight));
            }
            return Err(OrderError::invalid_transition(current.status));
        }
        self.products
            .release_products(&order.product_ids(), order_id)
            .await?;
        info!("Order cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::test_support::{ChargeBehavior, Harness, card};
    use crate::utils::clock::Clock;
    use std::time::Duration;

    #[test]
    fn test_price_lines() {
        let lines = vec![
            OrderLine {
                product_id: Uuid::new_v4(),
                seller_id: Uuid::nil(),
                unit_price: Decimal::from(100),
                quantity: 1,
            },
            OrderLine {
                product_id: Uuid::new_v4(),
                seller_id: Uuid::nil(),
                unit_price: Decimal::from(250),
                quantity: 2,
            },
        ];
        let totals = price_lines(&lines, Decimal::from(40));
        assert_eq!(totals.merchandise_total, Decimal::from(600));
        assert_eq!(totals.grand_total, Decimal::from(640));
    }

    #[test]
    fn test_requested_quantities() {
        let id = Uuid::new_v4();
        let item = |quantity| CheckoutItem {
            product_id: id,
            quantity,
        };
        assert_eq!(requested_quantities(&[item(None)]).unwrap(), vec![(id, 1)]);
        assert!(matches!(
            requested_quantities(&[]),
            Err(OrderError::Validation(_))
        ));
        assert!(matches!(
            requested_quantities(&[item(Some(0))]),
            Err(OrderError::Validation(_))
        ));
        assert!(matches!(
            requested_quantities(&[item(None), item(Some(2))]),
            Err(OrderError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_promptpay_checkout_awaits_payment() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 500);

        let outcome = h.promptpay_checkout(&[product]).await;

        assert_eq!(outcome.order.status, OrderStatus::AwaitingPayment);
        assert_eq!(outcome.order.grand_total, Decimal::from(540));
        assert_eq!(outcome.order.seller_id, h.seller);
        assert_eq!(
            outcome.order.expires_at,
            h.clock.now() + time::Duration::minutes(1)
        );
        match &outcome.payment {
            PaymentArtifact::PromptPay {
                charge_id,
                qr_image_url,
                ..
            } => {
                assert_eq!(outcome.order.charge_id.as_ref(), Some(charge_id));
                assert!(qr_image_url.starts_with("https://"));
            }
            other => panic!("unexpected artifact: {other:?}"),
        }
        let stored = h.store.product(product).unwrap();
        assert!(!stored.sold);
        assert_eq!(stored.reserved_by, Some(outcome.order.id));
    }

    #[tokio::test]
    async fn test_card_checkout_pays_and_sells() {
        let h = Harness::new();
        let a = h.list_product(h.seller, 100);
        let b = h.list_product(h.seller, 250);

        let outcome = h
            .engine
            .checkout(h.command(h.buyer, &[a, b], card("tokn_test_ok")))
            .await
            .unwrap();

        assert_eq!(outcome.order.status, OrderStatus::Paid);
        assert_eq!(outcome.order.grand_total, Decimal::from(390));
        assert!(outcome.order.paid_at.is_some());
        assert!(outcome.order.charge_id.is_some());
        assert!(!outcome.order.charge_in_flight);
        assert!(h.store.product(a).unwrap().sold);
        assert!(h.store.product(b).unwrap().sold);
    }

    #[tokio::test]
    async fn test_checkout_rejects_second_unsettled_order() {
        let h = Harness::new();
        let first = h.list_product(h.seller, 100);
        let second = h.list_product(h.seller, 200);
        h.promptpay_checkout(&[first]).await;

        let err = h
            .engine
            .checkout(h.command(h.buyer, &[second], PaymentSelection::PromptPay))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::Conflict(ConflictReason::UnsettledOrderExists)
        ));
        assert_eq!(h.store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_checkout_validation_failures() {
        let h = Harness::new();
        let other_seller = h.add_user("Niran", "Thongdee");
        let mine = h.list_product(h.seller, 100);
        let theirs = h.list_product(other_seller, 100);
        let own = h.list_product(h.buyer, 100);

        let mixed = h
            .engine
            .checkout(h.command(h.buyer, &[mine, theirs], PaymentSelection::PromptPay))
            .await;
        assert!(matches!(mixed, Err(OrderError::Validation(_))));

        let self_purchase = h
            .engine
            .checkout(h.command(h.buyer, &[own], PaymentSelection::PromptPay))
            .await;
        assert!(matches!(self_purchase, Err(OrderError::Validation(_))));

        let missing = h
            .engine
            .checkout(h.command(h.buyer, &[Uuid::new_v4()], PaymentSelection::PromptPay))
            .await;
        assert!(matches!(
            missing,
            Err(OrderError::NotFound(Resource::Product))
        ));

        let mut foreign_address = h.command(h.buyer, &[mine], PaymentSelection::PromptPay);
        foreign_address.address_id = Some(Uuid::new_v4());
        let foreign = h.engine.checkout(foreign_address).await;
        assert!(matches!(foreign, Err(OrderError::Validation(_))));

        let empty_token = h
            .engine
            .checkout(h.command(h.buyer, &[mine], card("  ")))
            .await;
        assert!(matches!(empty_token, Err(OrderError::Validation(_))));

        assert_eq!(h.store.order_count(), 0);
        assert_eq!(h.gateway.charge_calls(), 0);
    }

    #[tokio::test]
    async fn test_checkout_of_sold_product_is_conflict() {
        let h = Harness::new();
        let order = h.pending_order(300).await;
        let other_buyer = h.add_user("Kanya", "Boonmee");

        let err = h
            .engine
            .checkout(h.command(
                other_buyer,
                &order.product_ids(),
                PaymentSelection::PromptPay,
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Conflict(ConflictReason::ProductUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_have_one_winner() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 800);
        let buyers: Vec<Uuid> = (0..8)
            .map(|i| h.add_user(&format!("Buyer{i}"), "Test"))
            .collect();

        let attempts = buyers.iter().map(|&buyer| {
            let engine = h.engine.clone();
            let cmd = h.command(buyer, &[product], card("tokn_test_ok"));
            tokio::spawn(async move { engine.checkout(cmd).await })
        });
        let mut paid = 0;
        for attempt in attempts.collect::<Vec<_>>() {
            match attempt.await.unwrap() {
                Ok(outcome) => {
                    assert_eq!(outcome.order.status, OrderStatus::Paid);
                    paid += 1;
                }
                Err(OrderError::Conflict(ConflictReason::ProductUnavailable)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(paid, 1);
        assert!(h.store.product(product).unwrap().sold);
        assert_eq!(h.gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_declined_card_releases_products_and_allows_retry() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 450);
        h.gateway.set_charge_behavior(ChargeBehavior::Decline);

        let err = h
            .engine
            .checkout(h.command(h.buyer, &[product], card("tokn_test_declined")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::Gateway(GatewayError::Declined { .. })
        ));

        let stored = h.store.product(product).unwrap();
        assert!(!stored.sold);
        assert_eq!(stored.reserved_by, None);
        let order = h
            .engine
            .list_buyer_orders(h.buyer)
            .await
            .unwrap()
            .remove(0);
        assert_eq!(order.status, OrderStatus::Unpaid);
        assert!(!order.charge_in_flight);

        h.gateway.set_charge_behavior(ChargeBehavior::Approve);
        let retried = h
            .engine
            .pay_with_card(order.id, h.buyer, "tokn_test_ok")
            .await
            .unwrap();
        assert_eq!(retried.order.status, OrderStatus::Paid);
        assert!(h.store.product(product).unwrap().sold);
        // The declined attempt's key was rotated, so the retry is a new charge.
        assert_eq!(h.gateway.charge_count(), 2);
    }

    #[tokio::test]
    async fn test_lost_card_response_is_replayed_with_same_key() {
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

        let pending = h.store.order(order_id).unwrap();
        assert_eq!(pending.status, OrderStatus::Unpaid);
        assert!(pending.charge_in_flight);
        assert_eq!(
            h.store.product(product).unwrap().reserved_by,
            Some(order_id)
        );
        let cancel = h.engine.cancel_order(order_id, h.buyer).await;
        assert!(matches!(
            cancel,
            Err(OrderError::Conflict(ConflictReason::PaymentInFlight))
        ));

        let outcome = h
            .engine
            .pay_with_card(order_id, h.buyer, "tokn_test_ok")
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Paid);
        assert_eq!(h.gateway.charge_calls(), 2);
        assert_eq!(h.gateway.charge_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_card_charge_deadline_is_unknown_outcome() {
        let h = Harness::with_policy(MarketplacePolicy {
            gateway_timeout: Duration::from_secs(5),
            ..MarketplacePolicy::default()
        });
        let product = h.list_product(h.seller, 450);
        h.gateway.set_charge_behavior(ChargeBehavior::Hang);

        let err = h
            .engine
            .checkout(h.command(h.buyer, &[product], card("tokn_test_ok")))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::PaymentOutcomeUnknown { .. }));
        assert!(!h.store.product(product).unwrap().sold);
    }

    #[tokio::test]
    async fn test_zero_total_card_checkout_is_rejected_before_charging() {
        let h = Harness::with_policy(MarketplacePolicy {
            shipping_fee: Decimal::ZERO,
            ..MarketplacePolicy::default()
        });
        let product = h.list_product(h.seller, 0);

        let err = h
            .engine
            .checkout(h.command(h.buyer, &[product], card("tokn_test_ok")))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Validation(_)));
        assert_eq!(h.store.order_count(), 0);
        assert_eq!(h.store.product(product).unwrap().reserved_by, None);
        assert_eq!(h.gateway.charge_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_promptpay_order_frees_slot_and_products() {
        let h = Harness::new();
        let product = h.list_product(h.seller, 200);
        let outcome = h.promptpay_checkout(&[product]).await;
        let stranger = h.add_user("Kanya", "Boonmee");

        assert!(matches!(
            h.engine.cancel_order(outcome.order.id, stranger).await,
            Err(OrderError::Unauthorized)
        ));
        h.engine
            .cancel_order(outcome.order.id, h.buyer)
            .await
            .unwrap();

        assert_eq!(h.store.order_count(), 0);
        assert_eq!(h.store.product(product).unwrap().reserved_by, None);
        h.promptpay_checkout(&[product]).await;
    }
}
