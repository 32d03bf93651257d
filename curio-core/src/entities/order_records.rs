use crate::entities::{OrderStatus, PaymentMethod};
use crate::framework::DatabaseProcessor;
use curio_sdk::objects::{OrderLine, OrderResponse, ShippingAddress};
use kanau::processor::Processor;
use rust_decimal::Decimal;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderRecord {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub items: Json<Vec<OrderLine>>,
    pub merchandise_total: Decimal,
    pub shipping_fee: Decimal,
    pub grand_total: Decimal,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub shipping_address: Json<ShippingAddress>,
    pub payment_source_id: Option<String>,
    pub charge_id: Option<String>,
    pub transfer_id: Option<String>,
    pub charge_idempotency_key: String,
    /// A card charge was sent and its outcome is not yet known to be a failure.
    pub charge_in_flight: bool,
    pub payout_idempotency_key: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier_sender_name: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub paid_at: Option<OffsetDateTime>,
}

impl OrderRecord {
    pub fn product_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|line| line.product_id).collect()
    }

    /// The payment window is closed at `expires_at` itself.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

impl From<OrderRecord> for OrderResponse {
    fn from(record: OrderRecord) -> Self {
        OrderResponse {
            order_id: record.id,
            buyer_id: record.buyer_id,
            seller_id: record.seller_id,
            items: record.items.0,
            merchandise_total: record.merchandise_total,
            shipping_fee: record.shipping_fee,
            grand_total: record.grand_total,
            status: record.status.into(),
            payment_method: record.payment_method.into(),
            payment_source_id: record.payment_source_id,
            charge_id: record.charge_id,
            transfer_id: record.transfer_id,
            tracking_number: record.tracking_number,
            carrier_sender_name: record.carrier_sender_name,
            shipping_address: record.shipping_address.0,
            created_at: record.created_at.unix_timestamp(),
            expires_at: record.expires_at.unix_timestamp(),
            paid_at: record.paid_at.map(OffsetDateTime::unix_timestamp),
        }
    }
}

/// Data for inserting a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub items: Vec<OrderLine>,
    pub merchandise_total: Decimal,
    pub shipping_fee: Decimal,
    pub grand_total: Decimal,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub shipping_address: ShippingAddress,
    pub payment_source_id: Option<String>,
    pub charge_id: Option<String>,
    pub charge_idempotency_key: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl NewOrder {
    pub fn into_record(self) -> OrderRecord {
        OrderRecord {
            id: self.id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            items: Json(self.items),
            merchandise_total: self.merchandise_total,
            shipping_fee: self.shipping_fee,
            grand_total: self.grand_total,
            status: self.status,
            payment_method: self.payment_method,
            shipping_address: Json(self.shipping_address),
            payment_source_id: self.payment_source_id,
            charge_id: self.charge_id,
            transfer_id: None,
            charge_idempotency_key: self.charge_idempotency_key,
            charge_in_flight: false,
            payout_idempotency_key: None,
            tracking_number: None,
            carrier_sender_name: None,
            created_at: self.created_at,
            expires_at: self.expires_at,
            paid_at: None,
        }
    }
}

fn status_names(statuses: &[OrderStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

impl Processor<NewOrder> for DatabaseProcessor {
    type Output = OrderRecord;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertOrder")]
    async fn process(&self, insert: NewOrder) -> Result<OrderRecord, sqlx::Error> {
        sqlx::query_as::<_, OrderRecord>(
            r#"
            INSERT INTO orders (
                id, buyer_id, seller_id, items,
                merchandise_total, shipping_fee, grand_total,
                status, payment_method, shipping_address,
                payment_source_id, charge_id, charge_idempotency_key,
                created_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(insert.id)
        .bind(insert.buyer_id)
        .bind(insert.seller_id)
        .bind(Json(insert.items))
        .bind(insert.merchandise_total)
        .bind(insert.shipping_fee)
        .bind(insert.grand_total)
        .bind(insert.status)
        .bind(insert.payment_method)
        .bind(Json(insert.shipping_address))
        .bind(insert.payment_source_id)
        .bind(insert.charge_id)
        .bind(insert.charge_idempotency_key)
        .bind(insert.created_at)
        .bind(insert.expires_at)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetOrderById {
    pub order_id: Uuid,
}

impl Processor<GetOrderById> for DatabaseProcessor {
    type Output = Option<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderById")]
    async fn process(&self, query: GetOrderById) -> Result<Option<OrderRecord>, sqlx::Error> {
        sqlx::query_as::<_, OrderRecord>("SELECT * FROM orders WHERE id = $1")
            .bind(query.order_id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GetOrderByChargeId {
    pub charge_id: String,
}

impl Processor<GetOrderByChargeId> for DatabaseProcessor {
    type Output = Option<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderByChargeId")]
    async fn process(&self, query: GetOrderByChargeId) -> Result<Option<OrderRecord>, sqlx::Error> {
        sqlx::query_as::<_, OrderRecord>("SELECT * FROM orders WHERE charge_id = $1")
            .bind(query.charge_id)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Whether the buyer already has an order in `unpaid` or `awaiting_payment`.
pub struct HasUnsettledOrder {
    pub buyer_id: Uuid,
}

impl Processor<HasUnsettledOrder> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:HasUnsettledOrder")]
    async fn process(&self, query: HasUnsettledOrder) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM orders
                WHERE buyer_id = $1 AND status IN ('unpaid', 'awaiting_payment')
            )
            "#,
        )
        .bind(query.buyer_id)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct ListOrdersByBuyer {
    pub buyer_id: Uuid,
}

impl Processor<ListOrdersByBuyer> for DatabaseProcessor {
    type Output = Vec<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListOrdersByBuyer")]
    async fn process(&self, query: ListOrdersByBuyer) -> Result<Vec<OrderRecord>, sqlx::Error> {
        sqlx::query_as::<_, OrderRecord>(
            "SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC",
        )
        .bind(query.buyer_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct ListOrdersBySeller {
    pub seller_id: Uuid,
    pub statuses: Vec<OrderStatus>,
}

impl Processor<ListOrdersBySeller> for DatabaseProcessor {
    type Output = Vec<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListOrdersBySeller")]
    async fn process(&self, query: ListOrdersBySeller) -> Result<Vec<OrderRecord>, sqlx::Error> {
        sqlx::query_as::<_, OrderRecord>(
            r#"
            SELECT * FROM orders
            WHERE seller_id = $1 AND status::text = ANY($2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(query.seller_id)
        .bind(status_names(&query.statuses))
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Flag a card charge as in flight and hand back the key it must be sent with.
///
/// Returns `None` when the order is no longer `unpaid`.
pub struct BeginCardCharge {
    pub order_id: Uuid,
}

impl Processor<BeginCardCharge> for DatabaseProcessor {
    type Output = Option<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:BeginCardCharge")]
    async fn process(&self, cmd: BeginCardCharge) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            UPDATE orders SET charge_in_flight = true
            WHERE id = $1 AND status = 'unpaid'
            RETURNING charge_idempotency_key
            "#,
        )
        .bind(cmd.order_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Clear the in-flight flag after a definite decline and rotate the
/// idempotency key so the next attempt is a new charge.
///
/// Only applies while the order still references `charge_id` (`None` when
/// the refused attempt never produced a charge).
pub struct AbandonCardCharge {
    pub order_id: Uuid,
    pub charge_id: Option<String>,
    pub next_key: String,
}

impl Processor<AbandonCardCharge> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:AbandonCardCharge")]
    async fn process(&self, cmd: AbandonCardCharge) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET charge_in_flight = false, charge_idempotency_key = $2, charge_id = NULL
            WHERE id = $1 AND status = 'unpaid' AND charge_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(cmd.order_id)
        .bind(cmd.next_key)
        .bind(cmd.charge_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// Remember the charge an in-flight attempt produced, before its outcome
/// is known, so gateway events can find the order.
pub struct AttachCardCharge {
    pub order_id: Uuid,
    pub charge_id: String,
}

impl Processor<AttachCardCharge> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:AttachCardCharge")]
    async fn process(&self, cmd: AttachCardCharge) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET charge_id = $2
            WHERE id = $1 AND status = 'unpaid' AND charge_in_flight
              AND (charge_id IS NULL OR charge_id = $2)
            "#,
        )
        .bind(cmd.order_id)
        .bind(cmd.charge_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// Whether any card charge is in flight without a known charge id.
pub struct HasUnattachedCardCharge;

impl Processor<HasUnattachedCardCharge> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:HasUnattachedCardCharge")]
    async fn process(&self, _query: HasUnattachedCardCharge) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM orders
                WHERE status = 'unpaid' AND charge_in_flight AND charge_id IS NULL
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// `unpaid` -> `paid` once the card charge is captured.
pub struct RecordCardPayment {
    pub order_id: Uuid,
    pub charge_id: String,
    pub paid_at: OffsetDateTime,
}

impl Processor<RecordCardPayment> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RecordCardPayment")]
    async fn process(&self, cmd: RecordCardPayment) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'paid', charge_id = $2, paid_at = $3, charge_in_flight = false
            WHERE id = $1 AND status = 'unpaid' AND (charge_id IS NULL OR charge_id = $2)
            "#,
        )
        .bind(cmd.order_id)
        .bind(cmd.charge_id)
        .bind(cmd.paid_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// `awaiting_payment` -> `pending`, only while the payment window is open.
pub struct ConfirmQrPayment {
    pub order_id: Uuid,
    pub paid_at: OffsetDateTime,
}

impl Processor<ConfirmQrPayment> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ConfirmQrPayment")]
    async fn process(&self, cmd: ConfirmQrPayment) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'pending', paid_at = $2
            WHERE id = $1 AND status = 'awaiting_payment' AND expires_at > $2
            "#,
        )
        .bind(cmd.order_id)
        .bind(cmd.paid_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// Store the carrier details and move the order to `processing`.
///
/// Tracking is write-once.
pub struct RecordTracking {
    pub order_id: Uuid,
    pub tracking_number: String,
    pub sender_name: String,
}

impl Processor<RecordTracking> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RecordTracking")]
    async fn process(&self, cmd: RecordTracking) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'processing', tracking_number = $2, carrier_sender_name = $3
            WHERE id = $1
              AND status::text = ANY($4)
              AND tracking_number IS NULL
            "#,
        )
        .bind(cmd.order_id)
        .bind(cmd.tracking_number)
        .bind(cmd.sender_name)
        .bind(status_names(&OrderStatus::TRACKABLE))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// Move an order from one status to another with no other field changes.
pub struct TransitionOrderStatus {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl Processor<TransitionOrderStatus> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:TransitionOrderStatus")]
    async fn process(&self, cmd: TransitionOrderStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE orders SET status = $3 WHERE id = $1 AND status = $2")
            .bind(cmd.order_id)
            .bind(cmd.from)
            .bind(cmd.to)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// Pin the payout idempotency key, keeping one assigned by an earlier attempt.
///
/// Returns `None` when the order is not eligible for payout.
pub struct BeginPayout {
    pub order_id: Uuid,
    pub candidate_key: String,
}

impl Processor<BeginPayout> for DatabaseProcessor {
    type Output = Option<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:BeginPayout")]
    async fn process(&self, cmd: BeginPayout) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            UPDATE orders
            SET payout_idempotency_key = COALESCE(payout_idempotency_key, $2)
            WHERE id = $1
              AND status::text = ANY($3)
              AND tracking_number IS NOT NULL
              AND transfer_id IS NULL
            RETURNING payout_idempotency_key
            "#,
        )
        .bind(cmd.order_id)
        .bind(cmd.candidate_key)
        .bind(status_names(&OrderStatus::DELIVERABLE))
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct CompletePayout {
    pub order_id: Uuid,
    pub transfer_id: String,
}

impl Processor<CompletePayout> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CompletePayout")]
    async fn process(&self, cmd: CompletePayout) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'completed', transfer_id = $2
            WHERE id = $1 AND status::text = ANY($3) AND transfer_id IS NULL
            "#,
        )
        .bind(cmd.order_id)
        .bind(cmd.transfer_id)
        .bind(status_names(&OrderStatus::DELIVERABLE))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// Delete a buyer's order that has not been paid for and has no card
/// charge in flight.
pub struct DeleteUnsettledOrder {
    pub order_id: Uuid,
    pub buyer_id: Uuid,
}

impl Processor<DeleteUnsettledOrder> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteUnsettledOrder")]
    async fn process(&self, cmd: DeleteUnsettledOrder) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM orders
            WHERE id = $1
              AND buyer_id = $2
              AND (
                  (status = 'unpaid' AND NOT charge_in_flight)
                  OR status = 'awaiting_payment'
              )
            "#,
        )
        .bind(cmd.order_id)
        .bind(cmd.buyer_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// Delete every `awaiting_payment` order whose window closed at or before `now`.
pub struct DeleteExpiredOrders {
    pub now: OffsetDateTime,
}

impl Processor<DeleteExpiredOrders> for DatabaseProcessor {
    type Output = Vec<Uuid>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteExpiredOrders")]
    async fn process(&self, cmd: DeleteExpiredOrders) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            DELETE FROM orders
            WHERE status = 'awaiting_payment' AND expires_at <= $1
            RETURNING id
            "#,
        )
        .bind(cmd.now)
        .fetch_all(&self.pool)
        .await
    }
}
