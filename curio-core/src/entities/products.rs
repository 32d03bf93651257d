use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProductRecord {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub sold: bool,
    /// Order currently holding this product for payment, if any.
    pub reserved_by: Option<Uuid>,
}

/// A product can be taken by `order_id` when it is unsold and either free,
/// already held by that order, or held by an order that no longer exists.
const TAKEABLE_BY_ORDER: &str = r#"
    sold = false
    AND (
        reserved_by IS NULL
        OR reserved_by = $2
        OR NOT EXISTS (SELECT 1 FROM orders o WHERE o.id = products.reserved_by)
    )
"#;

#[derive(Debug, Clone)]
pub struct GetProductsByIds {
    pub ids: Vec<Uuid>,
}

impl Processor<GetProductsByIds> for DatabaseProcessor {
    type Output = Vec<ProductRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetProductsByIds")]
    async fn process(&self, query: GetProductsByIds) -> Result<Vec<ProductRecord>, sqlx::Error> {
        if query.ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, ProductRecord>(
            r#"
            SELECT id, seller_id, name, price, sold, reserved_by
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(query.ids)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Hold every listed product for `order_id`, or none of them.
///
/// Returns `false` when any product is sold or held by another live order.
pub struct ReserveProducts {
    pub ids: Vec<Uuid>,
    pub order_id: Uuid,
}

impl Processor<ReserveProducts> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ReserveProducts")]
    async fn process(&self, cmd: ReserveProducts) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "UPDATE products SET reserved_by = $2 WHERE id = ANY($1) AND {TAKEABLE_BY_ORDER}"
        );
        conditional_update_all(self, &sql, cmd.ids, cmd.order_id).await
    }
}

#[derive(Debug, Clone)]
/// Drop the hold `order_id` has on unsold products.
pub struct ReleaseProducts {
    pub ids: Vec<Uuid>,
    pub order_id: Uuid,
}

impl Processor<ReleaseProducts> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ReleaseProducts")]
    async fn process(&self, cmd: ReleaseProducts) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE products SET reserved_by = NULL
            WHERE id = ANY($1) AND reserved_by = $2 AND sold = false
            "#,
        )
        .bind(cmd.ids)
        .bind(cmd.order_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Flip `sold` from false to true on every listed product for `order_id`,
/// or on none of them.
pub struct MarkProductsSold {
    pub ids: Vec<Uuid>,
    pub order_id: Uuid,
}

impl Processor<MarkProductsSold> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkProductsSold")]
    async fn process(&self, cmd: MarkProductsSold) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "UPDATE products SET sold = true, reserved_by = $2 WHERE id = ANY($1) AND {TAKEABLE_BY_ORDER}"
        );
        conditional_update_all(self, &sql, cmd.ids, cmd.order_id).await
    }
}

/// Run a conditional update inside a transaction and commit only if it
/// matched every id. The matched count is the only availability signal.
async fn conditional_update_all(
    processor: &DatabaseProcessor,
    sql: &str,
    ids: Vec<Uuid>,
    order_id: Uuid,
) -> Result<bool, sqlx::Error> {
    if ids.is_empty() {
        return Ok(true);
    }
    let expected = ids.len() as u64;
    let mut tx = processor.begin().await?;
    let result = sqlx::query(sql)
        .bind(ids)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() != expected {
        tx.rollback().await?;
        return Ok(false);
    }
    tx.commit().await?;
    Ok(true)
}
