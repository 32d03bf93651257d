use super::OrderEngine;
use super::errors::OrderError;
use tracing::info;
use uuid::Uuid;

impl OrderEngine {
    /// Delete every `awaiting_payment` order whose window closed at or before
    /// now. Returns the deleted order ids.
    ///
    /// Deleting the order also lapses its product reservations, so nothing
    /// else needs to be undone.
    pub async fn sweep_expired(&self) -> Result<Vec<Uuid>, OrderError> {
        let now = self.clock.now();
        let deleted = self.orders.delete_expired_orders(now).await?;
        if !deleted.is_empty() {
            info!(count = deleted.len(), orders = ?deleted, "Expired orders deleted");
        }
        Ok(deleted)
    }
}
