//! Payment gateway webhook intake.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use curio_core::orders::ErrorKind;
use curio_sdk::objects::GatewayEvent;

use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/gateway", post(gateway_event))
}

/// `POST /webhooks/gateway`
///
/// Answers 5xx only when the event could not be checked against the
/// gateway or stored, so the provider redelivers it. Events that were
/// understood but changed nothing are acknowledged.
async fn gateway_event(
    State(state): State<AppState>,
    Json(event): Json<GatewayEvent>,
) -> StatusCode {
    match state.engine.handle_gateway_event(&event).await {
        Ok(Some(order)) => {
            tracing::info!(event_id = %event.id, order_id = %order.id, status = %order.status, "Gateway event applied");
            StatusCode::OK
        }
        Ok(None) => StatusCode::OK,
        Err(e) => match e.kind() {
            ErrorKind::Gateway => {
                tracing::warn!(event_id = %event.id, error = %e, "Could not verify gateway event");
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::Internal => {
                tracing::error!(event_id = %event.id, error = %e, "Failed to apply gateway event");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => {
                tracing::warn!(event_id = %event.id, error = %e, "Gateway event rejected");
                StatusCode::OK
            }
        },
    }
}
