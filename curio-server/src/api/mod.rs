//! HTTP API of the order service.
//!
//! # Endpoints (under `/api/v1`)
//!
//! Buyer and seller endpoints require a session bearer token
//! (see [`extractors::AuthenticatedUser`]):
//!
//! - `POST /orders/checkout`                  – place an order
//! - `GET  /orders`                           – the caller's orders as buyer
//! - `GET  /orders/{order_id}`                – one order, buyer or seller only
//! - `POST /orders/{order_id}/pay`            – retry a card payment
//! - `POST /orders/{order_id}/cancel`         – cancel an unpaid order
//! - `POST /orders/{order_id}/mark-paid`      – sandbox PromptPay payment
//! - `POST /orders/{order_id}/confirm-delivery` – confirm receipt, pay the seller
//! - `PUT  /orders/{order_id}/tracking`       – seller submits tracking
//! - `POST /orders/{order_id}/accept`         – seller accepts
//! - `POST /orders/{order_id}/reject`         – seller rejects
//! - `GET  /seller/orders`                    – the caller's orders as seller
//! - `POST /seller/recipient`                 – register payout bank account
//!
//! The gateway webhook (`POST /webhooks/gateway`) is unauthenticated; its
//! payload is verified by fetching the charge back from the gateway.

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use curio_core::orders::{ErrorKind, OrderError};

use crate::state::AppState;

pub mod extractors;
mod orders;
mod sellers;
mod webhook;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/seller", sellers::router())
        .nest("/webhooks", webhook::router())
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// An engine error on its way to the client.
#[derive(Debug)]
pub struct ApiError(OrderError);

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        if matches!(self.0, OrderError::PaymentOutcomeUnknown { .. }) {
            return StatusCode::ACCEPTED;
        }
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::Gateway => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.0.kind() {
            ErrorKind::Internal => {
                tracing::error!(error = %self.0, "API store error");
                (status, "internal server error").into_response()
            }
            ErrorKind::Gateway => {
                tracing::warn!(error = %self.0, "API gateway error");
                (status, self.0.to_string()).into_response()
            }
            _ => (status, self.0.to_string()).into_response(),
        }
    }
}

#[cfg(test)]
pub(crate) const TEST_SECRET: &[u8] = b"curio-test-session-secret";

/// State over an in-memory store. The gateway points at an unroutable
/// address, so only handlers that never reach it can be exercised.
#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use crate::config::SessionSettings;
    use curio_core::config::{ConfigStore, GatewayConfig, MarketplacePolicy};
    use curio_core::gateway::OmiseGateway;
    use curio_core::store::InMemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://curio@127.0.0.1:1/curio")
        .unwrap();
    let gateway = OmiseGateway::new(
        GatewayConfig {
            public_key: "pkey_test".to_string(),
            secret_key: "skey_test".to_string(),
            api_url: "http://127.0.0.1:1/".parse().unwrap(),
        },
        Duration::from_secs(1),
    )
    .unwrap();
    let engine = curio_core::orders::OrderEngine::from_store(
        Arc::new(InMemoryStore::new()),
        Arc::new(gateway),
        ConfigStore::new(MarketplacePolicy::default()),
    );
    AppState::new(
        pool,
        engine,
        SessionSettings {
            secret: TEST_SECRET.to_vec().into_boxed_slice(),
            token_ttl: curio_sdk::session::DEFAULT_SESSION_TTL,
        },
    )
}
