//! Seller endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use curio_sdk::objects::{OrderResponse, RecipientRegistration, RecipientResponse};

use super::ApiError;
use crate::api::extractors::AuthenticatedUser;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/recipient", post(register_recipient))
}

/// `GET /seller/orders`: paid orders of the caller's listings.
async fn list_orders(
    State(state): State<AppState>,
    AuthenticatedUser(seller_id): AuthenticatedUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.engine.list_seller_orders(seller_id).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// `POST /seller/recipient`
async fn register_recipient(
    State(state): State<AppState>,
    AuthenticatedUser(seller_id): AuthenticatedUser,
    Json(registration): Json<RecipientRegistration>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .engine
        .register_payout_recipient(seller_id, registration)
        .await?;
    let body = RecipientResponse {
        recipient_id: profile.recipient_id,
        bank_brand: profile.bank_brand,
        verified: profile.verified,
    };
    Ok((StatusCode::CREATED, Json(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_registration_with_mismatched_account_name_is_rejected() {
        let state = test_state();
        let registration = RecipientRegistration {
            first_name: "Somchai".to_string(),
            last_name: "Jaidee".to_string(),
            bank_name: "kbank".to_string(),
            account_number: "1234567890".to_string(),
            account_name: "Someone Else".to_string(),
        };
        let err = register_recipient(
            State(state),
            AuthenticatedUser(Uuid::new_v4()),
            Json(registration),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
