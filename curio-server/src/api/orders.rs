//! Buyer and seller order endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use curio_core::orders::{CheckoutCommand, CheckoutOutcome};
use curio_sdk::objects::{
    CardPayment, CheckoutRequest, CheckoutResponse, OrderResponse, TrackingUpdate,
};
use uuid::Uuid;

use super::ApiError;
use crate::api::extractors::AuthenticatedUser;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/checkout", post(checkout))
        .route("/{order_id}", get(get_order))
        .route("/{order_id}/pay", post(pay))
        .route("/{order_id}/cancel", post(cancel))
        .route("/{order_id}/mark-paid", post(mark_paid))
        .route("/{order_id}/confirm-delivery", post(confirm_delivery))
        .route("/{order_id}/tracking", put(submit_tracking))
        .route("/{order_id}/accept", post(accept))
        .route("/{order_id}/reject", post(reject))
}

fn to_response(outcome: CheckoutOutcome) -> CheckoutResponse {
    CheckoutResponse {
        order: outcome.order.into(),
        payment: outcome.payment,
    }
}

/// `POST /orders/checkout`
async fn checkout(
    State(state): State<AppState>,
    AuthenticatedUser(buyer_id): AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .engine
        .checkout(CheckoutCommand::from_request(buyer_id, request))
        .await?;
    Ok((StatusCode::CREATED, Json(to_response(outcome))))
}

/// `GET /orders`
async fn list_orders(
    State(state): State<AppState>,
    AuthenticatedUser(buyer_id): AuthenticatedUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.engine.list_buyer_orders(buyer_id).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// `GET /orders/{order_id}`
async fn get_order(
    State(state): State<AppState>,
    AuthenticatedUser(caller_id): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.engine.get_order(order_id, caller_id).await?;
    Ok(Json(order.into()))
}

/// `POST /orders/{order_id}/pay`: retry the card charge of an unpaid order.
async fn pay(
    State(state): State<AppState>,
    AuthenticatedUser(buyer_id): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(payment): Json<CardPayment>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let outcome = state
        .engine
        .pay_with_card(order_id, buyer_id, &payment.token)
        .await?;
    Ok(Json(to_response(outcome)))
}

/// `POST /orders/{order_id}/cancel`
async fn cancel(
    State(state): State<AppState>,
    AuthenticatedUser(buyer_id): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.engine.cancel_order(order_id, buyer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /orders/{order_id}/mark-paid`: sandbox only.
async fn mark_paid(
    State(state): State<AppState>,
    AuthenticatedUser(buyer_id): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.engine.mark_paid_for_testing(order_id, buyer_id).await?;
    Ok(Json(order.into()))
}

/// `POST /orders/{order_id}/confirm-delivery`
async fn confirm_delivery(
    State(state): State<AppState>,
    AuthenticatedUser(buyer_id): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.engine.confirm_delivery(order_id, buyer_id).await?;
    Ok(Json(order.into()))
}

/// `PUT /orders/{order_id}/tracking`
async fn submit_tracking(
    State(state): State<AppState>,
    AuthenticatedUser(seller_id): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(update): Json<TrackingUpdate>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .engine
        .submit_tracking(order_id, seller_id, update)
        .await?;
    Ok(Json(order.into()))
}

/// `POST /orders/{order_id}/accept`
async fn accept(
    State(state): State<AppState>,
    AuthenticatedUser(seller_id): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.engine.accept_order(order_id, seller_id).await?;
    Ok(Json(order.into()))
}

/// `POST /orders/{order_id}/reject`
async fn reject(
    State(state): State<AppState>,
    AuthenticatedUser(seller_id): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.engine.reject_order(order_id, seller_id).await?;
    Ok(Json(order.into()))
}
