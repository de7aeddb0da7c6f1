//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use order::{DeliveryProjection, ItemRequest, Order, PaymentMode};
use serde::Deserialize;

use super::parse_id;
use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::AppState;

/// Body of `POST /orders` and `PUT /orders/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub items: Vec<ItemRequest>,
    pub payment_mode: PaymentMode,
}

/// POST /orders: price and place an order for the caller.
#[tracing::instrument(skip(state, caller, req), fields(correlation_id = %caller.ctx().correlation_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<OrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .orders
        .create_order(caller.ctx(), req.items, req.payment_mode)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders
#[tracing::instrument(skip(state, _caller))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.find_all_orders().await?))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state, _caller))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    Ok(Json(state.orders.find_order_by_id(order_id).await?))
}

/// PUT /orders/{id}: replace the items of an undelivered order.
#[tracing::instrument(skip(state, caller, req), fields(correlation_id = %caller.ctx().correlation_id))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<OrderRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state
        .orders
        .update_order(caller.ctx(), order_id, req.items, req.payment_mode)
        .await?;
    Ok(Json(order))
}

/// GET /orders/{id}/delivery: the delivery linked to an order.
///
/// Answers 409 while the delivery exists but has not been linked yet, and
/// 404 when the linked delivery is unknown to the delivery service.
#[tracing::instrument(skip(state, caller), fields(correlation_id = %caller.ctx().correlation_id))]
pub async fn delivery(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<DeliveryProjection>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let delivery = state
        .orders
        .get_delivery_by_order_id(caller.ctx(), order_id)
        .await?;
    Ok(Json(delivery))
}
