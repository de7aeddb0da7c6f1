//! Delivery endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{DeliveryId, OrderId, UserId};
use delivery::{Delivery, DeliveryStatus, OrderProjection};
use serde::Deserialize;

use super::parse_id;
use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::AppState;

/// Body of `POST /deliveries`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    #[serde(default)]
    pub expected_delivery_at: Option<DateTime<Utc>>,
}

/// Body of `PUT /deliveries/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// POST /deliveries: schedule a delivery for an existing order.
#[tracing::instrument(skip(state, caller), fields(correlation_id = %caller.ctx().correlation_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CreateDeliveryRequest>,
) -> Result<(StatusCode, Json<Delivery>), ApiError> {
    let delivery = state
        .deliveries
        .create_delivery(
            caller.ctx(),
            req.order_id,
            req.user_id,
            req.expected_delivery_at,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

/// GET /deliveries
#[tracing::instrument(skip(state, _caller))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
) -> Result<Json<Vec<Delivery>>, ApiError> {
    Ok(Json(state.deliveries.find_all().await?))
}

/// GET /deliveries/{id}
#[tracing::instrument(skip(state, _caller))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Delivery>, ApiError> {
    let delivery_id: DeliveryId = parse_id("delivery", &id)?;
    Ok(Json(state.deliveries.find_by_id(delivery_id).await?))
}

/// PUT /deliveries/{id}/status: move a delivery through its lifecycle.
#[tracing::instrument(skip(state, caller), fields(correlation_id = %caller.ctx().correlation_id))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Delivery>, ApiError> {
    let delivery_id: DeliveryId = parse_id("delivery", &id)?;
    let requested: DeliveryStatus = req
        .status
        .parse()
        .map_err(|e: delivery::UnknownStatus| ApiError::BadRequest(e.to_string()))?;

    let delivery = state
        .deliveries
        .update_status(caller.ctx(), delivery_id, requested)
        .await?;
    Ok(Json(delivery))
}

/// GET /deliveries/{id}/order: the order a delivery belongs to.
#[tracing::instrument(skip(state, caller), fields(correlation_id = %caller.ctx().correlation_id))]
pub async fn order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderProjection>, ApiError> {
    let delivery_id: DeliveryId = parse_id("delivery", &id)?;
    let order = state
        .deliveries
        .find_order_by_delivery_id(caller.ctx(), delivery_id)
        .await?;
    Ok(Json(order))
}
