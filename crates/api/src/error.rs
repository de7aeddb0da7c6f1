//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{IdentityError, RpcError};
use delivery::DeliveryError;
use order::OrderError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The caller's identity headers are missing or malformed.
    #[error(transparent)]
    Unauthorized(#[from] IdentityError),

    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Order(#[from] OrderError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Delivery(err) => delivery_status(err),
            ApiError::Order(err) => order_status(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        } else {
            tracing::debug!(%status, error = %message, "request rejected");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn delivery_status(err: &DeliveryError) -> StatusCode {
    match err {
        DeliveryError::NotFound(_) | DeliveryError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        DeliveryError::InvalidTransition(_)
        | DeliveryError::DeliveryAlreadyExists { .. }
        | DeliveryError::ConcurrentModification { .. } => StatusCode::CONFLICT,
        DeliveryError::OrderServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DeliveryError::Messaging(_) | DeliveryError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn order_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::NotFound(_) | OrderError::DeliveryNotFound(_) => StatusCode::NOT_FOUND,
        OrderError::EmptyOrder | OrderError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
        OrderError::ProductService { source, .. } => match source {
            RpcError::NotFound(_) => StatusCode::NOT_FOUND,
            RpcError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        },
        // Not linked yet: the DeliveryCreated event is still in flight.
        OrderError::DeliveryNotAssigned(_)
        | OrderError::DeliveryAlreadyLinked { .. }
        | OrderError::DeliveryMismatch { .. }
        | OrderError::AlreadyDelivered(_)
        | OrderError::ConcurrentModification { .. } => StatusCode::CONFLICT,
        OrderError::DeliveryServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        OrderError::Messaging(_) | OrderError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
