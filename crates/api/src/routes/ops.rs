//! Health, metrics and dead-letter inspection endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use messaging::consumer::{
    ATTEMPTS_HEADER, ERROR_HEADER, ORIGINAL_OFFSET_HEADER, ORIGINAL_PARTITION_HEADER,
    ORIGINAL_TOPIC_HEADER,
};
use messaging::topics;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health: returns system health status.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}

/// A record that exhausted its delivery attempts.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterResponse {
    pub topic: String,
    pub original_topic: Option<String>,
    pub original_partition: Option<String>,
    pub original_offset: Option<String>,
    pub attempts: Option<String>,
    pub error: Option<String>,
    pub key: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub dead_lettered_at: DateTime<Utc>,
}

/// GET /ops/dead-letters: lists every dead-lettered record, oldest first.
#[tracing::instrument(skip(state, caller), fields(correlation_id = %caller.ctx().correlation_id))]
pub async fn dead_letters(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<DeadLetterResponse>>, ApiError> {
    let mut letters = Vec::new();
    for topic in topics::dead_letter_topics() {
        for record in state.broker.records(&topic).await {
            let header = |name: &str| record.header(name).map(str::to_string);
            letters.push(DeadLetterResponse {
                topic: topic.clone(),
                original_topic: header(ORIGINAL_TOPIC_HEADER),
                original_partition: header(ORIGINAL_PARTITION_HEADER),
                original_offset: header(ORIGINAL_OFFSET_HEADER),
                attempts: header(ATTEMPTS_HEADER),
                error: header(ERROR_HEADER),
                key: record.key.clone(),
                event_type: record.event_type.clone(),
                payload: record.payload.clone(),
                dead_lettered_at: record.timestamp,
            });
        }
    }
    letters.sort_by_key(|l| l.dead_lettered_at);
    Ok(Json(letters))
}
