//! API handlers

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::requests::{
    parse_body, read_body, AdjustRequest, NewTapRequest, PourRequest, ADJUST_INVALID,
    POUR_INVALID, TAP_NEW_INVALID,
};
use crate::api::AppState;
use crate::config::AdjustStrategy;
use crate::types::adjusted_pours;

const ADJUST_FAILED: &str = "Adjust failed";
const POUR_FAILED: &str = "Pour failed";
const INSERT_FAILED: &str = "Insert failed";

/// Health check
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_configured: state.store_configured(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store_configured: bool,
}

/// Answer a CORS pre-flight; the headers come from the router layers
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Adjust a tap's remaining pours by a signed delta, clamped at zero
pub async fn adjust(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<AdjustResponse>, ApiError> {
    state.authorize(&headers)?;
    let store = state.store()?;
    let body = read_body(body).await?;
    let (id, change) = parse_body::<AdjustRequest>(&body, ADJUST_INVALID)?.validate()?;

    let new_pours_remaining = match state.adjust_strategy {
        AdjustStrategy::ReadModifyWrite => {
            let current = store
                .fetch_pours_remaining(&id)
                .await
                .map_err(ApiError::store(ADJUST_FAILED))?
                .ok_or(ApiError::NotFound)?;

            let next = adjusted_pours(current, change);
            store
                .update_pours_remaining(&id, next, Utc::now())
                .await
                .map_err(ApiError::store(ADJUST_FAILED))?;
            next
        }
        AdjustStrategy::Atomic => store
            .adjust_pours_remaining(&id, change)
            .await
            .map_err(ApiError::store(ADJUST_FAILED))?
            .ok_or(ApiError::NotFound)?,
    };

    tracing::info!(
        tap_id = %id,
        change,
        pours_remaining = new_pours_remaining,
        "Adjusted pour count"
    );

    Ok(Json(AdjustResponse {
        success: true,
        new_pours_remaining,
    }))
}

#[derive(Debug, Serialize)]
pub struct AdjustResponse {
    pub success: bool,
    pub new_pours_remaining: i64,
}

/// Record a pour through the store's `log_pour_and_decrement` procedure
pub async fn pour(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<PourResponse>, ApiError> {
    state.authorize(&headers)?;
    let store = state.store()?;
    let body = read_body(body).await?;
    let pour = parse_body::<PourRequest>(&body, POUR_INVALID)?.validate()?;

    tracing::info!(
        tap_id = %pour.tap_id,
        size_oz = pour.size_oz,
        source = %pour.source,
        "Logging pour"
    );

    let result = store
        .log_pour(&pour)
        .await
        .map_err(ApiError::store(POUR_FAILED))?;

    Ok(Json(PourResponse { ok: true, result }))
}

#[derive(Debug, Serialize)]
pub struct PourResponse {
    pub ok: bool,
    pub result: Value,
}

/// Register a newly tapped keg
pub async fn tap_new(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<TapCreatedResponse>, ApiError> {
    state.authorize(&headers)?;
    let store = state.store()?;
    let body = read_body(body).await?;
    let tap = parse_body::<NewTapRequest>(&body, TAP_NEW_INVALID)?.validate(Utc::now())?;

    let inserted = store
        .insert_tap(&tap)
        .await
        .map_err(ApiError::store(INSERT_FAILED))?;

    tracing::info!(name = %tap.name, brewery = %tap.brewery, "Registered tap");

    Ok(Json(TapCreatedResponse {
        success: true,
        inserted,
    }))
}

#[derive(Debug, Serialize)]
pub struct TapCreatedResponse {
    pub success: bool,
    pub inserted: Vec<Value>,
}
