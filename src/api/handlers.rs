use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};

use super::{
    dto::{
        DeviceDto, FleetStatus, IngestReadingRequest, LatestReadingsDto, MetricDto, ReadingDto,
    },
    errors::AppError,
    ussd::{self, UssdRequest},
    AppState,
};
use crate::db::{
    models::{DevicePower, MetricKind, NewReading, Status},
    HistoryQuery,
};

const DEFAULT_HISTORY_LIMIT: i64 = 100;
const MAX_HISTORY_LIMIT: i64 = 1000;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryParams {
    /// Start of time range (RFC3339, inclusive).
    pub from: Option<DateTime<Utc>>,
    /// End of time range (RFC3339, inclusive).
    pub to: Option<DateTime<Utc>>,
    /// Free-text match against the reading timestamp, e.g. `2026-03-01`.
    pub q: Option<String>,
    /// Maximum number of rows (default 100, at most 1000).
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Latest reading with a status per metric and the overall device status.
#[utoipa::path(
    get,
    path = "/latest-readings",
    responses(
        (status = 200, description = "Latest reading", body = LatestReadingsDto),
        (status = 404, description = "No readings found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "readings"
)]
pub async fn get_latest_readings(
    State(state): State<AppState>,
) -> Result<Json<LatestReadingsDto>, AppError> {
    let latest = state
        .store
        .latest_reading()
        .await?
        .ok_or(AppError::NotFound("No readings found"))?;
    let devices = state.store.list_devices().await?;

    Ok(Json(LatestReadingsDto::new(&latest, &devices)))
}

/// Readings newest first, optionally bounded by `?from=<RFC3339>&to=<RFC3339>`
/// and filtered by `?q=<text>` on the timestamp.
#[utoipa::path(
    get,
    path = "/history",
    params(HistoryParams),
    responses(
        (status = 200, description = "Readings, newest first", body = Vec<ReadingDto>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "readings"
)]
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ReadingDto>>, AppError> {
    let query = HistoryQuery {
        from: params.from,
        to: params.to,
        q: params
            .q
            .map(|q| q.trim().to_owned())
            .filter(|q| !q.is_empty()),
        limit: params
            .limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT),
    };
    let rows = state.store.history(&query).await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Every device row, ordered by id.
#[utoipa::path(
    get,
    path = "/device-status",
    responses(
        (status = 200, description = "Device rows", body = Vec<DeviceDto>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "devices"
)]
pub async fn get_device_status(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeviceDto>>, AppError> {
    let devices = state.store.list_devices().await?;
    Ok(Json(devices.into_iter().map(Into::into).collect()))
}

/// Store a reading submitted by a field device. Status is computed server-side.
#[utoipa::path(
    post,
    path = "/iot/readings",
    request_body = IngestReadingRequest,
    responses(
        (status = 201, description = "Reading stored", body = ReadingDto),
        (status = 400, description = "Malformed JSON, or a metric is missing or not numeric"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "readings"
)]
pub async fn post_reading(
    State(state): State<AppState>,
    body: Result<Json<IngestReadingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReadingDto>), AppError> {
    let Json(body) = body.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let (ph, turbidity, temperature) = body.parse().ok_or_else(|| {
        AppError::BadRequest("ph, turbidity and temperature must be numeric values".to_owned())
    })?;

    let reading = NewReading::new(ph, turbidity, temperature, Utc::now());
    let id = state.store.insert_reading(&reading).await?;

    Ok((StatusCode::CREATED, Json(reading.into_reading(id).into())))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "timestamp": Utc::now(),
    }))
}

// ---------------------------------------------------------------------------
// OpenAPI document
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        get_latest_readings,
        get_history,
        get_device_status,
        post_reading,
        health,
        ussd::handle_ussd,
    ),
    components(schemas(
        ReadingDto,
        MetricDto,
        LatestReadingsDto,
        FleetStatus,
        DeviceDto,
        IngestReadingRequest,
        UssdRequest,
        Status,
        MetricKind,
        DevicePower,
    )),
    tags(
        (name = "readings", description = "Water-quality readings"),
        (name = "devices",  description = "Sensor device status"),
        (name = "ussd",     description = "USSD text menu"),
        (name = "system",   description = "System endpoints"),
    ),
    info(
        title = "Water Monitor API",
        version = "0.1.0",
        description = "REST API for simulated water-quality telemetry"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
