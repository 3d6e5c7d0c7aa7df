// handlers.rs
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::models::{AppState, Device, DiscoveryResult};

#[derive(Debug, Serialize, ToSchema)]
pub struct FleetSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub active: usize,
}

impl FleetSummary {
    fn of(devices: &[Device]) -> Self {
        let online = devices.iter().filter(|d| d.is_online).count();
        let active = devices.iter().filter(|d| d.is_online && d.is_on).count();
        Self {
            total: devices.len(),
            online,
            offline: devices.len() - online,
            active,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceListResponse {
    pub devices: Vec<Device>,
    pub summary: FleetSummary,
    pub last_scan: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub scanning: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetPowerRequest {
    pub on: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SetPowerResponse {
    pub device_id: String,
    pub success: bool,
    pub is_on: Option<bool>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SimulatePresenceRequest {
    pub online: bool,
}

#[utoipa::path(
    get,
    path = "/api/devices",
    responses((status = 200, description = "Current local device list", body = DeviceListResponse))
)]
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<DeviceListResponse> {
    let devices = state.controller.devices().await;
    let summary = FleetSummary::of(&devices);
    Json(DeviceListResponse {
        summary,
        last_scan: state.controller.last_scan().await,
        error: state.controller.last_error().await,
        scanning: state.controller.is_scanning(),
        devices,
    })
}

#[utoipa::path(
    post,
    path = "/api/scan",
    responses(
        (status = 200, description = "Fresh discovery snapshot", body = DiscoveryResult),
        (status = 409, description = "A scan is already in progress"),
        (status = 502, description = "Discovery transport fault"),
    )
)]
pub async fn scan_devices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DiscoveryResult>, AppError> {
    if state.controller.is_scanning() {
        return Err(AppError::ScanInProgress);
    }
    let result = state.controller.scan().await?;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/devices/{id}/power",
    params(("id" = String, Path, description = "Device identifier")),
    request_body = SetPowerRequest,
    responses((status = 200, description = "Reconciled toggle outcome", body = SetPowerResponse))
)]
pub async fn set_device_power(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Json(body): Json<SetPowerRequest>,
) -> Json<SetPowerResponse> {
    let report = state.controller.toggle(&device_id, body.on).await;
    let success = report.succeeded();
    let is_on = report.flight.settled_power();
    Json(SetPowerResponse {
        device_id: report.device_id,
        success,
        is_on,
        error: report.error,
    })
}

#[utoipa::path(
    get,
    path = "/api/devices/{id}/status",
    params(("id" = String, Path, description = "Device identifier")),
    responses(
        (status = 200, description = "Registry copy of the device", body = Device),
        (status = 404, description = "Unknown device"),
    )
)]
pub async fn device_status(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<Device>, AppError> {
    let device = state
        .transport
        .status(&device_id)
        .await?
        .ok_or(AppError::DeviceNotFound)?;
    Ok(Json(device))
}

#[utoipa::path(
    post,
    path = "/api/devices/{id}/presence",
    params(("id" = String, Path, description = "Device identifier")),
    request_body = SimulatePresenceRequest,
    responses((status = 204, description = "Presence override applied"))
)]
pub async fn simulate_presence(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Json(body): Json<SimulatePresenceRequest>,
) -> StatusCode {
    if body.online {
        state.transport.force_online(&device_id).await;
    } else {
        state.transport.force_offline(&device_id).await;
    }
    info!(device_id, online = body.online, "presence override applied");
    StatusCode::NO_CONTENT
}
