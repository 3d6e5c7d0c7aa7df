use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::controller::SyncController;
use crate::error::ControlFailure;
use crate::registry::DeviceTransport;

/// Closed set of device categories; drives icon selection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Light,
    Outlet,
    Fan,
    Switch,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub is_online: bool,
    pub is_on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub last_seen: DateTime<Utc>,
}

/// Full snapshot of the known fleet, in registry insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiscoveryResult {
    pub devices: Vec<Device>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    TurnOn,
    TurnOff,
}

impl ControlAction {
    pub fn for_power(on: bool) -> Self {
        if on {
            ControlAction::TurnOn
        } else {
            ControlAction::TurnOff
        }
    }

    pub fn desired_power(self) -> bool {
        matches!(self, ControlAction::TurnOn)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ControlRequest {
    pub device_id: String,
    pub action: ControlAction,
}

/// On failure `new_state` carries the unchanged prior power state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ControlResponse {
    pub success: bool,
    pub device_id: String,
    pub new_state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn failure(device_id: String, current_state: bool, failure: ControlFailure) -> Self {
        Self {
            success: false,
            device_id,
            new_state: current_state,
            error: Some(failure.to_string()),
        }
    }
}

pub struct AppState {
    pub controller: Arc<SyncController>,
    pub transport: Arc<dyn DeviceTransport>,
}

impl AppState {
    pub fn new(controller: Arc<SyncController>, transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            controller,
            transport,
        }
    }
}
