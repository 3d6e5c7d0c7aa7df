// registry/mock.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

use super::{DeviceTransport, Randomness};
use crate::error::{ControlFailure, TransportError};
use crate::models::{ControlRequest, ControlResponse, Device, DeviceKind, DiscoveryResult};

const DISCOVER_DELAY_MS: (u64, u64) = (1_500, 3_000);
const CONTROL_DELAY_MS: (u64, u64) = (200, 800);
const STATUS_DELAY_MS: (u64, u64) = (500, 1_200);

/// Failure behavior of the simulated fleet.
#[derive(Debug, Clone, Copy)]
pub struct RegistryTuning {
    pub control_failure_rate: f64,
    pub reconnect_probability: f64,
}

impl Default for RegistryTuning {
    fn default() -> Self {
        Self {
            control_failure_rate: 0.05,
            reconnect_probability: 0.3,
        }
    }
}

/// In-memory stand-in for a best-effort network-attached device fleet.
/// Insertion order of the table is the discovery order callers observe.
pub struct MockRegistry {
    devices: Mutex<IndexMap<String, Device>>,
    tuning: RegistryTuning,
    random: Arc<dyn Randomness>,
}

impl MockRegistry {
    pub fn new(seed: Vec<Device>, tuning: RegistryTuning, random: Arc<dyn Randomness>) -> Self {
        let devices = seed.into_iter().map(|d| (d.id.clone(), d)).collect();
        Self {
            devices: Mutex::new(devices),
            tuning,
            random,
        }
    }

    pub fn seeded(tuning: RegistryTuning, random: Arc<dyn Randomness>) -> Self {
        Self::new(default_fleet(), tuning, random)
    }

    async fn pause(&self, window: (u64, u64)) {
        sleep(self.random.latency(window.0, window.1)).await;
    }
}

#[cfg(test)]
impl MockRegistry {
    pub(crate) async fn stored(&self, device_id: &str) -> Option<Device> {
        self.devices.lock().await.get(device_id).cloned()
    }

    pub(crate) async fn stored_all(&self) -> Vec<Device> {
        self.devices.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl DeviceTransport for MockRegistry {
    async fn discover(&self) -> Result<DiscoveryResult, TransportError> {
        self.pause(DISCOVER_DELAY_MS).await;
        let now = Utc::now();
        let mut table = self.devices.lock().await;
        for device in table.values_mut() {
            if device.is_online {
                device.last_seen = now;
            }
        }
        let devices = table.values().cloned().collect();
        Ok(DiscoveryResult {
            devices,
            timestamp: now,
        })
    }

    async fn control(&self, request: ControlRequest) -> Result<ControlResponse, TransportError> {
        self.pause(CONTROL_DELAY_MS).await;
        let mut table = self.devices.lock().await;
        let Some(device) = table.get_mut(&request.device_id) else {
            return Ok(ControlResponse::failure(
                request.device_id,
                false,
                ControlFailure::NotFound,
            ));
        };
        if !device.is_online {
            return Ok(ControlResponse::failure(
                request.device_id,
                device.is_on,
                ControlFailure::Offline,
            ));
        }
        if self.random.roll(self.tuning.control_failure_rate) {
            return Ok(ControlResponse::failure(
                request.device_id,
                device.is_on,
                ControlFailure::Timeout,
            ));
        }

        device.is_on = request.action.desired_power();
        device.last_seen = Utc::now();
        debug!(device_id = %device.id, is_on = device.is_on, "control applied");
        Ok(ControlResponse {
            success: true,
            device_id: request.device_id,
            new_state: device.is_on,
            error: None,
        })
    }

    async fn status(&self, device_id: &str) -> Result<Option<Device>, TransportError> {
        self.pause(STATUS_DELAY_MS).await;
        let mut table = self.devices.lock().await;
        let Some(device) = table.get_mut(device_id) else {
            return Ok(None);
        };
        // Offline devices get a chance to reconnect while being probed.
        if !device.is_online && self.random.roll(self.tuning.reconnect_probability) {
            device.is_online = true;
            device.last_seen = Utc::now();
            debug!(device_id, "device reconnected during status probe");
        }
        Ok(Some(device.clone()))
    }

    async fn force_offline(&self, device_id: &str) {
        if let Some(device) = self.devices.lock().await.get_mut(device_id) {
            device.is_online = false;
        }
    }

    async fn force_online(&self, device_id: &str) {
        if let Some(device) = self.devices.lock().await.get_mut(device_id) {
            device.is_online = true;
            device.last_seen = Utc::now();
        }
    }
}

/// The fixed fleet every registry starts with.
pub fn default_fleet() -> Vec<Device> {
    let now = Utc::now();
    vec![
        Device {
            id: "device_001".to_string(),
            name: "Living Room Light".to_string(),
            kind: DeviceKind::Light,
            is_online: true,
            is_on: false,
            ip: Some("192.168.1.101".to_string()),
            model: Some("Tuya Smart Bulb v2".to_string()),
            last_seen: now,
        },
        Device {
            id: "device_002".to_string(),
            name: "Kitchen Outlet".to_string(),
            kind: DeviceKind::Outlet,
            is_online: true,
            is_on: true,
            ip: Some("192.168.1.102".to_string()),
            model: Some("Smart Plug Pro".to_string()),
            last_seen: now,
        },
        Device {
            id: "device_003".to_string(),
            name: "Bedroom Fan".to_string(),
            kind: DeviceKind::Fan,
            is_online: false,
            is_on: false,
            ip: Some("192.168.1.103".to_string()),
            model: Some("Ceiling Fan Controller".to_string()),
            last_seen: now - chrono::Duration::minutes(5),
        },
        Device {
            id: "device_004".to_string(),
            name: "Patio Switch".to_string(),
            kind: DeviceKind::Switch,
            is_online: true,
            is_on: false,
            ip: Some("192.168.1.104".to_string()),
            model: Some("Outdoor Smart Switch".to_string()),
            last_seen: now,
        },
    ]
}
