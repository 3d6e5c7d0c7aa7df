// controller/mod.rs
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{AppError, StorageError};
use crate::events::{Notification, NotificationBus};
use crate::models::{ControlAction, ControlRequest, Device, DiscoveryResult};
use crate::registry::DeviceTransport;
use crate::storage::{Snapshot, SnapshotStore};

const SCAN_FAILED_MESSAGE: &str = "Failed to discover devices. Check network connection.";
const NETWORK_ERROR_MESSAGE: &str = "Network error. Please try again.";
const CONTROL_FALLBACK_MESSAGE: &str = "Failed to control device";

/// Lifecycle of one optimistic toggle. Rollback restores the exact
/// pre-toggle value, not the inverse of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleFlight {
    Idle,
    Optimistic { prior_on: bool },
    Confirmed { is_on: bool },
    RolledBack { is_on: bool },
}

impl ToggleFlight {
    fn begin(prior_on: bool) -> Self {
        ToggleFlight::Optimistic { prior_on }
    }

    fn confirm(self, reported_on: bool) -> Self {
        match self {
            ToggleFlight::Optimistic { .. } => ToggleFlight::Confirmed { is_on: reported_on },
            other => other,
        }
    }

    fn roll_back(self) -> Self {
        match self {
            ToggleFlight::Optimistic { prior_on } => ToggleFlight::RolledBack { is_on: prior_on },
            other => other,
        }
    }

    /// Local power state once the flight has settled, if the device was known.
    pub fn settled_power(self) -> Option<bool> {
        match self {
            ToggleFlight::Confirmed { is_on } | ToggleFlight::RolledBack { is_on } => Some(is_on),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToggleReport {
    pub device_id: String,
    pub flight: ToggleFlight,
    pub error: Option<String>,
}

impl ToggleReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.flight, ToggleFlight::Confirmed { .. })
    }
}

/// Bridges the presentation layer's two operations to the transport, keeping
/// a local working copy of the fleet that is updated optimistically.
pub struct SyncController {
    transport: Arc<dyn DeviceTransport>,
    devices: RwLock<Vec<Device>>,
    last_scan: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    scanning: AtomicBool,
    store: Option<SnapshotStore>,
    events: NotificationBus,
}

impl SyncController {
    pub fn new(transport: Arc<dyn DeviceTransport>, store: Option<SnapshotStore>) -> Self {
        Self {
            transport,
            devices: RwLock::new(Vec::new()),
            last_scan: RwLock::new(None),
            last_error: RwLock::new(None),
            scanning: AtomicBool::new(false),
            store,
            events: NotificationBus::new(),
        }
    }

    pub fn events(&self) -> &NotificationBus {
        &self.events
    }

    pub async fn devices(&self) -> Vec<Device> {
        self.devices.read().await.clone()
    }

    pub async fn last_scan(&self) -> Option<DateTime<Utc>> {
        *self.last_scan.read().await
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Callers are expected to suppress re-entrant scans while this is set;
    /// the controller itself does not serialize them.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Loads the persisted device list and scan time, if a store is attached
    /// and a snapshot exists.
    pub async fn restore(&self) -> Result<(), StorageError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Some(snapshot) = store.load().await? {
            *self.devices.write().await = snapshot.devices;
            *self.last_scan.write().await = snapshot.last_scan;
        }
        Ok(())
    }

    /// Replaces the whole local list with a fresh discovery snapshot. On a
    /// transport fault the list is left untouched and a fixed message is
    /// surfaced; this is the only operation that returns an error.
    pub async fn scan(&self) -> Result<DiscoveryResult, AppError> {
        self.scanning.store(true, Ordering::SeqCst);
        *self.last_error.write().await = None;

        let outcome = self.transport.discover().await;
        let result = match outcome {
            Ok(result) => {
                *self.devices.write().await = result.devices.clone();
                *self.last_scan.write().await = Some(result.timestamp);
                self.persist().await;
                counter!("device_scans_total").increment(1);
                info!(devices = result.devices.len(), "discovery completed");
                self.events.publish(Notification::ScanCompleted {
                    device_count: result.devices.len(),
                });
                Ok(result)
            }
            Err(fault) => {
                counter!("device_scan_failures_total").increment(1);
                warn!(error = %fault, "discovery failed");
                let message = SCAN_FAILED_MESSAGE.to_string();
                *self.last_error.write().await = Some(message.clone());
                self.events.publish(Notification::ScanFailed { message });
                Err(AppError::Transport(fault))
            }
        };

        self.scanning.store(false, Ordering::SeqCst);
        result
    }

    /// Optimistically flips the local power flag, then reconciles against
    /// the transport's verdict. Never returns an error; failures surface on
    /// the report and the error surface.
    pub async fn toggle(&self, device_id: &str, desired_on: bool) -> ToggleReport {
        let flight = match self.apply_optimistic(device_id, desired_on).await {
            Some(prior_on) => ToggleFlight::begin(prior_on),
            None => ToggleFlight::Idle,
        };

        let request = ControlRequest {
            device_id: device_id.to_string(),
            action: ControlAction::for_power(desired_on),
        };

        match self.transport.control(request).await {
            Ok(response) if response.success => {
                let flight = flight.confirm(response.new_state);
                self.reconcile_confirmed(device_id, response.new_state).await;
                self.persist().await;
                counter!("device_toggles_total").increment(1);
                self.events.publish(Notification::DeviceToggled {
                    device_id: device_id.to_string(),
                    is_on: response.new_state,
                });
                ToggleReport {
                    device_id: device_id.to_string(),
                    flight,
                    error: None,
                }
            }
            Ok(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| CONTROL_FALLBACK_MESSAGE.to_string());
                self.fail_toggle(device_id, flight, message).await
            }
            Err(fault) => {
                warn!(device_id, error = %fault, "control request faulted");
                self.fail_toggle(device_id, flight, NETWORK_ERROR_MESSAGE.to_string())
                    .await
            }
        }
    }

    async fn fail_toggle(
        &self,
        device_id: &str,
        flight: ToggleFlight,
        message: String,
    ) -> ToggleReport {
        counter!("device_toggle_failures_total").increment(1);
        let flight = flight.roll_back();
        if let ToggleFlight::RolledBack { is_on } = flight {
            self.set_power_local(device_id, is_on).await;
        }
        *self.last_error.write().await = Some(message.clone());
        self.events.publish(Notification::ControlFailed {
            device_id: device_id.to_string(),
            message: message.clone(),
        });
        ToggleReport {
            device_id: device_id.to_string(),
            flight,
            error: Some(message),
        }
    }

    /// Sets the local power flag ahead of the round trip, returning the
    /// prior value when the device exists locally.
    async fn apply_optimistic(&self, device_id: &str, desired_on: bool) -> Option<bool> {
        let mut devices = self.devices.write().await;
        let device = devices.iter_mut().find(|d| d.id == device_id)?;
        let prior = device.is_on;
        device.is_on = desired_on;
        Some(prior)
    }

    async fn set_power_local(&self, device_id: &str, is_on: bool) {
        let mut devices = self.devices.write().await;
        if let Some(device) = devices.iter_mut().find(|d| d.id == device_id) {
            device.is_on = is_on;
        }
    }

    async fn reconcile_confirmed(&self, device_id: &str, is_on: bool) {
        let mut devices = self.devices.write().await;
        if let Some(device) = devices.iter_mut().find(|d| d.id == device_id) {
            device.is_on = is_on;
            device.last_seen = Utc::now();
        }
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = Snapshot {
            devices: self.devices.read().await.clone(),
            last_scan: *self.last_scan.read().await,
        };
        if let Err(err) = store.save(&snapshot).await {
            warn!(error = %err, "failed to persist device snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::{SystemTime, UNIX_EPOCH};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::error::TransportError;
    use crate::models::ControlResponse;
    use crate::registry::testing::ScriptedRandomness;
    use crate::registry::{MockRegistry, RegistryTuning, default_fleet};

    struct ScriptedTransport {
        discoveries: Mutex<VecDeque<Result<DiscoveryResult, TransportError>>>,
        controls: Mutex<VecDeque<Result<ControlResponse, TransportError>>>,
    }

    impl ScriptedTransport {
        fn new(
            discoveries: Vec<Result<DiscoveryResult, TransportError>>,
            controls: Vec<Result<ControlResponse, TransportError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                discoveries: Mutex::new(discoveries.into()),
                controls: Mutex::new(controls.into()),
            })
        }
    }

    #[async_trait]
    impl DeviceTransport for ScriptedTransport {
        async fn discover(&self) -> Result<DiscoveryResult, TransportError> {
            self.discoveries
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Channel(std::io::Error::other("script exhausted"))))
        }

        async fn control(&self, _request: ControlRequest) -> Result<ControlResponse, TransportError> {
            self.controls
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Channel(std::io::Error::other("script exhausted"))))
        }

        async fn status(&self, _device_id: &str) -> Result<Option<Device>, TransportError> {
            Ok(None)
        }

        async fn force_offline(&self, _device_id: &str) {}
        async fn force_online(&self, _device_id: &str) {}
    }

    fn discovery_of(devices: Vec<Device>) -> DiscoveryResult {
        DiscoveryResult {
            devices,
            timestamp: Utc::now(),
        }
    }

    fn success(device_id: &str, new_state: bool) -> ControlResponse {
        ControlResponse {
            success: true,
            device_id: device_id.to_string(),
            new_state,
            error: None,
        }
    }

    fn failure(device_id: &str, current: bool, message: &str) -> ControlResponse {
        ControlResponse {
            success: false,
            device_id: device_id.to_string(),
            new_state: current,
            error: Some(message.to_string()),
        }
    }

    async fn seeded_controller(
        controls: Vec<Result<ControlResponse, TransportError>>,
    ) -> SyncController {
        let transport = ScriptedTransport::new(vec![Ok(discovery_of(default_fleet()))], controls);
        let controller = SyncController::new(transport, None);
        controller.scan().await.expect("seed scan");
        controller
    }

    async fn device(controller: &SyncController, id: &str) -> Device {
        controller
            .devices()
            .await
            .into_iter()
            .find(|d| d.id == id)
            .expect("device")
    }

    #[tokio::test]
    async fn scan_replaces_local_list_in_registry_order() {
        let fleet = default_fleet();
        let transport = ScriptedTransport::new(vec![Ok(discovery_of(fleet.clone()))], vec![]);
        let controller = SyncController::new(transport, None);

        let result = controller.scan().await.expect("scan");
        let local = controller.devices().await;
        assert_eq!(local, fleet);
        let ids: Vec<_> = local.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["device_001", "device_002", "device_003", "device_004"]);
        assert_eq!(controller.last_scan().await, Some(result.timestamp));
        assert!(controller.last_error().await.is_none());
        assert!(!controller.is_scanning());
    }

    #[tokio::test]
    async fn failed_scan_keeps_previous_list_and_surfaces_message() {
        let transport = ScriptedTransport::new(
            vec![
                Ok(discovery_of(default_fleet())),
                Err(TransportError::Channel(std::io::Error::other("radio down"))),
            ],
            vec![],
        );
        let controller = SyncController::new(transport, None);
        controller.scan().await.expect("seed scan");
        let before = controller.devices().await;
        let before_scan = controller.last_scan().await;

        let outcome = controller.scan().await;
        assert!(outcome.is_err());
        assert_eq!(controller.devices().await, before);
        assert_eq!(controller.last_scan().await, before_scan);
        assert_eq!(
            controller.last_error().await.as_deref(),
            Some("Failed to discover devices. Check network connection.")
        );
        assert!(!controller.is_scanning());
    }

    #[tokio::test]
    async fn successful_toggle_adopts_reported_state() {
        let controller = seeded_controller(vec![Ok(success("device_001", true))]).await;
        let before_seen = device(&controller, "device_001").await.last_seen;

        let report = controller.toggle("device_001", true).await;
        assert!(report.succeeded());
        assert_eq!(report.flight, ToggleFlight::Confirmed { is_on: true });
        let after = device(&controller, "device_001").await;
        assert!(after.is_on);
        assert!(after.last_seen >= before_seen);
    }

    #[tokio::test]
    async fn failed_toggle_restores_exact_prior_state() {
        // device_002 is already on; requesting "on" again and failing must
        // restore "on", not the inverse of the request.
        let controller =
            seeded_controller(vec![Ok(failure("device_002", true, "Communication timeout"))]).await;
        let before = controller.devices().await;

        let report = controller.toggle("device_002", true).await;
        assert!(!report.succeeded());
        assert_eq!(report.flight, ToggleFlight::RolledBack { is_on: true });
        assert_eq!(report.error.as_deref(), Some("Communication timeout"));
        assert_eq!(controller.devices().await, before);
    }

    #[tokio::test]
    async fn transport_fault_rolls_back_with_generic_message() {
        let controller = seeded_controller(vec![Err(TransportError::Channel(
            std::io::Error::other("link reset"),
        ))])
        .await;
        let before = controller.devices().await;

        let report = controller.toggle("device_001", true).await;
        assert_eq!(report.flight, ToggleFlight::RolledBack { is_on: false });
        assert_eq!(report.error.as_deref(), Some("Network error. Please try again."));
        assert_eq!(controller.devices().await, before);
        assert_eq!(controller.last_error().await, report.error);
    }

    #[tokio::test]
    async fn toggle_of_unknown_device_touches_nothing_locally() {
        let controller =
            seeded_controller(vec![Ok(failure("device_999", false, "Device not found"))]).await;
        let before = controller.devices().await;

        let report = controller.toggle("device_999", true).await;
        assert_eq!(report.flight, ToggleFlight::Idle);
        assert_eq!(report.error.as_deref(), Some("Device not found"));
        assert_eq!(controller.devices().await, before);
    }

    #[tokio::test]
    async fn missing_failure_message_falls_back_to_generic() {
        let mut response = failure("device_001", false, "placeholder");
        response.error = None;
        let controller = seeded_controller(vec![Ok(response)]).await;

        let report = controller.toggle("device_001", true).await;
        assert_eq!(report.error.as_deref(), Some("Failed to control device"));
    }

    #[test]
    fn toggle_flight_transitions() {
        let flight = ToggleFlight::begin(true);
        assert_eq!(flight, ToggleFlight::Optimistic { prior_on: true });
        assert_eq!(flight.confirm(false), ToggleFlight::Confirmed { is_on: false });
        assert_eq!(flight.roll_back(), ToggleFlight::RolledBack { is_on: true });
        assert_eq!(ToggleFlight::Idle.roll_back(), ToggleFlight::Idle);
        assert_eq!(ToggleFlight::Idle.settled_power(), None);
    }

    #[tokio::test]
    async fn scan_and_toggle_persist_snapshot() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("device_hub_controller_test_{suffix}"));
        let path = root.join("devices.json");

        let transport = ScriptedTransport::new(
            vec![Ok(discovery_of(default_fleet()))],
            vec![Ok(success("device_001", true))],
        );
        let controller = SyncController::new(transport, Some(SnapshotStore::new(&path)));
        controller.scan().await.expect("scan");
        controller.toggle("device_001", true).await;

        let restored = SnapshotStore::new(&path)
            .load()
            .await
            .expect("load")
            .expect("snapshot");
        assert_eq!(restored.devices.len(), 4);
        assert!(
            restored
                .devices
                .iter()
                .find(|d| d.id == "device_001")
                .expect("device_001")
                .is_on
        );
        assert!(restored.last_scan.is_some());

        std::fs::remove_dir_all(root).expect("cleanup");
    }

    #[tokio::test]
    async fn restore_applies_persisted_snapshot() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("device_hub_restore_test_{suffix}"));
        let path = root.join("devices.json");

        let snapshot = Snapshot {
            devices: default_fleet(),
            last_scan: Some(Utc::now()),
        };
        SnapshotStore::new(&path).save(&snapshot).await.expect("save");

        let controller = SyncController::new(
            ScriptedTransport::new(vec![], vec![]),
            Some(SnapshotStore::new(&path)),
        );
        controller.restore().await.expect("restore");
        assert_eq!(controller.devices().await.len(), 4);
        assert!(controller.last_scan().await.is_some());

        std::fs::remove_dir_all(root).expect("cleanup");
    }

    #[tokio::test]
    async fn reconciles_against_live_mock_registry() {
        let transport = Arc::new(MockRegistry::seeded(
            RegistryTuning::default(),
            Arc::new(ScriptedRandomness { roll: false }),
        ));
        let controller = SyncController::new(transport, None);
        controller.scan().await.expect("scan");

        let report = controller.toggle("device_001", true).await;
        assert!(report.succeeded());
        assert!(device(&controller, "device_001").await.is_on);

        let report = controller.toggle("device_003", true).await;
        assert!(!report.succeeded());
        assert_eq!(report.error.as_deref(), Some("Device is offline"));
        assert!(!device(&controller, "device_003").await.is_on);
    }
}
