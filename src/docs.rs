use utoipa::OpenApi;

use crate::{handlers, models};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_devices,
        handlers::scan_devices,
        handlers::set_device_power,
        handlers::device_status,
        handlers::simulate_presence,
    ),
    components(schemas(
        models::Device,
        models::DeviceKind,
        models::ControlAction,
        models::ControlRequest,
        models::ControlResponse,
        models::DiscoveryResult,
        handlers::DeviceListResponse,
        handlers::FleetSummary,
        handlers::SetPowerRequest,
        handlers::SetPowerResponse,
        handlers::SimulatePresenceRequest,
    ))
)]
pub struct ApiDoc;
