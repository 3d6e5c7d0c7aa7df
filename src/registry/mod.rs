// registry/mod.rs
mod mock;
pub use mock::{MockRegistry, RegistryTuning, default_fleet};

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::error::TransportError;
use crate::models::{ControlRequest, ControlResponse, Device, DiscoveryResult};

/// Control-channel seam. The mock fleet implements this today; a real
/// transport implements the same contract without touching the controller.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn discover(&self) -> Result<DiscoveryResult, TransportError>;
    async fn control(&self, request: ControlRequest) -> Result<ControlResponse, TransportError>;
    async fn status(&self, device_id: &str) -> Result<Option<Device>, TransportError>;
    /// Simulation hook; no-op on unknown ids.
    async fn force_offline(&self, device_id: &str);
    /// Simulation hook; refreshes `last_seen`, no-op on unknown ids.
    async fn force_online(&self, device_id: &str);
}

/// Source of the randomized latency and failure draws, injectable so tests
/// can force either side of a branch.
pub trait Randomness: Send + Sync {
    fn roll(&self, probability: f64) -> bool;
    fn latency(&self, min_ms: u64, max_ms: u64) -> Duration;
}

pub struct ThreadRandomness;

impl Randomness for ThreadRandomness {
    fn roll(&self, probability: f64) -> bool {
        rand::thread_rng().gen_bool(probability.clamp(0.0, 1.0))
    }

    fn latency(&self, min_ms: u64, max_ms: u64) -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }
}
