// config/mod.rs
use config::Config;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct Settings {
    pub server: ServerSettings,
    pub metrics: MetricsSettings,
    #[validate(nested)]
    pub registry: RegistrySettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegistrySettings {
    #[validate(range(min = 0.0, max = 1.0))]
    pub control_failure_rate: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub reconnect_probability: f64,
}

#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    pub snapshot_path: String,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .set_default("server.address", "0.0.0.0:3000")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.port", 9100_i64)?
            .set_default("registry.control_failure_rate", 0.05)?
            .set_default("registry.reconnect_probability", 0.3)?
            .set_default("storage.snapshot_path", "data/devices.json")?
            .add_source(config::File::with_name("config/config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let settings: Settings = settings.try_deserialize()?;
        settings
            .validate()
            .map_err(|errors| config::ConfigError::Message(errors.to_string()))?;
        Ok(settings)
    }
}
