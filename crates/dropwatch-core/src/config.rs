use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::readiness::ReadinessSettings;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_watch_path")]
    pub watch_path: PathBuf,
    /// Root of the date-partitioned tree. Falls back to `watch_path`.
    #[serde(default)]
    pub processed_path: Option<PathBuf>,
    #[serde(default = "default_activity_map_path")]
    pub activity_map_path: PathBuf,
    #[serde(default = "default_material_map_path")]
    pub material_map_path: PathBuf,
    #[serde(default = "default_min_file_size")]
    pub min_file_size: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_stability_interval_secs")]
    pub stability_interval_secs: u64,
    #[serde(default = "default_stability_tolerance")]
    pub stability_tolerance: f64,
    #[serde(default = "default_small_file_retry_secs")]
    pub small_file_retry_secs: u64,
    #[serde(default = "default_invalid_file_grace_secs")]
    pub invalid_file_grace_secs: u64,
    #[serde(default = "default_native_alerts")]
    pub native_alerts: bool,
}

fn default_watch_path() -> PathBuf {
    PathBuf::from("/volume1/Produksi TVRI")
}

fn default_activity_map_path() -> PathBuf {
    PathBuf::from("kegiatan_map.json")
}

fn default_material_map_path() -> PathBuf {
    PathBuf::from("bahanpustaka_map.json")
}

fn default_min_file_size() -> u64 {
    5 * MIB
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_stability_interval_secs() -> u64 {
    3
}

fn default_stability_tolerance() -> f64 {
    0.01
}

fn default_small_file_retry_secs() -> u64 {
    30
}

fn default_invalid_file_grace_secs() -> u64 {
    2
}

fn default_native_alerts() -> bool {
    true
}

/// Reads `Config.toml` (optional) and `DROPWATCH_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("DROPWATCH").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

impl AppConfig {
    pub fn processed_root(&self) -> PathBuf {
        self.processed_path
            .clone()
            .unwrap_or_else(|| self.watch_path.clone())
    }

    pub fn invalid_file_grace(&self) -> Duration {
        Duration::from_secs(self.invalid_file_grace_secs)
    }

    pub fn readiness_settings(&self) -> ReadinessSettings {
        ReadinessSettings {
            min_file_size: self.min_file_size,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            stability_interval: Duration::from_secs(self.stability_interval_secs),
            stability_tolerance: self.stability_tolerance,
            small_file_retry: Duration::from_secs(self.small_file_retry_secs),
        }
    }
}
