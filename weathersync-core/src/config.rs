use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    model::{Coordinates, WeatherLocation},
    provider::ProviderId,
};

pub const DEFAULT_UPDATE_INTERVAL_HOURS: u32 = 2;

/// Configuration shared between the worker and readers; each cycle works on
/// a copy taken at its start.
pub type SharedConfig = Arc<RwLock<Config>>;

/// API keys for a single provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// Where device coordinates come from when no custom location is pinned.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DeviceLocation {
    /// Location access is not permitted.
    #[default]
    Disabled,
    /// Approximate location from IP geolocation.
    Ip,
    Fixed { latitude: f64, longitude: f64 },
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub enabled: bool,

    /// Provider name or numeric selection value, e.g. "metno" or "3".
    pub provider: Option<String>,

    #[serde(default = "default_metric")]
    pub metric: bool,

    #[serde(default)]
    pub custom_location: bool,
    pub location_id: Option<String>,
    pub location_name: Option<String>,

    #[serde(default = "default_interval")]
    pub update_interval_hours: u32,

    /// Locale tag such as "de-DE"; the environment is consulted when unset.
    pub locale: Option<String>,

    /// IANA time zone for APIs that take one.
    pub timezone: Option<String>,

    #[serde(default)]
    pub device_location: DeviceLocation,

    /// Example TOML:
    /// [providers.openweathermap]
    /// api_keys = ["...", "..."]
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_metric() -> bool {
    true
}

fn default_interval() -> u32 {
    DEFAULT_UPDATE_INTERVAL_HOURS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            metric: true,
            custom_location: false,
            location_id: None,
            location_name: None,
            update_interval_hours: DEFAULT_UPDATE_INTERVAL_HOURS,
            locale: None,
            timezone: None,
            device_location: DeviceLocation::default(),
            providers: HashMap::new(),
        }
    }
}

impl Config {
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }

    /// Selected provider; unrecognized values select OpenWeatherMap.
    pub fn provider_id(&self) -> ProviderId {
        ProviderId::from_config_value(self.provider.as_deref())
    }

    pub fn set_provider(&mut self, id: ProviderId) {
        self.provider = Some(id.as_str().to_string());
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Pinned location id, when custom-location mode is on and an id is set.
    pub fn custom_location_id(&self) -> Option<&str> {
        if !self.custom_location {
            return None;
        }
        self.location_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    pub fn set_custom_location(&mut self, location: &WeatherLocation) {
        self.custom_location = true;
        self.location_id = Some(location.id.clone());
        self.location_name = Some(location.city.clone());
    }

    pub fn clear_custom_location(&mut self) {
        self.custom_location = false;
        self.location_id = None;
        self.location_name = None;
    }

    pub fn fixed_coordinates(&self) -> Option<Coordinates> {
        match self.device_location {
            DeviceLocation::Fixed {
                latitude,
                longitude,
            } => Some(Coordinates::new(latitude, longitude)),
            _ => None,
        }
    }

    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "weathersync", "weathersync")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Add an API key for a provider (keeping existing keys for rotation)
    /// and select the provider if none is selected yet.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        let entry = self.providers.entry(provider_id.as_str().to_string()).or_default();
        if !entry.api_keys.contains(&api_key) {
            entry.api_keys.push(api_key);
        }

        if self.provider.is_none() {
            self.set_provider(provider_id);
        }
    }

    pub fn provider_api_keys(&self, provider_id: ProviderId) -> &[String] {
        self.provider_config(provider_id)
            .map(|cfg| cfg.api_keys.as_slice())
            .unwrap_or_default()
    }

    /// True when the provider needs no key or has at least one.
    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        !provider_id.requires_api_key() || !self.provider_api_keys(provider_id).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_metric_with_two_hour_interval() {
        let cfg = Config::default();
        assert!(cfg.metric);
        assert!(!cfg.enabled);
        assert_eq!(cfg.update_interval_hours, 2);
        assert_eq!(cfg.provider_id(), ProviderId::OpenWeatherMap);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: Config = toml::from_str("provider = \"3\"\nenabled = true\n").unwrap();
        assert!(cfg.metric);
        assert_eq!(cfg.update_interval_hours, 2);
        assert_eq!(cfg.provider_id(), ProviderId::MetNorway);
        assert_eq!(cfg.device_location, DeviceLocation::Disabled);
    }

    #[test]
    fn set_api_key_and_default_for_provider() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::OpenWeatherMap, "OPEN_KEY".into());

        assert_eq!(cfg.provider.as_deref(), Some("openweathermap"));
        assert_eq!(cfg.provider_api_keys(ProviderId::OpenWeatherMap), ["OPEN_KEY"]);
        assert!(cfg.is_provider_configured(ProviderId::OpenWeatherMap));
    }

    #[test]
    fn upsert_appends_keys_and_keeps_selection() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::OpenWeatherMap, "A".into());
        cfg.upsert_provider_api_key(ProviderId::OpenWeatherMap, "B".into());
        cfg.upsert_provider_api_key(ProviderId::OpenWeatherMap, "A".into());
        cfg.upsert_provider_api_key(ProviderId::Weatherbit, "W".into());

        assert_eq!(cfg.provider_id(), ProviderId::OpenWeatherMap);
        assert_eq!(cfg.provider_api_keys(ProviderId::OpenWeatherMap), ["A", "B"]);
        assert!(cfg.is_provider_configured(ProviderId::Weatherbit));
    }

    #[test]
    fn keyless_providers_count_as_configured() {
        let cfg = Config::default();
        assert!(cfg.is_provider_configured(ProviderId::MetNorway));
        assert!(!cfg.is_provider_configured(ProviderId::AccuWeather));
    }

    #[test]
    fn custom_location_requires_flag_and_id() {
        let mut cfg = Config::default();
        assert_eq!(cfg.custom_location_id(), None);

        cfg.set_custom_location(&WeatherLocation::new("12345", "Oslo", "Norway"));
        assert_eq!(cfg.custom_location_id(), Some("12345"));
        assert_eq!(cfg.location_name.as_deref(), Some("Oslo"));

        cfg.location_id = Some("  ".into());
        assert_eq!(cfg.custom_location_id(), None);

        cfg.clear_custom_location();
        assert!(!cfg.custom_location);
    }

    #[test]
    fn save_and_load_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.enabled = true;
        cfg.metric = false;
        cfg.device_location = DeviceLocation::Fixed {
            latitude: 59.91,
            longitude: 10.75,
        };
        cfg.upsert_provider_api_key(ProviderId::AccuWeather, "KEY".into());
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.enabled);
        assert!(!loaded.metric);
        assert_eq!(loaded.fixed_coordinates(), Some(Coordinates::new(59.91, 10.75)));
        assert_eq!(loaded.provider_api_keys(ProviderId::AccuWeather), ["KEY"]);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert!(!cfg.enabled);
    }
}
