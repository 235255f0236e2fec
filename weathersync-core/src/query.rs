//! Read-only view of the stored weather and settings for display.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    config::{DeviceLocation, SharedConfig},
    error::ErrorKind,
    model::WeatherSnapshot,
    store::SnapshotStore,
};

/// Whole-number display value. NaN renders as `-` and negative zero as `0`.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "-".to_string();
    }
    let formatted = format!("{value:.0}");
    if formatted == "-0" {
        "0".to_string()
    } else {
        formatted
    }
}

pub fn temperature_unit(metric: bool) -> &'static str {
    if metric { "°C" } else { "°F" }
}

pub fn speed_unit(metric: bool) -> &'static str {
    if metric { "km/h" } else { "mph" }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastView {
    pub date: String,
    pub low: String,
    pub high: String,
    pub condition: String,
    pub condition_code: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherView {
    pub location_id: String,
    pub city: String,
    pub condition: String,
    pub condition_code: i32,
    pub temperature: String,
    pub humidity: String,
    pub wind_speed: String,
    pub wind_direction: String,
    pub temperature_unit: &'static str,
    pub speed_unit: &'static str,
    pub timestamp: DateTime<Utc>,
    pub forecasts: Vec<ForecastView>,
}

impl From<&WeatherSnapshot> for WeatherView {
    fn from(snap: &WeatherSnapshot) -> Self {
        let metric = snap.is_metric();
        Self {
            location_id: snap.location_id().to_string(),
            city: snap.city().to_string(),
            condition: snap.condition().to_string(),
            condition_code: snap.condition_code(),
            temperature: format_value(snap.temperature()),
            humidity: format!("{}%", format_value(snap.humidity())),
            wind_speed: format_value(snap.wind_speed()),
            wind_direction: format!("{}°", snap.wind_direction()),
            temperature_unit: temperature_unit(metric),
            speed_unit: speed_unit(metric),
            timestamp: snap.timestamp(),
            forecasts: snap
                .forecasts()
                .iter()
                .map(|day| ForecastView {
                    date: day.date.clone(),
                    low: format_value(day.low),
                    high: format_value(day.high),
                    condition: day.condition.clone(),
                    condition_code: day.condition_code,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsSummary {
    pub enabled: bool,
    pub provider: &'static str,
    pub interval_hours: u32,
    pub metric: bool,
    /// Custom location name, or empty when the device location is used.
    pub location: String,
    pub setup_complete: bool,
    pub last_error: Option<ErrorKind>,
}

#[derive(Clone)]
pub struct WeatherQuery {
    config: SharedConfig,
    store: Arc<dyn SnapshotStore>,
}

impl WeatherQuery {
    pub fn new(config: SharedConfig, store: Arc<dyn SnapshotStore>) -> Self {
        Self { config, store }
    }

    /// Current weather, or `None` when disabled or nothing was fetched yet.
    pub fn weather(&self) -> Option<WeatherView> {
        if !self.config.read().enabled {
            return None;
        }
        self.snapshot().as_ref().map(WeatherView::from)
    }

    pub fn settings(&self) -> SettingsSummary {
        let config = self.config.read();
        let location = if config.custom_location {
            config.location_name.clone().unwrap_or_default()
        } else {
            String::new()
        };
        let location_ready =
            config.custom_location || config.device_location != DeviceLocation::Disabled;

        SettingsSummary {
            enabled: config.enabled,
            provider: config.provider_id().display_name(),
            interval_hours: config.update_interval_hours,
            metric: config.metric,
            location,
            setup_complete: location_ready || self.snapshot().is_some(),
            last_error: self.store.status().last_error,
        }
    }

    fn snapshot(&self) -> Option<WeatherSnapshot> {
        self.store.load().unwrap_or_else(|e| {
            tracing::warn!("Failed to read stored weather: {:#}", e);
            None
        })
    }
}
