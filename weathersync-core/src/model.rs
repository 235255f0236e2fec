use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::condition::{NOT_AVAILABLE, normalize_code};

/// Number of forecast days every snapshot carries.
pub const FORECAST_DAYS: usize = 5;

/// Label used when no locality name can be resolved.
pub const UNKNOWN_CITY: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayForecast {
    pub low: f64,
    pub high: f64,
    pub condition: String,
    pub condition_code: i32,
    pub date: String,
    pub metric: bool,
}

impl DayForecast {
    /// Placeholder for a day the upstream API did not deliver.
    pub fn dummy(metric: bool) -> Self {
        Self {
            low: 0.0,
            high: 0.0,
            condition: String::new(),
            condition_code: NOT_AVAILABLE,
            date: "NaN".to_string(),
            metric,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.condition_code == NOT_AVAILABLE && self.date == "NaN"
    }
}

/// Current conditions as parsed by an adapter, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub location_id: String,
    pub city: String,
    pub condition: String,
    pub condition_code: i32,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_direction: i32,
    pub metric: bool,
}

/// One complete normalized weather result.
///
/// Constructed only through [`WeatherSnapshot::new`], which enforces the
/// fixed forecast length and the condition-code range. Fields are read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    location_id: String,
    city: String,
    condition: String,
    condition_code: i32,
    temperature: f64,
    humidity: f64,
    wind_speed: f64,
    wind_direction: i32,
    metric: bool,
    forecasts: Vec<DayForecast>,
    timestamp: DateTime<Utc>,
}

impl WeatherSnapshot {
    pub fn new(
        current: CurrentConditions,
        forecasts: Vec<DayForecast>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let metric = current.metric;
        let mut forecasts: Vec<DayForecast> = forecasts
            .into_iter()
            .take(FORECAST_DAYS)
            .map(|mut day| {
                day.condition_code = normalize_code(day.condition_code);
                day.metric = metric;
                day
            })
            .collect();
        forecasts.resize_with(FORECAST_DAYS, || DayForecast::dummy(metric));

        let city = if current.city.trim().is_empty() {
            UNKNOWN_CITY.to_string()
        } else {
            current.city
        };

        Self {
            location_id: current.location_id,
            city,
            condition: current.condition,
            condition_code: normalize_code(current.condition_code),
            temperature: current.temperature,
            humidity: current.humidity.clamp(0.0, 100.0),
            wind_speed: current.wind_speed,
            wind_direction: current.wind_direction.clamp(0, 360),
            metric,
            forecasts,
            timestamp,
        }
    }

    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn condition_code(&self) -> i32 {
        self.condition_code
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn humidity(&self) -> f64 {
        self.humidity
    }

    pub fn wind_speed(&self) -> f64 {
        self.wind_speed
    }

    pub fn wind_direction(&self) -> i32 {
        self.wind_direction
    }

    pub fn is_metric(&self) -> bool {
        self.metric
    }

    pub fn forecasts(&self) -> &[DayForecast] {
        &self.forecasts
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// A candidate returned by location search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherLocation {
    pub id: String,
    pub city: String,
    pub country_id: String,
    pub postal: Option<String>,
    pub country: Option<String>,
}

impl WeatherLocation {
    pub fn new(id: impl Into<String>, city: impl Into<String>, country_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            city: city.into(),
            country_id: country_id.into(),
            postal: None,
            country: None,
        }
    }
}

/// Country label for a search result: the country alone when the city and
/// its administrative area share a name, otherwise `"country, area"`.
pub fn country_label(country: &str, area: &str, city: &str) -> String {
    if area.is_empty() || area == city {
        country.to_string()
    } else {
        format!("{country}, {area}")
    }
}

/// Display labels for a list of search results.
///
/// The country is appended when results span more than one country, and the
/// postal code is prefixed when one city name repeats within a country.
pub fn disambiguation_labels(locations: &[WeatherLocation]) -> Vec<String> {
    let need_country = locations
        .first()
        .is_some_and(|first| locations.iter().any(|l| l.country_id != first.country_id));

    locations
        .iter()
        .enumerate()
        .map(|(idx, loc)| {
            let need_postal = loc.postal.is_some()
                && locations.iter().enumerate().any(|(other, l)| {
                    other != idx && l.city == loc.city && l.country_id == loc.country_id
                });

            let mut label = String::new();
            if need_postal {
                if let Some(postal) = &loc.postal {
                    label.push_str(postal);
                    label.push(' ');
                }
            }
            label.push_str(&loc.city);
            if need_country {
                let country = loc.country.as_deref().unwrap_or(&loc.country_id);
                label.push_str(&format!(" ({country})"));
            }
            label
        })
        .collect()
}
