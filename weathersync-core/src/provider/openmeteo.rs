//! Open-Meteo forecast API.
//!
//! Two models are requested side by side: `best_match` for values and
//! `gfs_seamless` as a second opinion whenever the primary model reports
//! fog, which it does far too eagerly. Current humidity is not part of
//! `current_weather` and is looked up in the hourly series instead.
//!
//! Series times are in the zone the response reports through
//! `utc_offset_seconds`, so "now" and "today" are taken in that zone too.
//! With `timezone=auto` that is the location's zone, not the device's.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::{
    error::ProviderError,
    geo::SearchStyle,
    model::{Coordinates, CurrentConditions, DayForecast, WeatherLocation, WeatherSnapshot},
    provider::{ProviderContext, ProviderId, WeatherProvider},
    units::{date_string, parse_coordinates},
};

pub const BASE_URL: &str = "https://api.open-meteo.com";

/// Hourly index used when the current hour is not in the series; with
/// `past_days=1` this is around noon today.
const FALLBACK_HOUR_INDEX: usize = 36;

#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    ctx: ProviderContext,
    base_url: String,
}

impl OpenMeteoProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self {
            ctx,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn weather_url(&self, coordinates: &str, metric: bool) -> String {
        format!(
            "{}/v1/forecast?{coordinates}&hourly=relativehumidity_2m\
             &daily=weathercode,temperature_2m_max,temperature_2m_min&current_weather=true\
             &temperature_unit={}&windspeed_unit={}&timezone={}&past_days=1\
             &models=best_match,gfs_seamless",
            self.base_url,
            if metric { "celsius" } else { "fahrenheit" },
            if metric { "kmh" } else { "mph" },
            self.ctx.timezone,
        )
    }
}

fn coordinates_id(coords: Coordinates) -> String {
    format!("latitude={:.6}&longitude={:.6}", coords.latitude, coords.longitude)
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    current_weather: OmCurrent,
    hourly: OmHourly,
    daily: OmDaily,
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    temperature: f64,
    windspeed: f64,
    #[serde(default)]
    winddirection: f64,
    weathercode: i32,
    is_day: u8,
}

#[derive(Debug, Deserialize)]
struct OmHourly {
    time: Vec<String>,
    relativehumidity_2m_best_match: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct OmDaily {
    time: Vec<String>,
    temperature_2m_min_best_match: Vec<Option<f64>>,
    temperature_2m_max_best_match: Vec<Option<f64>>,
    weathercode_best_match: Vec<Option<i32>>,
    #[serde(default)]
    weathercode_gfs_seamless: Vec<Option<i32>>,
}

fn description(code: i32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light intensity drizzle",
        53 => "Moderate intensity drizzle",
        55 => "Dense intensity drizzle",
        56 => "Light intensity freezing drizzle",
        57 => "Dense intensity freezing drizzle",
        61 => "Slight intensity rain",
        63 => "Moderate intensity rain",
        65 => "Heavy intensity rain",
        66 => "Light intensity freezing rain",
        67 => "Heavy intensity freezing rain",
        71 => "Slight intensity snowfall",
        73 => "Moderate intensity snowfall",
        75 => "Heavy intensity snowfall",
        77 => "Snow grains",
        80 => "Slight intensity rain showers",
        81 => "Moderate intensity rain showers",
        82 => "Violent intensity rain showers",
        85 => "Slight intensity snow showers",
        86 => "Heavy intensity snow showers",
        95 => "Slight or moderate thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

/// WMO weather interpretation code to the shared table.
fn wmo_to_code(code: i32, is_day: bool) -> i32 {
    match code {
        0 => if is_day { 32 } else { 31 },
        1 => if is_day { 34 } else { 33 },
        2 => if is_day { 30 } else { 29 },
        3 => 26,
        45 | 48 => 20,
        51 | 53 | 61 => 9,
        55 | 65 => 12,
        56 | 57 => 8,
        63 | 80 => 11,
        66 | 67 => 10,
        71 | 85 => 14,
        73 | 77 => 16,
        75 | 86 => 43,
        81 | 82 => 40,
        95 => 4,
        96 | 99 => 38,
        _ => -1,
    }
}

fn current_humidity(hourly: &OmHourly, now: NaiveDateTime) -> f64 {
    let hour = now.format("%Y-%m-%dT%H").to_string();
    let idx = hourly
        .time
        .iter()
        .position(|t| t.starts_with(&hour))
        .unwrap_or(FALLBACK_HOUR_INDEX);

    hourly
        .relativehumidity_2m_best_match
        .get(idx)
        .copied()
        .flatten()
        .unwrap_or_else(|| {
            tracing::warn!(%hour, "No hourly humidity for current hour");
            0.0
        })
}

fn parse_forecast(daily: &OmDaily, metric: bool, today: NaiveDate) -> Vec<DayForecast> {
    let today = date_string(today);
    // past_days=1 puts yesterday first; guard against time zone skew
    let start = if daily.time.first() == Some(&today) {
        0
    } else if daily.time.get(2) == Some(&today) {
        2
    } else {
        1
    };

    (start..daily.time.len())
        .take(5)
        .map(|i| {
            let day = || -> Option<DayForecast> {
                let mut code = daily.weathercode_best_match.get(i).copied().flatten()?;
                if code == 45 || code == 48 {
                    code = daily
                        .weathercode_gfs_seamless
                        .get(i)
                        .copied()
                        .flatten()
                        .unwrap_or(code);
                }
                Some(DayForecast {
                    low: daily.temperature_2m_min_best_match.get(i).copied().flatten()?,
                    high: daily.temperature_2m_max_best_match.get(i).copied().flatten()?,
                    condition: description(code).to_string(),
                    condition_code: wmo_to_code(code, true),
                    date: daily.time[i].clone(),
                    metric,
                })
            };
            day().unwrap_or_else(|| {
                tracing::warn!(day = i, "Invalid forecast day, using placeholder");
                DayForecast::dummy(metric)
            })
        })
        .collect()
}

/// `now` as wall-clock time in the response's zone.
fn series_time(now: DateTime<Utc>, offset_seconds: i32) -> NaiveDateTime {
    match FixedOffset::east_opt(offset_seconds) {
        Some(offset) => now.with_timezone(&offset).naive_local(),
        None => {
            tracing::warn!(offset_seconds, "Invalid UTC offset, using UTC");
            now.naive_utc()
        }
    }
}

fn parse_weather(
    body: &str,
    location_id: &str,
    metric: bool,
    now: DateTime<Utc>,
) -> Result<(CurrentConditions, Vec<DayForecast>), ProviderError> {
    let parsed: OmResponse = serde_json::from_str(body)?;
    if parsed.daily.time.is_empty() {
        return Err(ProviderError::Parse("forecast contains no days".into()));
    }
    let now = series_time(now, parsed.utc_offset_seconds);
    let cw = &parsed.current_weather;

    let current = CurrentConditions {
        location_id: location_id.to_string(),
        city: String::new(),
        condition: description(cw.weathercode).to_string(),
        condition_code: wmo_to_code(cw.weathercode, cw.is_day == 1),
        temperature: cw.temperature,
        humidity: current_humidity(&parsed.hourly, now),
        wind_speed: cw.windspeed,
        wind_direction: cw.winddirection.round() as i32,
        metric,
    };

    let forecasts = parse_forecast(&parsed.daily, metric, now.date());
    Ok((current, forecasts))
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
        self.ctx
            .geonames()
            .search(
                query,
                self.ctx.locale.language(),
                SearchStyle::NameRequiredFirst,
                coordinates_id,
            )
            .await
    }

    async fn weather_by_coordinates(
        &self,
        coords: Coordinates,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError> {
        self.weather_by_location_id(&coordinates_id(coords), metric)
            .await
    }

    async fn weather_by_location_id(
        &self,
        id: &str,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError> {
        let body = self.ctx.http.retrieve(&self.weather_url(id, metric)).await?;

        let (mut current, forecasts) =
            parse_weather(&body, id, metric, Utc::now())?;
        current.city = self
            .ctx
            .city_name(parse_coordinates(id), self.ctx.locale.language())
            .await;

        Ok(WeatherSnapshot::new(current, forecasts, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc(day: u32, hour: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, 25, 0)
            .unwrap()
            .and_utc()
    }

    fn now() -> DateTime<Utc> {
        utc(10, 14)
    }

    fn body(times: &[&str], is_day: u8) -> String {
        body_with_offset(times, is_day, 0)
    }

    fn body_with_offset(times: &[&str], is_day: u8, offset_seconds: i32) -> String {
        let n = times.len();
        let codes: Vec<i32> = [3, 45, 63, 48, 95, 0, 0].into_iter().take(n).collect();
        let alt: Vec<Option<i32>> = [Some(3), Some(2), Some(63), None, Some(95), Some(0), Some(0)]
            .into_iter()
            .take(n)
            .collect();
        json!({
            "utc_offset_seconds": offset_seconds,
            "current_weather": {
                "temperature": 18.3,
                "windspeed": 11.2,
                "winddirection": 310.0,
                "weathercode": 1,
                "is_day": is_day
            },
            "hourly": {
                "time": ["2024-06-10T13:00", "2024-06-10T14:00", "2024-06-10T15:00"],
                "relativehumidity_2m_best_match": [60, 55, null]
            },
            "daily": {
                "time": times,
                "temperature_2m_min_best_match": vec![9.5; n],
                "temperature_2m_max_best_match": vec![21.0; n],
                "weathercode_best_match": codes,
                "weathercode_gfs_seamless": alt
            }
        })
        .to_string()
    }

    const WEEK: [&str; 7] = [
        "2024-06-09", "2024-06-10", "2024-06-11", "2024-06-12", "2024-06-13", "2024-06-14",
        "2024-06-15",
    ];

    #[test]
    fn current_reads_humidity_for_current_hour() {
        let (current, _) = parse_weather(&body(&WEEK, 1), "id", true, now()).unwrap();

        assert_eq!(current.humidity, 55.0);
        assert_eq!(current.condition_code, 34);
        assert_eq!(current.condition, "Mainly clear");
        assert_eq!(current.wind_direction, 310);
    }

    #[test]
    fn night_flag_selects_night_codes() {
        let (current, _) = parse_weather(&body(&WEEK, 0), "id", true, now()).unwrap();
        assert_eq!(current.condition_code, 33);
    }

    #[test]
    fn forecast_starts_today_and_replaces_fog() {
        let (_, days) = parse_weather(&body(&WEEK, 1), "id", true, now()).unwrap();

        assert_eq!(days[0].date, "2024-06-10");
        // fog replaced by the secondary model's partly cloudy
        assert_eq!(days[0].condition_code, 30);
        assert_eq!(days[1].condition_code, 11);
        // no secondary value keeps the fog
        assert_eq!(days[2].condition_code, 20);
        assert_eq!(days[3].condition_code, 4);
    }

    #[test]
    fn series_starting_today_is_used_from_index_zero() {
        let (_, days) = parse_weather(&body(&WEEK[1..], 1), "id", true, now()).unwrap();
        assert_eq!(days[0].date, "2024-06-10");
        assert_eq!(days[0].condition_code, 26);
    }

    #[test]
    fn wmo_mapping_spot_checks() {
        assert_eq!(wmo_to_code(56, true), 8);
        assert_eq!(wmo_to_code(75, true), 43);
        assert_eq!(wmo_to_code(99, false), 38);
        assert_eq!(wmo_to_code(42, true), -1);
        assert_eq!(description(42), "Unknown");
    }

    #[test]
    fn hourly_series_is_read_in_the_location_zone() {
        // 05:25 UTC is 14:25 in a UTC+9 series
        let (current, _) =
            parse_weather(&body_with_offset(&WEEK, 1, 9 * 3600), "id", true, utc(10, 5)).unwrap();
        assert_eq!(current.humidity, 55.0);
    }

    #[test]
    fn today_follows_the_location_zone_across_midnight() {
        // 20:25 UTC on the 9th is already the 10th at UTC+9
        let (_, ahead) =
            parse_weather(&body_with_offset(&WEEK, 1, 9 * 3600), "id", true, utc(9, 20)).unwrap();
        assert_eq!(ahead[0].date, "2024-06-10");

        let (_, utc_days) = parse_weather(&body(&WEEK, 1), "id", true, utc(9, 20)).unwrap();
        assert_eq!(utc_days[0].date, "2024-06-09");
    }
}
