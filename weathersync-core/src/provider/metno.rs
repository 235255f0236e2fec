//! MET Norway locationforecast 2.0.
//!
//! The API delivers an hourly (later six-hourly) series instead of daily
//! summaries, so the daily forecast is aggregated here: min/max temperature
//! per local calendar day and the most severe daytime symbol as condition.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Timelike, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::{
    condition::night_code,
    error::ProviderError,
    geo::SearchStyle,
    http::HttpClient,
    model::{Coordinates, CurrentConditions, DayForecast, WeatherLocation, WeatherSnapshot},
    provider::{ProviderContext, ProviderId, WeatherProvider},
    units::{celsius_in, date_string, parse_coordinates, wind_from_ms, yesterday},
};

pub const BASE_URL: &str = "https://api.met.no/weatherapi/locationforecast/2.0";
const USER_AGENT: &str = concat!("weathersync/", env!("CARGO_PKG_VERSION"), " locationforecast");

#[derive(Debug, Clone)]
pub struct MetNorwayProvider {
    ctx: ProviderContext,
    http: HttpClient,
    base_url: String,
}

impl MetNorwayProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        let http = HttpClient::with_user_agent(USER_AGENT)
            .accepting(&[StatusCode::OK, StatusCode::NON_AUTHORITATIVE_INFORMATION]);
        Self {
            ctx,
            http,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn coordinates_id(coords: Coordinates) -> String {
    format!("lat={:.6}&lon={:.6}", coords.latitude, coords.longitude)
}

#[derive(Debug, Deserialize)]
struct MetResponse {
    properties: MetProperties,
}

#[derive(Debug, Deserialize)]
struct MetProperties {
    timeseries: Vec<MetStep>,
}

#[derive(Debug, Deserialize)]
struct MetStep {
    time: DateTime<Utc>,
    data: MetData,
}

#[derive(Debug, Deserialize)]
struct MetData {
    instant: MetInstant,
    next_1_hours: Option<MetPeriod>,
    next_6_hours: Option<MetPeriod>,
}

#[derive(Debug, Deserialize)]
struct MetInstant {
    details: MetDetails,
}

#[derive(Debug, Deserialize)]
struct MetDetails {
    air_temperature: f64,
    #[serde(default)]
    relative_humidity: f64,
    #[serde(default)]
    wind_speed: f64,
    #[serde(default)]
    wind_from_direction: f64,
}

#[derive(Debug, Deserialize)]
struct MetPeriod {
    summary: MetSummary,
}

#[derive(Debug, Deserialize)]
struct MetSummary {
    symbol_code: String,
}

/// Severity rank of a symbol; the `_day`/`_night`/`_polartwilight` suffix is
/// ignored. Unknown symbols rank 0.
fn priority(symbol: &str) -> usize {
    let base = symbol.split('_').next().unwrap_or(symbol);
    match base {
        "clearsky" => 1,
        "fair" => 2,
        "partlycloudy" => 3,
        "cloudy" => 4,
        "rainshowers" => 5,
        "rainshowersandthunder" => 6,
        "sleetshowers" => 7,
        "snowshowers" => 8,
        "rain" => 9,
        "heavyrain" => 10,
        "heavyrainandthunder" => 11,
        "sleet" => 12,
        "snow" => 13,
        "snowandthunder" => 14,
        "fog" => 15,
        "sleetshowersandthunder" => 20,
        "snowshowersandthunder" => 21,
        "rainandthunder" => 22,
        "sleetandthunder" => 23,
        "lightrainshowersandthunder" => 24,
        "heavyrainshowersandthunder" => 25,
        "lightssleetshowersandthunder" => 26,
        "heavysleetshowersandthunder" => 27,
        "lightssnowshowersandthunder" => 28,
        "heavysnowshowersandthunder" => 29,
        "lightrainandthunder" => 30,
        "lightsleetandthunder" => 31,
        "heavysleetandthunder" => 32,
        "lightsnowandthunder" => 33,
        "heavysnowandthunder" => 34,
        "lightrainshowers" => 40,
        "heavyrainshowers" => 41,
        "lightsleetshowers" => 42,
        "heavysleetshowers" => 43,
        "lightsnowshowers" => 44,
        "heavysnowshowers" => 45,
        "lightrain" => 46,
        "lightsleet" => 47,
        "heavysleet" => 48,
        "lightsnow" => 49,
        "heavysnow" => 50,
        _ => 0,
    }
}

const RANK_TO_CODE: [i32; 51] = [
    -1, 32, 34, 30, 26, 40, 39, 6, 14, 11, 12, 4, 18, 16, 15, 20, -1, -1, -1, -1, 42, 42, 4, 6, 39,
    39, 42, 42, 42, 42, 4, 6, 6, 15, 15, -1, -1, -1, -1, -1, 40, 40, 6, 6, 14, 14, 9, 18, 18, 16,
    16,
];

fn rank_to_code(rank: usize) -> i32 {
    RANK_TO_CODE.get(rank).copied().unwrap_or(-1)
}

fn symbol_to_code(symbol: &str) -> i32 {
    let code = rank_to_code(priority(symbol));
    if symbol.ends_with("_night") {
        night_code(code)
    } else {
        code
    }
}

/// Daytime window used to pick a representative symbol. Six-hour periods
/// starting after 13:00 reach into the night.
fn is_morning_or_afternoon(hour: u32, hourly: bool) -> bool {
    if hourly {
        (6..=17).contains(&hour)
    } else {
        (6..=13).contains(&hour)
    }
}

#[derive(Debug, Default)]
struct DayAggregate {
    min: Option<f64>,
    max: Option<f64>,
    rank: usize,
    description: String,
    morning_rank: usize,
    afternoon_rank: usize,
    six_hour_description: String,
}

impl DayAggregate {
    /// Both six-hour daytime periods (06-12, 12-18) are known.
    fn has_six_hour_condition(&self) -> bool {
        self.morning_rank != 0 && self.afternoon_rank != 0
    }

    fn push(&mut self, hour: u32, step: &MetStep, whole_day: bool) {
        let t = step.data.instant.details.air_temperature;
        self.min = Some(self.min.map_or(t, |m| m.min(t)));
        self.max = Some(self.max.map_or(t, |m| m.max(t)));

        if self.has_six_hour_condition() {
            return;
        }

        let hourly = step.data.next_1_hours.as_ref();
        let six_hourly = step.data.next_6_hours.as_ref();
        if !(whole_day || is_morning_or_afternoon(hour, hourly.is_some())) {
            return;
        }

        let Some(period) = hourly.or(six_hourly) else {
            return;
        };
        let rank = priority(&period.summary.symbol_code);
        if rank > self.rank {
            self.rank = rank;
            self.description = period.summary.symbol_code.clone();
        }

        if let Some(six) = six_hourly {
            let six_rank = priority(&six.summary.symbol_code);
            if hour == 6 {
                self.morning_rank = six_rank;
                self.six_hour_description = six.summary.symbol_code.clone();
            } else if self.morning_rank != 0 && hour == 12 {
                self.afternoon_rank = six_rank;
                if self.morning_rank < self.afternoon_rank {
                    self.six_hour_description = six.summary.symbol_code.clone();
                }
            }
        }
    }

    fn finish(self, day: NaiveDate, metric: bool) -> DayForecast {
        let (Some(min), Some(max)) = (self.min, self.max) else {
            tracing::warn!(%day, "No MET Norway data for day, using placeholder");
            return DayForecast::dummy(metric);
        };

        let (rank, description) = if self.has_six_hour_condition() {
            (
                self.morning_rank.max(self.afternoon_rank),
                self.six_hour_description,
            )
        } else {
            (self.rank, self.description)
        };

        DayForecast {
            low: celsius_in(min, metric),
            high: celsius_in(max, metric),
            condition: description,
            condition_code: rank_to_code(rank),
            date: date_string(day),
            metric,
        }
    }
}

fn aggregate_forecast<Tz: TimeZone>(
    steps: &[MetStep],
    tz: &Tz,
    today: NaiveDate,
    metric: bool,
) -> Vec<DayForecast> {
    let local: Vec<(NaiveDate, u32)> = steps
        .iter()
        .map(|s| {
            let t = s.time.with_timezone(tz);
            (t.date_naive(), t.hour())
        })
        .collect();

    let yesterday = yesterday(today);
    let mut idx = local.iter().take_while(|(date, _)| *date == yesterday).count();
    // a series that starts late in the evening has no daytime steps left today
    let evening_start = idx == 0 && local.first().is_some_and(|(_, hour)| (18..=23).contains(hour));

    let mut days = Vec::with_capacity(5);
    for (offset, day) in today.iter_days().take(5).enumerate() {
        let mut agg = DayAggregate::default();
        while idx < steps.len() && local[idx].0 == day {
            agg.push(local[idx].1, &steps[idx], offset == 0 && evening_start);
            idx += 1;
        }
        days.push(agg.finish(day, metric));
    }
    days
}

fn parse_weather<Tz: TimeZone>(
    body: &str,
    location_id: &str,
    metric: bool,
    tz: &Tz,
    today: NaiveDate,
) -> Result<(CurrentConditions, Vec<DayForecast>), ProviderError> {
    let parsed: MetResponse = serde_json::from_str(body)?;
    let steps = parsed.properties.timeseries;

    let first = steps
        .first()
        .ok_or_else(|| ProviderError::Parse("empty timeseries".into()))?;
    let symbol = first
        .data
        .next_1_hours
        .as_ref()
        .or(first.data.next_6_hours.as_ref())
        .map(|p| p.summary.symbol_code.clone())
        .ok_or_else(|| ProviderError::Parse("first step has no symbol".into()))?;
    let details = &first.data.instant.details;

    let current = CurrentConditions {
        location_id: location_id.to_string(),
        city: String::new(),
        condition_code: symbol_to_code(&symbol),
        condition: symbol,
        temperature: celsius_in(details.air_temperature, metric),
        humidity: details.relative_humidity,
        wind_speed: wind_from_ms(details.wind_speed, metric),
        wind_direction: details.wind_from_direction as i32,
        metric,
    };

    let forecasts = aggregate_forecast(&steps, tz, today, metric);
    Ok((current, forecasts))
}

#[async_trait]
impl WeatherProvider for MetNorwayProvider {
    fn id(&self) -> ProviderId {
        ProviderId::MetNorway
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
        self.ctx
            .geonames()
            .search(
                query,
                self.ctx.locale.language(),
                SearchStyle::NameRequired,
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
        let url = format!("{}/?{id}", self.base_url);
        let body = self.http.retrieve(&url).await?;

        let today = Local::now().date_naive();
        let (mut current, forecasts) = parse_weather(&body, id, metric, &Local, today)?;
        current.city = self
            .ctx
            .city_name(parse_coordinates(id), self.ctx.locale.language())
            .await;

        Ok(WeatherSnapshot::new(current, forecasts, Utc::now()))
    }
}
