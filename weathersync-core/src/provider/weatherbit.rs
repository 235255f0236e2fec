use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};
use serde::Deserialize;

use crate::{
    condition::night_code,
    error::ProviderError,
    geo::SearchStyle,
    model::{Coordinates, CurrentConditions, DayForecast, WeatherLocation, WeatherSnapshot},
    provider::{ApiKeys, ProviderContext, ProviderId, WeatherProvider, day_or_dummy},
    units::{is_yesterday, parse_coordinates},
};

pub const BASE_URL: &str = "https://api.weatherbit.io";

#[derive(Debug, Clone)]
pub struct WeatherbitProvider {
    ctx: ProviderContext,
    keys: ApiKeys,
    base_url: String,
}

impl WeatherbitProvider {
    pub fn new(ctx: ProviderContext, keys: ApiKeys) -> Self {
        Self {
            ctx,
            keys,
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
struct WbResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct WbCurrent {
    #[serde(default)]
    city_name: String,
    temp: f64,
    rh: f64,
    wind_spd: f64,
    #[serde(default)]
    wind_dir: i32,
    weather: WbWeather,
}

#[derive(Debug, Deserialize)]
struct WbWeather {
    icon: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct WbDay {
    valid_date: String,
    datetime: String,
    min_temp: f64,
    max_temp: f64,
    weather: WbWeather,
}

/// Icons look like `c02d`/`c02n`; the last character is the day/night flag.
fn icon_to_code(icon: &str) -> i32 {
    let base = icon.get(..icon.len().saturating_sub(1)).unwrap_or_default();
    match base {
        "t01" | "t02" | "t03" => 4,
        "t04" | "t05" => 3,
        "d01" | "d02" | "d03" => 9,
        "r01" => 11,
        "r02" | "r03" => 12,
        "f01" => 10,
        "r04" | "r05" | "r06" => 40,
        "s01" => 14,
        "s02" => 16,
        "s03" => 43,
        "s04" => 5,
        "s05" => 18,
        "s06" => 13,
        "a01" | "a05" | "a06" => 20,
        "a02" => 22,
        "a03" => 21,
        "a04" => 19,
        "c01" => 32,
        "c02" => 30,
        "c03" => 28,
        "c04" => 26,
        _ => -1,
    }
}

fn current_code(icon: &str) -> i32 {
    let code = icon_to_code(icon);
    if icon.ends_with('n') { night_code(code) } else { code }
}

fn parse_current(body: &str, location_id: &str, metric: bool) -> Result<CurrentConditions, ProviderError> {
    let parsed: WbResponse<WbCurrent> = serde_json::from_str(body)?;
    let current = parsed
        .data
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Parse("current response has no data".into()))?;

    Ok(CurrentConditions {
        location_id: location_id.to_string(),
        city: current.city_name,
        condition_code: current_code(&current.weather.icon),
        condition: current.weather.description,
        temperature: current.temp,
        humidity: current.rh,
        // m/s in metric, mph in imperial
        wind_speed: if metric { current.wind_spd * 3.6 } else { current.wind_spd },
        wind_direction: current.wind_dir,
        metric,
    })
}

fn parse_forecast(body: &str, metric: bool, today: NaiveDate) -> Result<Vec<DayForecast>, ProviderError> {
    let parsed: WbResponse<serde_json::Value> = serde_json::from_str(body)?;
    if parsed.data.is_empty() {
        return Err(ProviderError::Parse("forecast contains no days".into()));
    }

    let skip = parsed
        .data
        .first()
        .and_then(|d| d.get("valid_date"))
        .and_then(|d| d.as_str())
        .is_some_and(|d| is_yesterday(d, today));

    let days = parsed
        .data
        .iter()
        .skip(usize::from(skip))
        .take(5)
        .map(|value| {
            day_or_dummy::<WbDay, _>(value, metric, |day| {
                Some(DayForecast {
                    low: day.min_temp.round(),
                    high: day.max_temp.round(),
                    condition_code: icon_to_code(&day.weather.icon),
                    condition: day.weather.description,
                    date: if day.datetime.is_empty() { day.valid_date } else { day.datetime },
                    metric,
                })
            })
        })
        .collect();

    Ok(days)
}

#[async_trait]
impl WeatherProvider for WeatherbitProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Weatherbit
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
        let api_key = self.keys.next_key(self.id())?;
        let units = if metric { "M" } else { "I" };
        let lang = self.ctx.locale.language();

        let current_url = format!(
            "{}/v2.0/current?units={units}&lang={lang}&key={api_key}&{id}",
            self.base_url
        );
        let current_body = self.ctx.http.retrieve(&current_url).await?;

        let forecast_url = format!(
            "{}/v2.0/forecast/daily?days=6&units={units}&lang={lang}&key={api_key}&{id}",
            self.base_url
        );
        let forecast_body = self.ctx.http.retrieve(&forecast_url).await?;

        let mut current = parse_current(&current_body, id, metric)?;
        let forecasts = parse_forecast(&forecast_body, metric, Local::now().date_naive())?;

        if current.city.trim().is_empty() {
            current.city = self.ctx.city_name(parse_coordinates(id), lang).await;
        }

        Ok(WeatherSnapshot::new(current, forecasts, Utc::now()))
    }
}
