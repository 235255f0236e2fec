//! The Weather Channel (weather.com v3 API).
//!
//! Responses are column oriented: every field is an array indexed by
//! result (search) or by day (forecast). Forecast icons and phrases are in
//! `daypart[0]`, interleaved day/night, so day `i` lives at index `2 * i`.

use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};
use serde::Deserialize;

use crate::{
    error::ProviderError,
    http::encode,
    locale::Locale,
    model::{
        Coordinates, CurrentConditions, DayForecast, WeatherLocation, WeatherSnapshot,
        country_label,
    },
    provider::{ApiKeys, ProviderContext, ProviderId, WeatherProvider},
    units::{date_part, is_yesterday},
};

pub const BASE_URL: &str = "https://api.weather.com";

#[derive(Debug, Clone)]
pub struct WeatherChannelProvider {
    ctx: ProviderContext,
    keys: ApiKeys,
    base_url: String,
}

impl WeatherChannelProvider {
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

    fn units(metric: bool) -> &'static str {
        if metric { "m" } else { "e" }
    }

    /// Resolve place id and display name. Failures fall back to the given
    /// defaults; a missing name is not worth failing the cycle over.
    async fn location_info(&self, selection: &str, api_key: &str) -> (Option<String>, Option<String>) {
        let url = format!(
            "{}/v3/location/point?{selection}&language={}&format=json&apiKey={api_key}",
            self.base_url,
            language(&self.ctx.locale),
        );

        let body = match self.ctx.http.retrieve(&url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Location info lookup failed: {}", e);
                return (None, None);
            }
        };

        match serde_json::from_str::<TwcPointResponse>(&body) {
            Ok(point) => (point.location.place_id, point.location.city),
            Err(e) => {
                tracing::warn!("Malformed location info: {}", e);
                (None, None)
            }
        }
    }

    async fn weather(
        &self,
        selection: &str,
        default_id: &str,
        coords: Option<Coordinates>,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError> {
        let api_key = self.keys.next_key(self.id())?;
        let lang = language(&self.ctx.locale);
        let units = Self::units(metric);

        let current_url = format!(
            "{}/v3/wx/observations/current?{selection}&language={lang}&format=json&units={units}&apiKey={api_key}",
            self.base_url,
        );
        let current_body = self.ctx.http.retrieve(&current_url).await?;
        let current: TwcCurrent = serde_json::from_str(&current_body)?;

        let forecast_url = format!(
            "{}/v3/wx/forecast/daily/7day?{selection}&language={lang}&format=json&units={units}&apiKey={api_key}",
            self.base_url,
        );
        let forecast_body = self.ctx.http.retrieve(&forecast_url).await?;
        let today = Local::now().date_naive();
        let forecasts = parse_forecast(&forecast_body, current.temperature, metric, today)?;

        let (place_id, city) = self.location_info(selection, api_key).await;
        let city = match city.filter(|c| !c.trim().is_empty()) {
            Some(city) => city,
            None => self.ctx.city_name(coords, self.ctx.locale.language()).await,
        };

        let current = CurrentConditions {
            location_id: place_id.unwrap_or_else(|| default_id.to_string()),
            city,
            condition: current.cloud_cover_phrase.unwrap_or_default(),
            condition_code: convert_icon(current.icon_code),
            temperature: current.temperature,
            humidity: current.relative_humidity,
            wind_speed: current.wind_speed,
            wind_direction: current.wind_direction.unwrap_or(0),
            metric,
        };

        Ok(WeatherSnapshot::new(current, forecasts, Utc::now()))
    }
}

/// weather.com expects `language-COUNTRY`.
fn language(locale: &Locale) -> String {
    format!("{}-{}", locale.language(), locale.country())
}

/// Remap the few icon codes that differ from the shared table.
fn convert_icon(code: i32) -> i32 {
    match code {
        39 => 40,
        40 => 12,
        41 => 42,
        42 => 41,
        44 => -1,
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct TwcSearchResponse {
    location: TwcSearchColumns,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TwcSearchColumns {
    #[serde(default)]
    admin_district: Vec<Option<String>>,
    display_name: Vec<String>,
    #[serde(default)]
    country: Vec<Option<String>>,
    place_id: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TwcPointResponse {
    location: TwcPoint,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TwcPoint {
    place_id: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TwcCurrent {
    temperature: f64,
    relative_humidity: f64,
    wind_speed: f64,
    wind_direction: Option<i32>,
    icon_code: i32,
    cloud_cover_phrase: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TwcForecast {
    temperature_max: Vec<Option<f64>>,
    temperature_min: Vec<Option<f64>>,
    #[serde(default)]
    valid_time_local: Vec<String>,
    daypart: Vec<TwcDaypart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TwcDaypart {
    icon_code: Vec<Option<i32>>,
    #[serde(default)]
    wx_phrase_long: Vec<Option<String>>,
    #[serde(default)]
    day_or_night: Vec<Option<String>>,
}

fn parse_search(body: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
    let parsed: TwcSearchResponse = serde_json::from_str(body)?;
    let cols = parsed.location;

    let results: Vec<WeatherLocation> = cols
        .place_id
        .iter()
        .enumerate()
        .filter_map(|(i, id)| {
            let city = cols.display_name.get(i)?;
            let area = cols.admin_district.get(i).cloned().flatten().unwrap_or_default();
            let country = cols.country.get(i).cloned().flatten().unwrap_or_default();
            Some(WeatherLocation::new(
                id.clone(),
                city.clone(),
                country_label(&country, &area, city),
            ))
        })
        .collect();

    if results.is_empty() {
        return Err(ProviderError::NoResults);
    }
    Ok(results)
}

fn parse_forecast(
    body: &str,
    current_temperature: f64,
    metric: bool,
    today: NaiveDate,
) -> Result<Vec<DayForecast>, ProviderError> {
    let parsed: TwcForecast = serde_json::from_str(body)?;
    let daypart = parsed
        .daypart
        .first()
        .ok_or_else(|| ProviderError::Parse("forecast has no daypart".into()))?;

    // before the evening the day slot of today is null
    let evening_only = matches!(daypart.day_or_night.first(), Some(None) | None);
    let start = match parsed.valid_time_local.first() {
        Some(first) if is_yesterday(first, today) => 1,
        _ => 0,
    };

    let days = (start..parsed.temperature_max.len())
        .take(5)
        .map(|i| {
            let mut slot = i * 2;
            if slot == 0 && evening_only {
                slot = 1;
            }
            let day = || -> Option<DayForecast> {
                let (low, high) = if i == 0 {
                    (
                        parsed.temperature_min.get(i).copied().flatten().unwrap_or(current_temperature),
                        parsed.temperature_max.get(i).copied().flatten().unwrap_or(current_temperature),
                    )
                } else {
                    (
                        parsed.temperature_min.get(i).copied().flatten()?,
                        parsed.temperature_max.get(i).copied().flatten()?,
                    )
                };
                Some(DayForecast {
                    low,
                    high,
                    condition: daypart.wx_phrase_long.get(slot).cloned().flatten().unwrap_or_default(),
                    condition_code: convert_icon(daypart.icon_code.get(slot).copied().flatten()?),
                    date: date_part(parsed.valid_time_local.get(i)?),
                    metric,
                })
            };
            day().unwrap_or_else(|| {
                tracing::warn!(day = i, "Invalid forecast day, using placeholder");
                DayForecast::dummy(metric)
            })
        })
        .collect();

    Ok(days)
}

#[async_trait]
impl WeatherProvider for WeatherChannelProvider {
    fn id(&self) -> ProviderId {
        ProviderId::WeatherChannel
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
        let api_key = self.keys.next_key(self.id())?;
        let url = format!(
            "{}/v3/location/search?query={}&locationType=city&language={}&format=json&apiKey={api_key}",
            self.base_url,
            encode(query),
            language(&self.ctx.locale),
        );
        let body = self.ctx.http.retrieve(&url).await?;
        parse_search(&body)
    }

    async fn weather_by_coordinates(
        &self,
        coords: Coordinates,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError> {
        let selection = format!("geocode={:.6},{:.6}", coords.latitude, coords.longitude);
        self.weather(&selection, "-1", Some(coords), metric).await
    }

    async fn weather_by_location_id(
        &self,
        id: &str,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError> {
        self.weather(&format!("placeid={id}"), id, None, metric).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn forecast(first_date: &str, day_or_night: serde_json::Value) -> String {
        json!({
            "temperatureMax": [null, 24, 25, 26, 27, 28, 29],
            "temperatureMin": [null, 14, 15, 16, 17, 18, 19],
            "validTimeLocal": [
                first_date,
                "2024-06-11T07:00:00+0200",
                "2024-06-12T07:00:00+0200",
                "2024-06-13T07:00:00+0200",
                "2024-06-14T07:00:00+0200",
                "2024-06-15T07:00:00+0200",
                "2024-06-16T07:00:00+0200"
            ],
            "daypart": [{
                "dayOrNight": day_or_night,
                "iconCode": [null, 27, 39, 29, 44, 33, 30, 31, 4, 47, 12, 11, 32, 31],
                "wxPhraseLong": [null, "Mostly Cloudy", "Showers", "Clear", "?", "Clear",
                                 "Partly Cloudy", "Clear", "T-Storms", "Storms", "Rain", "Rain", "Sunny", "Clear"]
            }]
        })
        .to_string()
    }

    #[test]
    fn evening_only_today_uses_night_slot_and_current_temperature() {
        let body = forecast("2024-06-10T07:00:00+0200", json!([null, "N", "D", "N"]));
        let days = parse_forecast(&body, 19.0, true, today()).unwrap();

        assert_eq!(days.len(), 5);
        assert_eq!(days[0].low, 19.0);
        assert_eq!(days[0].high, 19.0);
        assert_eq!(days[0].condition_code, 27);
        assert_eq!(days[0].condition, "Mostly Cloudy");
        assert_eq!(days[0].date, "2024-06-10");
        assert_eq!(days[1].condition_code, 40);
        assert_eq!(days[2].condition_code, -1);
    }

    #[test]
    fn leading_yesterday_is_skipped() {
        let body = forecast("2024-06-09T07:00:00+0200", json!(["D", "N"]));
        let days = parse_forecast(&body, 19.0, true, today()).unwrap();

        assert_eq!(days[0].date, "2024-06-11");
        assert_eq!(days[0].high, 24.0);
        assert_eq!(days[0].condition_code, 40);
    }

    #[test]
    fn missing_later_temperature_degrades_to_dummy() {
        let body = json!({
            "temperatureMax": [20, null],
            "temperatureMin": [10, 11],
            "validTimeLocal": ["2024-06-10T07:00:00+0200", "2024-06-11T07:00:00+0200"],
            "daypart": [{"dayOrNight": ["D", "N", "D", "N"], "iconCode": [32, 31, 30, 29]}]
        })
        .to_string();
        let days = parse_forecast(&body, 0.0, true, today()).unwrap();

        assert_eq!(days[0].condition_code, 32);
        assert!(days[1].is_dummy());
    }

    #[test]
    fn search_reads_columns() {
        let body = json!({"location": {
            "displayName": ["Paris", "Paris"],
            "adminDistrict": ["Ile-de-France", "Texas"],
            "country": ["France", "United States"],
            "placeId": ["abc", "def"]
        }})
        .to_string();

        let results = parse_search(&body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "abc");
        assert_eq!(results[1].country_id, "United States, Texas");
    }

    #[test]
    fn icon_remapping() {
        assert_eq!(convert_icon(39), 40);
        assert_eq!(convert_icon(40), 12);
        assert_eq!(convert_icon(41), 42);
        assert_eq!(convert_icon(42), 41);
        assert_eq!(convert_icon(44), -1);
        assert_eq!(convert_icon(26), 26);
    }

    #[test]
    fn language_combines_language_and_country() {
        assert_eq!(language(&Locale::parse("pt_BR").unwrap()), "pt-BR");
    }
}
