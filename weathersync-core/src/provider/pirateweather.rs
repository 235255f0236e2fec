use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Deserialize;

use crate::{
    error::ProviderError,
    geo::SearchStyle,
    locale::Locale,
    model::{Coordinates, CurrentConditions, DayForecast, WeatherLocation, WeatherSnapshot},
    provider::{ApiKeys, ProviderContext, ProviderId, WeatherProvider, day_or_dummy},
    units::{date_string, parse_coordinates},
};

pub const BASE_URL: &str = "https://api.pirateweather.net";

const LANGUAGES: &[&str] = &[
    "ar", "az", "be", "bg", "bn", "bs", "ca", "cs", "da", "de", "el", "en", "eo", "es", "et",
    "fi", "fr", "he", "hi", "hr", "hu", "id", "is", "it", "ja", "ka", "kn", "ko", "kw", "lv", "ml",
    "mr", "nb", "nl", "no", "pa", "pl", "pt", "ro", "ru", "sk", "sl", "sr", "sv", "ta", "te",
    "tet", "tr", "uk", "ur", "zh",
];

#[derive(Debug, Clone)]
pub struct PirateWeatherProvider {
    ctx: ProviderContext,
    keys: ApiKeys,
    base_url: String,
}

impl PirateWeatherProvider {
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

    fn weather_url(&self, coordinates: &str, metric: bool, api_key: &str) -> String {
        format!(
            "{}/forecast/{api_key}/{coordinates}?exclude=hourly,minutely,flags&units={}&lang={}",
            self.base_url,
            if metric { "ca" } else { "us" },
            language(&self.ctx.locale),
        )
    }
}

fn coordinates_id(coords: Coordinates) -> String {
    coords.to_string()
}

fn language(locale: &Locale) -> &'static str {
    LANGUAGES
        .iter()
        .copied()
        .find(|lang| *lang == locale.language())
        .unwrap_or("en")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PwResponse {
    currently: PwCurrently,
    daily: PwDaily,
    /// Hours east of UTC at the requested location.
    #[serde(default)]
    offset: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PwCurrently {
    time: i64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    icon: String,
    temperature: f64,
    humidity: f64,
    wind_speed: f64,
    #[serde(default)]
    wind_bearing: f64,
}

#[derive(Debug, Deserialize)]
struct PwDaily {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PwDay {
    time: i64,
    summary: String,
    icon: String,
    temperature_min: f64,
    temperature_max: f64,
}

fn icon_to_code(icon: &str) -> i32 {
    match icon {
        "clear-day" => 32,
        "clear-night" => 31,
        "rain" => 11,
        "snow" => 16,
        "sleet" => 18,
        "wind" => 24,
        "fog" => 20,
        "cloudy" => 26,
        "partly-cloudy-day" => 30,
        "partly-cloudy-night" => 29,
        "hail" => 17,
        "thunderstorm" => 4,
        "tornado" => 0,
        _ => -1,
    }
}

/// Local calendar date of a unix timestamp at the given UTC offset.
fn local_date(time: i64, offset: &FixedOffset) -> Option<String> {
    DateTime::from_timestamp(time, 0).map(|t| date_string(t.with_timezone(offset).date_naive()))
}

fn parse_weather(
    body: &str,
    location_id: &str,
    metric: bool,
) -> Result<(CurrentConditions, Vec<DayForecast>, DateTime<Utc>), ProviderError> {
    let parsed: PwResponse = serde_json::from_str(body)?;
    let now = parsed.currently;

    if parsed.daily.data.is_empty() {
        return Err(ProviderError::Parse("forecast contains no days".into()));
    }

    let offset = FixedOffset::east_opt((parsed.offset * 3600.0) as i32).unwrap_or(Utc.fix());

    let forecasts = parsed
        .daily
        .data
        .iter()
        .take(5)
        .map(|value| {
            day_or_dummy::<PwDay, _>(value, metric, |day| {
                Some(DayForecast {
                    low: day.temperature_min,
                    high: day.temperature_max,
                    condition: day.summary,
                    condition_code: icon_to_code(&day.icon),
                    date: local_date(day.time, &offset)?,
                    metric,
                })
            })
        })
        .collect();

    let current = CurrentConditions {
        location_id: location_id.to_string(),
        city: String::new(),
        condition: now.summary,
        condition_code: icon_to_code(&now.icon),
        temperature: now.temperature,
        humidity: now.humidity * 100.0,
        wind_speed: now.wind_speed,
        // bearing is undefined in calm air
        wind_direction: if now.wind_speed != 0.0 {
            now.wind_bearing.round() as i32
        } else {
            0
        },
        metric,
    };

    let timestamp = DateTime::from_timestamp(now.time, 0).unwrap_or_else(Utc::now);
    Ok((current, forecasts, timestamp))
}

#[async_trait]
impl WeatherProvider for PirateWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::PirateWeather
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
        let body = self
            .ctx
            .http
            .retrieve(&self.weather_url(id, metric, api_key))
            .await?;

        let (mut current, forecasts, timestamp) = parse_weather(&body, id, metric)?;
        current.city = self
            .ctx
            .city_name(parse_coordinates(id), self.ctx.locale.language())
            .await;

        Ok(WeatherSnapshot::new(current, forecasts, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(wind: f64, offset: f64, days: Vec<serde_json::Value>) -> String {
        json!({
            "offset": offset,
            "currently": {
                "time": 1718013600,
                "summary": "Partly Cloudy",
                "icon": "partly-cloudy-day",
                "temperature": 21.4,
                "humidity": 0.63,
                "windSpeed": wind,
                "windBearing": 245.0
            },
            "daily": {"data": days}
        })
        .to_string()
    }

    fn day(time: i64, icon: &str) -> serde_json::Value {
        json!({
            "time": time,
            "summary": "Rain later",
            "icon": icon,
            "temperatureMin": 11.0,
            "temperatureMax": 22.5
        })
    }

    #[test]
    fn current_conditions_scale_humidity_and_use_api_timestamp() {
        let (current, _, ts) =
            parse_weather(&body(12.0, 0.0, vec![day(1718013600, "rain")]), "1.0,2.0", true).unwrap();

        assert_eq!(current.condition_code, 30);
        assert!((current.humidity - 63.0).abs() < 0.01);
        assert_eq!(current.wind_direction, 245);
        assert_eq!(ts.timestamp(), 1718013600);
    }

    #[test]
    fn calm_wind_has_no_direction() {
        let (current, _, _) = parse_weather(&body(0.0, 0.0, vec![day(0, "rain")]), "id", true).unwrap();
        assert_eq!(current.wind_direction, 0);
    }

    #[test]
    fn daily_dates_follow_location_offset() {
        // 2024-06-09T22:00:00Z is local midnight at UTC+2
        let (_, days, _) =
            parse_weather(&body(1.0, 2.0, vec![day(1717970400, "snow")]), "id", true).unwrap();

        assert_eq!(days[0].date, "2024-06-10");
        assert_eq!(days[0].condition_code, 16);
        assert_eq!(days[0].high, 22.5);
    }

    #[test]
    fn bad_day_becomes_dummy_and_empty_daily_fails() {
        let days = vec![day(1718013600, "fog"), json!({"time": "x"})];
        let (_, parsed, _) = parse_weather(&body(1.0, 0.0, days), "id", true).unwrap();
        assert!(parsed[1].is_dummy());

        assert!(parse_weather(&body(1.0, 0.0, vec![]), "id", true).is_err());
    }

    #[test]
    fn language_falls_back_to_english() {
        assert_eq!(language(&Locale::parse("nb-NO").unwrap()), "nb");
        assert_eq!(language(&Locale::parse("vi-VN").unwrap()), "en");
    }

    #[test]
    fn unknown_icon_maps_to_not_available() {
        assert_eq!(icon_to_code("hail"), 17);
        assert_eq!(icon_to_code("sunny"), -1);
    }
}
