use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};
use serde::Deserialize;

use crate::{
    error::ProviderError,
    geo::SearchStyle,
    locale::Locale,
    model::{Coordinates, CurrentConditions, DayForecast, WeatherLocation, WeatherSnapshot},
    provider::{ApiKeys, ProviderContext, ProviderId, WeatherProvider, day_or_dummy},
    units::{day_after, parse_coordinates, sanitize_temperature},
};

pub const BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Clone)]
pub struct OpenWeatherMapProvider {
    ctx: ProviderContext,
    keys: ApiKeys,
    base_url: String,
}

impl OpenWeatherMapProvider {
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

    fn weather_url(&self, selection: &str, metric: bool, api_key: &str) -> String {
        format!(
            "{}/data/2.5/onecall?{selection}&mode=json&units={}&lang={}&cnt=5&appid={api_key}",
            self.base_url,
            if metric { "metric" } else { "imperial" },
            language(&self.ctx.locale),
        )
    }
}

fn coordinates_id(coords: Coordinates) -> String {
    format!("lat={:.6}&lon={:.6}", coords.latitude, coords.longitude)
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    current: OwmCurrent,
    #[serde(default)]
    daily: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OwmCurrent {
    temp: f64,
    humidity: f64,
    wind_speed: f64,
    #[serde(default)]
    wind_deg: f64,
    weather: Vec<OwmWeather>,
}

#[derive(Debug, Deserialize)]
struct OwmWeather {
    id: i32,
    #[serde(default)]
    main: String,
}

#[derive(Debug, Deserialize)]
struct OwmDaily {
    temp: OwmTemp,
    weather: Vec<OwmWeather>,
}

#[derive(Debug, Deserialize)]
struct OwmTemp {
    min: f64,
    max: f64,
}

fn parse_weather(
    body: &str,
    location_id: &str,
    metric: bool,
    today: NaiveDate,
) -> Result<(CurrentConditions, Vec<DayForecast>), ProviderError> {
    let parsed: OwmResponse = serde_json::from_str(body)?;

    let weather = parsed
        .current
        .weather
        .first()
        .ok_or_else(|| ProviderError::Parse("current weather has no condition".into()))?;

    // imperial responses already carry mph
    let wind_speed = if metric {
        parsed.current.wind_speed * 3.6
    } else {
        parsed.current.wind_speed
    };

    let current = CurrentConditions {
        location_id: location_id.to_string(),
        city: String::new(),
        condition: weather.main.clone(),
        condition_code: icon_to_code(weather.id),
        temperature: sanitize_temperature(parsed.current.temp, metric),
        humidity: parsed.current.humidity,
        wind_speed,
        wind_direction: parsed.current.wind_deg.round() as i32,
        metric,
    };

    if parsed.daily.is_empty() {
        return Err(ProviderError::Parse("forecast contains no days".into()));
    }

    let forecasts = parsed
        .daily
        .iter()
        .take(5)
        .enumerate()
        .map(|(i, value)| {
            day_or_dummy::<OwmDaily, _>(value, metric, |day| {
                let weather = day.weather.first()?;
                Some(DayForecast {
                    low: sanitize_temperature(day.temp.min, metric),
                    high: sanitize_temperature(day.temp.max, metric),
                    condition: weather.main.clone(),
                    condition_code: icon_to_code(weather.id),
                    date: day_after(today, i as u64),
                    metric,
                })
            })
        })
        .collect();

    Ok((current, forecasts))
}

fn language(locale: &Locale) -> &'static str {
    const MAPPINGS: [(&str, &str); 16] = [
        ("bg-", "bg"),
        ("de-", "de"),
        ("es-", "sp"),
        ("fi-", "fi"),
        ("fr-", "fr"),
        ("it-", "it"),
        ("nl-", "nl"),
        ("pl-", "pl"),
        ("pt-", "pt"),
        ("ro-", "ro"),
        ("ru-", "ru"),
        ("se-", "se"),
        ("tr-", "tr"),
        ("uk-", "ua"),
        ("zh-CN", "zh_cn"),
        ("zh-TW", "zh_tw"),
    ];

    let tag = format!("{}-{}", locale.language(), locale.country());
    MAPPINGS
        .iter()
        .find(|(prefix, _)| tag.starts_with(prefix))
        .map_or("en", |(_, code)| code)
}

fn icon_to_code(id: i32) -> i32 {
    match id {
        // thunderstorms
        202 | 232 | 211 => 4,
        212 => 3,
        221 | 231 | 201 => 38,
        230 | 200 | 210 => 37,
        // drizzle
        300..=302 | 310..=314 | 321 => 9,
        // rain
        500 | 501 | 520 | 521 | 531 => 11,
        502..=504 | 522 => 12,
        511 => 10,
        // snow
        600 | 620 => 14,
        601 | 621 => 16,
        602 | 622 => 41,
        611 | 612 => 18,
        615 | 616 => 5,
        // atmosphere
        741 => 20,
        711 | 762 => 22,
        701 | 721 => 21,
        731 | 751 | 761 => 19,
        771 => 23,
        781 => 0,
        // clouds
        800 => 32,
        801 => 34,
        802 => 28,
        803 | 804 => 30,
        // extreme
        900 => 0,
        901 => 1,
        902 => 2,
        903 => 25,
        904 => 36,
        905 => 24,
        906 => 17,
        _ => -1,
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMapProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeatherMap
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
        self.ctx
            .geonames()
            .search(
                query,
                self.ctx.locale.language(),
                SearchStyle::MaxRows,
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

        let today = Local::now().date_naive();
        let (mut current, forecasts) = parse_weather(&body, id, metric, today)?;
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

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn day(min: f64, max: f64, id: i32) -> serde_json::Value {
        json!({"temp": {"min": min, "max": max}, "weather": [{"id": id, "main": "Clouds"}]})
    }

    fn body(temp: f64, daily: Vec<serde_json::Value>) -> String {
        json!({
            "current": {
                "temp": temp,
                "humidity": 81,
                "wind_speed": 5.0,
                "wind_deg": 270,
                "weather": [{"id": 500, "main": "Rain"}]
            },
            "daily": daily
        })
        .to_string()
    }

    #[test]
    fn kelvin_temperature_is_corrected_for_metric() {
        let (current, _) =
            parse_weather(&body(250.15, vec![day(1.0, 2.0, 800)]), "id", true, today()).unwrap();

        assert!((current.temperature - (-23.0)).abs() < 0.01);
        assert_eq!(current.condition_code, 11);
        assert!((current.wind_speed - 18.0).abs() < 0.01);
        assert_eq!(current.wind_direction, 270);
    }

    #[test]
    fn imperial_wind_is_passed_through() {
        let (current, _) =
            parse_weather(&body(70.0, vec![day(60.0, 75.0, 800)]), "id", false, today()).unwrap();
        assert!((current.wind_speed - 5.0).abs() < 0.01);
        assert!((current.temperature - 70.0).abs() < 0.01);
    }

    #[test]
    fn forecast_dates_start_today() {
        let daily = (0..8).map(|i| day(i as f64, 10.0, 801)).collect();
        let (_, forecasts) = parse_weather(&body(20.0, daily), "id", true, today()).unwrap();

        assert_eq!(forecasts.len(), 5);
        assert_eq!(forecasts[0].date, "2024-06-10");
        assert_eq!(forecasts[4].date, "2024-06-14");
        assert_eq!(forecasts[0].condition_code, 34);
    }

    #[test]
    fn malformed_day_degrades_to_dummy() {
        let daily = vec![day(1.0, 2.0, 800), json!({"temp": "bad"}), day(3.0, 4.0, 602)];
        let (_, forecasts) = parse_weather(&body(20.0, daily), "id", true, today()).unwrap();

        assert!(!forecasts[0].is_dummy());
        assert!(forecasts[1].is_dummy());
        assert_eq!(forecasts[2].condition_code, 41);
    }

    #[test]
    fn empty_forecast_fails_whole_fetch() {
        let err = parse_weather(&body(20.0, vec![]), "id", true, today()).unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn condition_codes_cover_groups() {
        assert_eq!(icon_to_code(212), 3);
        assert_eq!(icon_to_code(313), 9);
        assert_eq!(icon_to_code(511), 10);
        assert_eq!(icon_to_code(741), 20);
        assert_eq!(icon_to_code(804), 30);
        assert_eq!(icon_to_code(906), 17);
        assert_eq!(icon_to_code(999), -1);
    }

    #[test]
    fn language_mapping_uses_locale_prefix() {
        assert_eq!(language(&Locale::parse("es-ES").unwrap()), "sp");
        assert_eq!(language(&Locale::parse("uk-UA").unwrap()), "ua");
        assert_eq!(language(&Locale::parse("zh-TW").unwrap()), "zh_tw");
        assert_eq!(language(&Locale::parse("de").unwrap()), "de");
        assert_eq!(language(&Locale::parse("ja-JP").unwrap()), "en");
    }
}
