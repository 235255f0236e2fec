use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::{
    condition::{Condition, night_code},
    error::ProviderError,
    http::encode,
    locale::Locale,
    model::{Coordinates, CurrentConditions, DayForecast, WeatherLocation, WeatherSnapshot},
    provider::{ProviderContext, ProviderId, WeatherProvider, day_or_dummy},
    units::{celsius_in, is_yesterday, wind_from_ms},
};

pub const BASE_URL: &str = "https://api.foreca.net";

const LANGUAGES: &[&str] = &[
    "en", "bg", "cs", "da", "de", "et", "el", "es", "fa", "fr", "hr", "it", "lv", "hu", "nl", "pl",
    "pt", "ro", "ru", "sk", "sv", "tr", "uk",
];

/// Foreca's free API; location ids are Foreca's own numeric ids.
#[derive(Debug, Clone)]
pub struct ForecaProvider {
    ctx: ProviderContext,
    base_url: String,
}

impl ForecaProvider {
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

    async fn location_name(&self, id: &str) -> Option<String> {
        let url = format!(
            "{}/locations/{id}.json?lang={}",
            self.base_url,
            language(&self.ctx.locale)
        );
        let body = self.ctx.http.retrieve(&url).await.ok()?;
        serde_json::from_str::<FcLocation>(&body)
            .ok()?
            .name
            .filter(|name| !name.trim().is_empty())
    }
}

fn language(locale: &Locale) -> &'static str {
    LANGUAGES
        .iter()
        .copied()
        .find(|lang| *lang == locale.language())
        .unwrap_or("en")
}

#[derive(Debug, Deserialize)]
struct FcSearchResponse {
    #[serde(default)]
    results: Vec<FcSearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FcSearchResult {
    id: serde_json::Value,
    name: String,
    #[serde(default)]
    country_name: String,
}

#[derive(Debug, Deserialize)]
struct FcLocation {
    id: Option<serde_json::Value>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FcRecent {
    symb: String,
    temp: f64,
    rhum: f64,
    winds: f64,
    #[serde(default)]
    windd: i32,
}

#[derive(Debug, Deserialize)]
struct FcDaily {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FcDay {
    date: String,
    tmin: f64,
    tmax: f64,
    symb: String,
    #[serde(default)]
    symbtxt: String,
}

/// Ids come back as numbers from some endpoints and strings from others.
fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Drop a leading "City, " from the country label when the city name is
/// already part of it.
fn format_country(city: &str, country: &str) -> String {
    if !country.contains(city) {
        return country.to_string();
    }
    match country.split_once(", ") {
        Some((first, rest)) if first.contains(city) => rest.to_string(),
        _ => country.to_string(),
    }
}

/// Symbols are `d000`..`n432`: day/night prefix, then cloudiness,
/// precipitation intensity and precipitation type digits.
fn symbol_to_code(symbol: &str) -> i32 {
    let Some((prefix, rest)) = symbol.split_at_checked(1) else {
        return -1;
    };
    let code = match rest {
        "000" => 32,
        "100" => 34,
        "200" => 30,
        "300" => 28,
        "400" => 26,
        "500" => 21,
        "600" => 20,
        "210" | "310" | "220" | "320" => 40,
        "410" => 9,
        "420" => 11,
        "430" => 12,
        "240" | "340" => 38,
        "440" => 4,
        "211" | "311" | "411" | "221" | "321" | "421" | "431" => 18,
        "212" | "312" | "412" => 14,
        "222" | "322" | "422" | "432" => 41,
        _ => -1,
    };

    if prefix != "n" {
        return code;
    }
    match code {
        40 => 47,
        14 => 46,
        other => night_code(other),
    }
}

fn parse_search(body: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
    let parsed: FcSearchResponse = serde_json::from_str(body)?;
    let results: Vec<WeatherLocation> = parsed
        .results
        .into_iter()
        .filter_map(|r| {
            let id = id_string(&r.id)?;
            let country = format_country(&r.name, &r.country_name);
            Some(WeatherLocation::new(id, r.name, country))
        })
        .collect();

    if results.is_empty() {
        return Err(ProviderError::NoResults);
    }
    Ok(results)
}

fn parse_current(
    body: &str,
    id: &str,
    metric: bool,
) -> Result<CurrentConditions, ProviderError> {
    // keyed by location id
    let mut parsed: HashMap<String, FcRecent> = serde_json::from_str(body)?;
    let recent = parsed
        .remove(id)
        .ok_or_else(|| ProviderError::Parse(format!("no recent observation for {id}")))?;

    let code = symbol_to_code(&recent.symb);
    Ok(CurrentConditions {
        location_id: id.to_string(),
        city: String::new(),
        condition: Condition::from_code(code)
            .map(|c| c.description().to_string())
            .unwrap_or_default(),
        condition_code: code,
        temperature: celsius_in(recent.temp, metric),
        humidity: recent.rhum,
        wind_speed: wind_from_ms(recent.winds, metric),
        wind_direction: recent.windd,
        metric,
    })
}

fn parse_forecast(body: &str, metric: bool, today: NaiveDate) -> Result<Vec<DayForecast>, ProviderError> {
    let parsed: FcDaily = serde_json::from_str(body)?;
    if parsed.data.is_empty() {
        return Err(ProviderError::Parse("forecast contains no days".into()));
    }

    let skip = parsed
        .data
        .first()
        .and_then(|d| d.get("date"))
        .and_then(|d| d.as_str())
        .is_some_and(|d| is_yesterday(d, today));

    Ok(parsed
        .data
        .iter()
        .skip(usize::from(skip))
        .take(5)
        .map(|value| {
            day_or_dummy::<FcDay, _>(value, metric, |day| {
                Some(DayForecast {
                    low: celsius_in(day.tmin, metric),
                    high: celsius_in(day.tmax, metric),
                    condition: day.symbtxt,
                    condition_code: symbol_to_code(&day.symb),
                    date: day.date,
                    metric,
                })
            })
        })
        .collect())
}

#[async_trait]
impl WeatherProvider for ForecaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Foreca
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
        let url = format!(
            "{}/locations/search/{}.json?lang={}",
            self.base_url,
            encode(query),
            language(&self.ctx.locale)
        );
        let body = self.ctx.http.retrieve(&url).await?;
        parse_search(&body)
    }

    async fn weather_by_coordinates(
        &self,
        coords: Coordinates,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError> {
        // Foreca takes longitude first
        let url = format!(
            "{}/locations/{:.6},{:.6}.json",
            self.base_url, coords.longitude, coords.latitude
        );
        let body = self.ctx.http.retrieve(&url).await?;
        let id = serde_json::from_str::<FcLocation>(&body)?
            .id
            .as_ref()
            .and_then(id_string)
            .ok_or_else(|| ProviderError::Parse("coordinate lookup returned no id".into()))?;

        self.weather_by_location_id(&id, metric).await
    }

    async fn weather_by_location_id(
        &self,
        id: &str,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError> {
        let current_body = self
            .ctx
            .http
            .retrieve(&format!("{}/data/recent/{id}.json", self.base_url))
            .await?;
        let forecast_body = self
            .ctx
            .http
            .retrieve(&format!("{}/data/daily/{id}.json", self.base_url))
            .await?;

        let mut current = parse_current(&current_body, id, metric)?;
        let forecasts = parse_forecast(&forecast_body, metric, Local::now().date_naive())?;

        current.city = match self.ctx.custom_location_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => match self.location_name(id).await {
                Some(name) => name,
                None => self.ctx.city_name(None, self.ctx.locale.language()).await,
            },
        };

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

    #[test]
    fn night_prefix_selects_night_codes() {
        assert_eq!(symbol_to_code("d000"), 32);
        assert_eq!(symbol_to_code("n000"), 31);
        assert_eq!(symbol_to_code("n300"), 27);
        assert_eq!(symbol_to_code("n210"), 47);
        assert_eq!(symbol_to_code("n212"), 46);
        assert_eq!(symbol_to_code("n430"), 12);
        assert_eq!(symbol_to_code("d999"), -1);
        assert_eq!(symbol_to_code(""), -1);
    }

    #[test]
    fn country_label_drops_repeated_city() {
        assert_eq!(format_country("Paris", "Paris, France"), "France");
        assert_eq!(format_country("Oslo", "Norway"), "Norway");
        assert_eq!(format_country("York", "England, United Kingdom"), "England, United Kingdom");
    }

    #[test]
    fn current_conditions_keyed_by_id() {
        let body = json!({"100658225": {
            "symb": "d400", "temp": 10.0, "rhum": 87, "winds": 5, "windd": 270
        }})
        .to_string();

        let current = parse_current(&body, "100658225", false).unwrap();
        assert_eq!(current.condition_code, 26);
        assert_eq!(current.condition, "cloudy");
        assert!((current.temperature - 50.0).abs() < 0.01);
        assert!((current.wind_speed - 11.18).abs() < 0.01);

        assert!(parse_current(&body, "1", true).is_err());
    }

    #[test]
    fn forecast_skips_yesterday() {
        let body = json!({"data": [
            {"date": "2024-06-09", "tmin": 1, "tmax": 2, "symb": "d000", "symbtxt": "Clear"},
            {"date": "2024-06-10", "tmin": 8, "tmax": 17, "symb": "d420", "symbtxt": "Rain"},
            {"date": "2024-06-11", "tmin": 9}
        ]})
        .to_string();

        let days = parse_forecast(&body, true, today()).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, "2024-06-10");
        assert_eq!(days[0].condition_code, 11);
        assert!(days[1].is_dummy());
    }

    #[test]
    fn search_accepts_numeric_ids() {
        let body = json!({"results": [
            {"id": 100658225, "name": "Helsinki", "countryName": "Helsinki, Finland"},
            {"id": "102", "name": "Espoo", "countryName": "Finland"}
        ]})
        .to_string();

        let results = parse_search(&body).unwrap();
        assert_eq!(results[0].id, "100658225");
        assert_eq!(results[0].country_id, "Finland");
        assert_eq!(results[1].id, "102");
    }
}
