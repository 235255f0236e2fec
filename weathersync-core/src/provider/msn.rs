use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};

use crate::{
    error::ProviderError,
    geo::SearchStyle,
    http::encode,
    model::{Coordinates, CurrentConditions, DayForecast, WeatherLocation, WeatherSnapshot},
    provider::{ProviderContext, ProviderId, WeatherProvider},
    units::parse_coordinates,
    xml::{XmlElement, elements},
};

pub const BASE_URL: &str = "https://weather.service.msn.com";

/// MSN weather feed (XML). Requested in English because the wind display
/// text is parsed.
#[derive(Debug, Clone)]
pub struct MsnProvider {
    ctx: ProviderContext,
    base_url: String,
}

impl MsnProvider {
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
}

fn coordinates_id(coords: Coordinates) -> String {
    coords.to_string()
}

fn convert_code(raw: &str) -> i32 {
    match raw.trim().parse::<i32>() {
        Ok(39 | 45) => 40,
        Ok(code) => code,
        Err(_) => -1,
    }
}

/// Compass direction from a display string such as `"22 km/h Southwest"`.
fn wind_direction(display: &str) -> i32 {
    let Some((_, direction)) = display.split_once("h ") else {
        return 0;
    };
    match direction.trim() {
        "North" => 360,
        "Northeast" => 45,
        "East" => 90,
        "Southeast" => 135,
        "South" => 180,
        "Southwest" => 225,
        "West" => 270,
        "Northwest" => 315,
        _ => 0,
    }
}

fn parse_weather(
    body: &str,
    location_id: &str,
    metric: bool,
    today: NaiveDate,
) -> Result<(CurrentConditions, Vec<DayForecast>), ProviderError> {
    let els = elements(body)?;

    let weather = els
        .iter()
        .find(|e| e.name == "weather")
        .ok_or_else(|| ProviderError::Parse("no <weather> element".into()))?;
    let now = els
        .iter()
        .find(|e| e.name == "current")
        .ok_or_else(|| ProviderError::Parse("no <current> element".into()))?;

    let city = weather
        .attr("weatherlocationname")
        .and_then(|name| name.split(',').next())
        .unwrap_or_default()
        .trim()
        .to_string();

    let current = CurrentConditions {
        location_id: location_id.to_string(),
        city,
        condition: now.attr("skytext").unwrap_or_default().to_string(),
        condition_code: convert_code(now.required("skycode")?),
        temperature: now.number("temperature")?,
        humidity: now.number("humidity")?,
        wind_speed: now.number("windspeed")?,
        wind_direction: wind_direction(now.attr("winddisplay").unwrap_or_default()),
        metric,
    };

    let forecasts = parse_forecasts(&els, metric, today);
    Ok((current, forecasts))
}

/// Forecast entries dated before today are dropped; the feed usually starts
/// one or two days back.
fn parse_forecasts(els: &[XmlElement], metric: bool, today: NaiveDate) -> Vec<DayForecast> {
    els.iter()
        .filter(|e| e.name == "forecast")
        .filter(|e| {
            e.attr("date")
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .is_none_or(|d| d >= today)
        })
        .take(5)
        .map(|e| {
            forecast_day(e, metric).unwrap_or_else(|err| {
                tracing::warn!("Invalid MSN forecast entry ({}), using placeholder", err);
                DayForecast::dummy(metric)
            })
        })
        .collect()
}

fn forecast_day(e: &XmlElement, metric: bool) -> Result<DayForecast, ProviderError> {
    Ok(DayForecast {
        low: e.number("low")?,
        high: e.number("high")?,
        condition: e.attr("skytextday").unwrap_or_default().to_string(),
        condition_code: convert_code(e.required("skycodeday")?),
        date: e.required("date")?.to_string(),
        metric,
    })
}

#[async_trait]
impl WeatherProvider for MsnProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Msn
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
        let url = format!(
            "{}/find.aspx?weadegreetype={}&culture=en&weasearchstr={}&src=weathersync",
            self.base_url,
            if metric { "C" } else { "F" },
            encode(id),
        );
        let body = self.ctx.http.retrieve(&url).await?;

        let (mut current, forecasts) = parse_weather(&body, id, metric, Local::now().date_naive())?;
        if current.city.is_empty() {
            current.city = self
                .ctx
                .city_name(parse_coordinates(id), self.ctx.locale.language())
                .await;
        }

        Ok(WeatherSnapshot::new(current, forecasts, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<weatherdata>
  <weather weatherlocationname="Vienna, Austria" degreetype="C">
    <current temperature="21" skycode="30" skytext="Partly Sunny" humidity="48"
             winddisplay="15 km/h Southwest" windspeed="15 km/h"/>
    <forecast low="11" high="22" skycodeday="32" skytextday="Sunny" date="2024-06-08"/>
    <forecast low="12" high="23" skycodeday="39" skytextday="Showers" date="2024-06-09"/>
    <forecast low="13" high="24" skycodeday="26" skytextday="Cloudy" date="2024-06-10"/>
    <forecast low="14" high="25" skycodeday="45" skytextday="Storms" date="2024-06-11"/>
    <forecast low="15" high="26" skycodeday="11" skytextday="Rain" date="2024-06-12"/>
  </weather>
</weatherdata>"#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    #[test]
    fn current_conditions_from_attributes() {
        let (current, _) = parse_weather(FEED, "48.2,16.37", true, today()).unwrap();

        assert_eq!(current.city, "Vienna");
        assert_eq!(current.condition_code, 30);
        assert_eq!(current.temperature, 21.0);
        assert_eq!(current.wind_speed, 15.0);
        assert_eq!(current.wind_direction, 225);
    }

    #[test]
    fn past_days_are_skipped() {
        let (_, days) = parse_weather(FEED, "id", true, today()).unwrap();

        assert_eq!(days.len(), 3);
        assert_eq!(days[0].date, "2024-06-10");
        assert_eq!(days[1].condition_code, 40);
        assert_eq!(days[2].high, 26.0);
    }

    #[test]
    fn wind_direction_names() {
        assert_eq!(wind_direction("10 mph North"), 360);
        assert_eq!(wind_direction("10 km/h Northwest"), 315);
        assert_eq!(wind_direction("calm"), 0);
    }

    #[test]
    fn missing_current_element_fails() {
        let doc = r#"<weatherdata><weather weatherlocationname="X"/></weatherdata>"#;
        assert!(parse_weather(doc, "id", true, today()).is_err());
    }
}
