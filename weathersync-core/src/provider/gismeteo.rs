//! Gismeteo inform service (XML).

use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};

use crate::{
    error::ProviderError,
    http::encode,
    locale::Locale,
    model::{
        Coordinates, CurrentConditions, DayForecast, WeatherLocation, WeatherSnapshot,
        country_label,
    },
    provider::{ProviderContext, ProviderId, WeatherProvider},
    units::{celsius_in, date_part, wind_from_ms},
    xml::{XmlElement, elements},
};

pub const BASE_URL: &str =
    "http://45e30b7f.services.gismeteo.ru/inform-service/a407a91cfcb53e52063b77e9e777f5bd";

#[derive(Debug, Clone)]
pub struct GismeteoProvider {
    ctx: ProviderContext,
    base_url: String,
}

impl GismeteoProvider {
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

fn language(locale: &Locale) -> &'static str {
    match locale.language() {
        "ru" => "ru",
        "uk" => "ua",
        "pl" => "pl",
        _ => "en",
    }
}

/// The search endpoint matches on name prefixes and chokes on punctuation.
fn search_term(query: &str) -> String {
    query
        .chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
        .collect()
}

/// Gismeteo reports wind direction on an eight-point scale starting at
/// 1 = north; 0 means calm.
fn wind_degrees(scale: i32) -> i32 {
    match scale {
        1 => 360,
        s if s >= 2 => (s - 1) * 45,
        s => s,
    }
}

/// Icons are dot-separated: optional day/night marker, cloudiness
/// (`c2`..`c4`), precipitation (`r`ain, `s`now, `rs` mixed, with intensity
/// 1..3), `st` for thunder and `mist`.
fn icon_to_code(icon: &str) -> i32 {
    match icon {
        "d.st" | "n.st" => 4,
        "mist" | "r1.mist" | "s1.mist" | "r1.st.mist" | "s1.st.mist" => 20,
        "r3.mist" => 11,
        "r2.mist" => 12,
        "s3.mist" => 13,
        "s2.mist" => 16,
        "r2.st.mist" | "s2.st.mist" => 37,
        "r3.st.mist" | "s3.st.mist" => 39,
        "c4" => 26,
        "n.c3" => 29,
        "d.c3" => 30,
        "n" => 31,
        "d" => 32,
        "n.c2" => 33,
        "d.c2" => 34,
        _ => {
            let Some(weather) = ["c4.", "d.c2.", "d.c3.", "n.c2.", "n.c3."]
                .iter()
                .find_map(|sky| icon.strip_prefix(sky))
            else {
                return -1;
            };
            match weather {
                "st" | "rs1.st" | "r1.st" | "s1.st" => 4,
                "rs1" | "rs2" | "rs3" => 5,
                "r1" => 9,
                "r3" => 11,
                "r2" => 12,
                "s3" => 13,
                "s1" => 14,
                "s2" => 16,
                "rs2.st" | "r2.st" | "s2.st" => 37,
                "rs3.st" | "r3.st" | "s3.st" => 39,
                _ => -1,
            }
        }
    }
}

fn parse_search(body: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
    let results: Vec<WeatherLocation> = elements(body)?
        .iter()
        .filter(|e| e.name == "item")
        .filter_map(|e| {
            let id = e.attr("id")?;
            let city = e.attr("n")?;
            let district = e.attr("district_name").unwrap_or_default();
            let country = e.attr("country_name").unwrap_or_default();
            Some(WeatherLocation::new(id, city, country_label(country, district, city)))
        })
        .collect();

    if results.is_empty() {
        return Err(ProviderError::NoResults);
    }
    Ok(results)
}

fn parse_weather(
    body: &str,
    requested_id: &str,
    metric: bool,
    today: NaiveDate,
) -> Result<(CurrentConditions, Vec<DayForecast>), ProviderError> {
    let els = elements(body)?;

    let location = els.iter().find(|e| e.name == "location");
    let fact = els
        .iter()
        .skip_while(|e| e.name != "fact")
        .find(|e| e.name == "values")
        .ok_or_else(|| ProviderError::Parse("no current <fact> values".into()))?;

    let celsius = fact.number("t")?;
    let current = CurrentConditions {
        location_id: location
            .and_then(|l| l.attr("id"))
            .unwrap_or(requested_id)
            .to_string(),
        city: location
            .and_then(|l| l.attr("name"))
            .unwrap_or_default()
            .to_string(),
        condition: fact.attr("descr").unwrap_or_default().to_string(),
        condition_code: icon_to_code(fact.required("icon")?),
        temperature: celsius_in(celsius, metric),
        humidity: fact.number("hum")?,
        wind_speed: wind_from_ms(fact.number("ws")?, metric),
        wind_direction: wind_degrees(fact.number("wd")? as i32),
        metric,
    };

    let forecasts = els
        .iter()
        .filter(|e| e.name == "day")
        .filter(|e| !is_past(e, today))
        .take(5)
        .map(|e| {
            forecast_day(e, metric).unwrap_or_else(|err| {
                tracing::warn!("Invalid Gismeteo forecast day ({}), using placeholder", err);
                DayForecast::dummy(metric)
            })
        })
        .collect();

    Ok((current, forecasts))
}

fn is_past(day: &XmlElement, today: NaiveDate) -> bool {
    day.attr("date")
        .and_then(|d| NaiveDate::parse_from_str(&date_part(d), "%Y-%m-%d").ok())
        .is_some_and(|d| d < today)
}

fn forecast_day(e: &XmlElement, metric: bool) -> Result<DayForecast, ProviderError> {
    Ok(DayForecast {
        low: celsius_in(e.number("tmin")?, metric),
        high: celsius_in(e.number("tmax")?, metric),
        condition: e.attr("descr").unwrap_or_default().to_string(),
        condition_code: icon_to_code(e.required("icon")?),
        date: date_part(e.required("date")?),
        metric,
    })
}

#[async_trait]
impl WeatherProvider for GismeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gismeteo
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
        let url = format!(
            "{}/cities/?search_all=1&with_facts=1&lat_lng=1&count=10&with_tzone=1&lang={}&startsWith={}",
            self.base_url,
            language(&self.ctx.locale),
            encode(&search_term(query)),
        );
        let body = self.ctx.http.retrieve(&url).await?;
        parse_search(&body)
    }

    async fn weather_by_coordinates(
        &self,
        coords: Coordinates,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError> {
        let url = format!(
            "{}/cities/?with_facts=1&lat_lng=1&lng={:.6}&count=1&lang={}&lat={:.6}",
            self.base_url,
            coords.longitude,
            language(&self.ctx.locale),
            coords.latitude,
        );
        let body = self.ctx.http.retrieve(&url).await?;
        let id = elements(&body)?
            .into_iter()
            .find(|e| e.name == "item")
            .and_then(|e| e.attrs.get("id").cloned())
            .ok_or_else(|| ProviderError::Parse("no city near coordinates".into()))?;

        self.weather_by_location_id(&id, metric).await
    }

    async fn weather_by_location_id(
        &self,
        id: &str,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError> {
        let url = format!(
            "{}/forecast/?lang={}&city={}",
            self.base_url,
            language(&self.ctx.locale),
            encode(id),
        );
        let body = self.ctx.http.retrieve(&url).await?;

        let (mut current, forecasts) = parse_weather(&body, id, metric, Local::now().date_naive())?;
        if current.city.trim().is_empty() {
            current.city = self.ctx.city_name(None, self.ctx.locale.language()).await;
        }

        Ok(WeatherSnapshot::new(current, forecasts, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORECAST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<weather>
  <location id="4368" name="Moscow" tzone="180">
    <fact valid="2024-06-10T12:00:00">
      <values descr="Partly cloudy" icon="d.c3" t="20.4" tflt="18" hum="55" ws="3" wd="6"/>
    </fact>
    <day date="2024-06-09" tmin="9" tmax="19" descr="Rain" icon="c4.r2"/>
    <day date="2024-06-10" tmin="10" tmax="21" descr="Thunderstorm" icon="d.c2.r3.st"/>
    <day date="2024-06-11" tmin="11" tmax="22" descr="Snow" icon="n.c3.s1"/>
    <day date="2024-06-12" tmin="12" descr="Broken"/>
  </location>
</weather>"#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    #[test]
    fn current_conditions_from_fact_values() {
        let (current, _) = parse_weather(FORECAST, "x", true, today()).unwrap();

        assert_eq!(current.location_id, "4368");
        assert_eq!(current.city, "Moscow");
        assert_eq!(current.condition_code, 30);
        assert!((current.wind_speed - 10.8).abs() < 0.01);
        assert_eq!(current.wind_direction, 225);
        assert_eq!(current.temperature, 20.4);
    }

    #[test]
    fn imperial_converts_temperature_and_wind() {
        let (current, days) = parse_weather(FORECAST, "x", false, today()).unwrap();

        assert!((current.temperature - 68.72).abs() < 0.01);
        assert!((current.wind_speed - 6.71).abs() < 0.01);
        assert!((days[0].high - 69.8).abs() < 0.01);
    }

    #[test]
    fn past_days_skipped_and_broken_day_is_dummy() {
        let (_, days) = parse_weather(FORECAST, "x", true, today()).unwrap();

        assert_eq!(days.len(), 3);
        assert_eq!(days[0].date, "2024-06-10");
        assert_eq!(days[0].condition_code, 39);
        assert_eq!(days[1].condition_code, 14);
        assert!(days[2].is_dummy());
    }

    #[test]
    fn icon_table() {
        assert_eq!(icon_to_code("c4.st"), 4);
        assert_eq!(icon_to_code("n.st"), 4);
        assert_eq!(icon_to_code("d.c3.rs2"), 5);
        assert_eq!(icon_to_code("n.c2.s2.st"), 37);
        assert_eq!(icon_to_code("s3.mist"), 13);
        assert_eq!(icon_to_code("n"), 31);
        assert_eq!(icon_to_code("c4.x9"), -1);
        assert_eq!(icon_to_code("sunny"), -1);
    }

    #[test]
    fn wind_scale_to_degrees() {
        assert_eq!(wind_degrees(0), 0);
        assert_eq!(wind_degrees(1), 360);
        assert_eq!(wind_degrees(3), 90);
        assert_eq!(wind_degrees(8), 315);
    }

    #[test]
    fn search_items_and_punctuation() {
        let body = r#"<cities>
            <item id="4368" n="Moscow" district_name="Moscow" country_name="Russia"/>
            <item id="9" n="Moscow" district_name="Idaho" country_name="USA"/>
        </cities>"#;
        let results = parse_search(body).unwrap();
        assert_eq!(results[0].country_id, "Russia");
        assert_eq!(results[1].country_id, "USA, Idaho");

        assert_eq!(search_term("St. Petersburg!"), "St  Petersburg ");
    }
}
