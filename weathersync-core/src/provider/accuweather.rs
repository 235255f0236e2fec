use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::{
    error::ProviderError,
    http::encode,
    locale::Locale,
    model::{
        Coordinates, CurrentConditions, DayForecast, UNKNOWN_CITY, WeatherLocation,
        WeatherSnapshot, country_label,
    },
    provider::{ApiKeys, ProviderContext, ProviderId, WeatherProvider, day_or_dummy},
    units::{date_part, fahrenheit_in},
};

pub const BASE_URL: &str = "http://api.accuweather.com";

#[derive(Debug, Clone)]
pub struct AccuWeatherProvider {
    ctx: ProviderContext,
    keys: ApiKeys,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwSearchResult {
    key: String,
    localized_name: String,
    administrative_area: AwNamed,
    country: AwNamed,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwNamed {
    #[serde(default)]
    localized_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwGeoposition {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwLocationInfo {
    key: String,
    localized_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwCurrent {
    weather_text: String,
    weather_icon: i32,
    temperature: AwUnits,
    relative_humidity: f64,
    wind: AwWind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwUnits {
    metric: AwValue,
    imperial: AwValue,
}

impl AwUnits {
    fn value(&self, metric: bool) -> f64 {
        if metric {
            self.metric.value
        } else {
            self.imperial.value
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwValue {
    value: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwWind {
    speed: AwUnits,
    direction: AwDirection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwDirection {
    degrees: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwForecastResponse {
    daily_forecasts: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwDaily {
    date: String,
    temperature: AwRange,
    day: AwDaypart,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwRange {
    minimum: AwValue,
    maximum: AwValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwDaypart {
    icon: i32,
    icon_phrase: String,
}

impl AccuWeatherProvider {
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

    fn language(&self) -> String {
        language(&self.ctx.locale)
    }

    /// Canonical key and display name for a location id. Falls back to the
    /// id itself and [`UNKNOWN_CITY`].
    async fn location_info(&self, id: &str, api_key: &str) -> (String, String) {
        let url = format!(
            "{}/locations/v1/{id}?apikey={api_key}&language={}",
            self.base_url,
            self.language()
        );

        let info = match self.ctx.http.retrieve(&url).await {
            Ok(body) => serde_json::from_str::<AwLocationInfo>(&body)
                .map_err(|e| tracing::warn!("Malformed AccuWeather location info: {}", e))
                .ok(),
            Err(e) => {
                tracing::debug!("AccuWeather location info unavailable: {}", e);
                None
            }
        };

        info.map_or_else(
            || (id.to_string(), UNKNOWN_CITY.to_string()),
            |i| (i.key, i.localized_name),
        )
    }
}

fn parse_search(body: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
    let results: Vec<AwSearchResult> = serde_json::from_str(body)?;
    if results.is_empty() {
        return Err(ProviderError::NoResults);
    }

    Ok(results
        .into_iter()
        .map(|r| {
            let country_id = country_label(
                &r.country.localized_name,
                &r.administrative_area.localized_name,
                &r.localized_name,
            );
            WeatherLocation::new(r.key, r.localized_name, country_id)
        })
        .collect())
}

fn parse_current(
    body: &str,
    location_id: String,
    city: String,
    metric: bool,
) -> Result<CurrentConditions, ProviderError> {
    let mut observations: Vec<AwCurrent> = serde_json::from_str(body)?;
    if observations.is_empty() {
        return Err(ProviderError::Parse("no current observation".into()));
    }
    let obs = observations.swap_remove(0);

    Ok(CurrentConditions {
        location_id,
        city,
        condition: obs.weather_text,
        condition_code: icon_to_code(obs.weather_icon),
        temperature: obs.temperature.value(metric),
        humidity: obs.relative_humidity,
        wind_speed: obs.wind.speed.value(metric),
        wind_direction: obs.wind.direction.degrees,
        metric,
    })
}

/// Daily forecast values arrive in Fahrenheit.
fn parse_forecast(body: &str, metric: bool) -> Result<Vec<DayForecast>, ProviderError> {
    let parsed: AwForecastResponse = serde_json::from_str(body)?;
    if parsed.daily_forecasts.is_empty() {
        return Err(ProviderError::Parse("empty forecasts array".into()));
    }

    Ok(parsed
        .daily_forecasts
        .iter()
        .map(|value| {
            day_or_dummy::<AwDaily, _>(value, metric, |d| {
                Some(DayForecast {
                    low: fahrenheit_in(d.temperature.minimum.value, metric),
                    high: fahrenheit_in(d.temperature.maximum.value, metric),
                    condition: d.day.icon_phrase,
                    condition_code: icon_to_code(d.day.icon),
                    date: date_part(&d.date),
                    metric,
                })
            })
        })
        .collect())
}

const LANGUAGES: &[&str] = &[
    "ar", "ar_ae", "ar_bh", "ar_dz", "ar_eg", "ar_iq", "ar_jo", "ar_kw", "ar_lb", "ar_ly", "ar_ma",
    "ar_om", "ar_qa", "ar_sa", "ar_sd", "ar_sy", "ar_tn", "ar_ye", "az", "bg", "bn", "bs", "ca",
    "cs", "da", "de", "el", "en_au", "en_bz", "en_ca", "en_gb", "en_ie", "en_nz", "en_tt", "en_us",
    "en_za", "es", "es_ar", "es_bo", "es_cl", "es_co", "es_cr", "es_do", "es_ec", "es_gt", "es_hn",
    "es_mx", "es_ni", "es_pa", "es_pr", "es_py", "es_sv", "es_uy", "es_ve", "et", "fa", "fi", "fr",
    "fr_be", "fr_ca", "fr_ch", "fr_lu", "gu", "he", "hi", "hr", "hu", "in", "id", "is", "it",
    "it_ch", "iw", "ja", "ko", "kk", "kn", "lt", "lv", "mk", "mr", "ms", "nb", "nl", "nl_aw",
    "nl_be", "nl_cw", "nl_sx", "pa", "pl", "pt", "pt_ao", "pt_cv", "pt_gw", "pt_mz", "pt_st",
    "pt_br", "ro", "ru", "sk", "sl", "sr", "sr_me", "sv", "sv_se", "sv_fi", "sw", "ta", "te", "tl",
    "th", "tr", "uk", "ur", "uz", "vi", "zh", "zh_cn", "zh_mo", "zh_sg", "zh_hk", "zh_tw",
];

/// Bare language code when supported, else `en-us`. Regional entries in
/// [`LANGUAGES`] are never matched since only the language is compared.
fn language(locale: &Locale) -> String {
    let lang = locale.language();
    if LANGUAGES.contains(&lang) {
        lang.to_string()
    } else {
        "en-us".to_string()
    }
}

fn icon_to_code(icon: i32) -> i32 {
    match icon {
        1 => 32,
        2 | 3 => 30,
        4 | 6 => 28,
        5 | 37 => 21,
        7 | 8 => 26,
        11 => 20,
        12 | 13 | 14 | 18 => 11,
        15 => 4,
        16 | 17 => 37,
        19 | 20 | 21 | 43 => 13,
        22 | 23 => 16,
        25 => 18,
        26 => 10,
        29 => 5,
        30 => 36,
        31 => 25,
        32 => 24,
        33 => 31,
        34 => 33,
        35 | 36 => 29,
        38 => 27,
        39 | 40 => 45,
        41 | 42 => 47,
        44 => 46,
        _ => -1,
    }
}

#[async_trait]
impl WeatherProvider for AccuWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::AccuWeather
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
        let api_key = self.keys.next_key(self.id())?;
        let url = format!(
            "{}/locations/v1/cities/translate.json?q={}&apikey={api_key}&language={}",
            self.base_url,
            encode(query),
            self.language()
        );
        let body = self.ctx.http.retrieve(&url).await?;
        parse_search(&body)
    }

    async fn weather_by_coordinates(
        &self,
        coords: Coordinates,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError> {
        let api_key = self.keys.next_key(self.id())?;
        let url = format!(
            "{}/locations/v1/cities/geoposition/search.json?q={:.6},{:.6}&apikey={api_key}&language={}",
            self.base_url,
            coords.latitude,
            coords.longitude,
            self.language()
        );
        let body = self.ctx.http.retrieve(&url).await?;
        let position: AwGeoposition = serde_json::from_str(&body)?;

        self.fetch_weather(&position.key, metric, api_key).await
    }

    async fn weather_by_location_id(
        &self,
        id: &str,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError> {
        let api_key = self.keys.next_key(self.id())?;
        self.fetch_weather(id, metric, api_key).await
    }
}

impl AccuWeatherProvider {
    /// All calls of one fetch share `api_key`.
    async fn fetch_weather(
        &self,
        id: &str,
        metric: bool,
        api_key: &str,
    ) -> Result<WeatherSnapshot, ProviderError> {
        let lang = self.language();
        let (key, city) = self.location_info(id, api_key).await;

        let current_url = format!(
            "{}/currentconditions/v1/{id}?apikey={api_key}&language={lang}&details=true",
            self.base_url
        );
        let current_body = self.ctx.http.retrieve(&current_url).await?;

        let forecast_url = format!(
            "{}/forecasts/v1/daily/5day/{id}?apikey={api_key}&language={lang}",
            self.base_url
        );
        let forecast_body = self.ctx.http.retrieve(&forecast_url).await?;

        let current = parse_current(&current_body, key, city, metric)?;
        let forecasts = parse_forecast(&forecast_body, metric)?;

        Ok(WeatherSnapshot::new(current, forecasts, Utc::now()))
    }
}
