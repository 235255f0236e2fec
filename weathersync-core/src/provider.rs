use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::{
    convert::TryFrom,
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    Config,
    error::ProviderError,
    geo::{GeoNames, LocalityResolver, ReverseGeocoder},
    http::HttpClient,
    locale::Locale,
    model::{Coordinates, DayForecast, WeatherLocation, WeatherSnapshot},
    provider::{
        accuweather::AccuWeatherProvider, foreca::ForecaProvider, gismeteo::GismeteoProvider,
        metno::MetNorwayProvider, msn::MsnProvider, openmeteo::OpenMeteoProvider,
        openweathermap::OpenWeatherMapProvider, pirateweather::PirateWeatherProvider,
        weatherbit::WeatherbitProvider, weatherchannel::WeatherChannelProvider,
    },
};

pub mod accuweather;
pub mod foreca;
pub mod gismeteo;
pub mod metno;
pub mod msn;
pub mod openmeteo;
pub mod openweathermap;
pub mod pirateweather;
pub mod weatherbit;
pub mod weatherchannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeatherMap,
    Gismeteo,
    AccuWeather,
    MetNorway,
    PirateWeather,
    WeatherChannel,
    Weatherbit,
    Foreca,
    OpenMeteo,
    Msn,
}

impl ProviderId {
    /// Short name used in the config file and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeatherMap => "openweathermap",
            ProviderId::Gismeteo => "gismeteo",
            ProviderId::AccuWeather => "accuweather",
            ProviderId::MetNorway => "metno",
            ProviderId::PirateWeather => "pirateweather",
            ProviderId::WeatherChannel => "weatherchannel",
            ProviderId::Weatherbit => "weatherbit",
            ProviderId::Foreca => "foreca",
            ProviderId::OpenMeteo => "openmeteo",
            ProviderId::Msn => "msn",
        }
    }

    /// Stable numeric selection value.
    pub fn config_value(&self) -> &'static str {
        match self {
            ProviderId::OpenWeatherMap => "0",
            ProviderId::Gismeteo => "1",
            ProviderId::AccuWeather => "2",
            ProviderId::MetNorway => "3",
            ProviderId::PirateWeather => "4",
            ProviderId::WeatherChannel => "5",
            ProviderId::Weatherbit => "7",
            ProviderId::Foreca => "8",
            ProviderId::OpenMeteo => "9",
            ProviderId::Msn => "10",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenWeatherMap => "OpenWeatherMap",
            ProviderId::Gismeteo => "Gismeteo",
            ProviderId::AccuWeather => "AccuWeather",
            ProviderId::MetNorway => "MET Norway",
            ProviderId::PirateWeather => "Pirate Weather",
            ProviderId::WeatherChannel => "The Weather Channel",
            ProviderId::Weatherbit => "Weatherbit",
            ProviderId::Foreca => "Foreca",
            ProviderId::OpenMeteo => "Open-Meteo",
            ProviderId::Msn => "MSN Weather",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(
            self,
            ProviderId::OpenWeatherMap
                | ProviderId::AccuWeather
                | ProviderId::PirateWeather
                | ProviderId::WeatherChannel
                | ProviderId::Weatherbit
        )
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OpenWeatherMap,
            ProviderId::Gismeteo,
            ProviderId::AccuWeather,
            ProviderId::MetNorway,
            ProviderId::PirateWeather,
            ProviderId::WeatherChannel,
            ProviderId::Weatherbit,
            ProviderId::Foreca,
            ProviderId::OpenMeteo,
            ProviderId::Msn,
        ]
    }

    /// Lenient lookup for stored configuration: unknown or retired values
    /// select OpenWeatherMap.
    pub fn from_config_value(value: Option<&str>) -> ProviderId {
        match value.map(ProviderId::try_from) {
            Some(Ok(id)) => id,
            Some(Err(_)) => {
                tracing::warn!(value = ?value, "Unrecognized provider, using OpenWeatherMap");
                ProviderId::OpenWeatherMap
            }
            None => ProviderId::OpenWeatherMap,
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_lowercase();

        ProviderId::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == lower || id.config_value() == lower)
            .ok_or_else(|| {
                let names: Vec<&str> = ProviderId::all().iter().map(|id| id.as_str()).collect();
                anyhow::anyhow!(
                    "Unknown provider '{value}'. Supported providers: {}.",
                    names.join(", ")
                )
            })
    }
}

/// Contract every weather backend implements.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    /// Candidate locations for a free-text query, in upstream order.
    async fn search_locations(&self, query: &str) -> Result<Vec<WeatherLocation>, ProviderError>;

    async fn weather_by_coordinates(
        &self,
        coords: Coordinates,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError>;

    async fn weather_by_location_id(
        &self,
        id: &str,
        metric: bool,
    ) -> Result<WeatherSnapshot, ProviderError>;

    /// Whether the orchestrator should retry after a failed fetch.
    fn should_retry(&self) -> bool {
        false
    }
}

/// Per-cycle settings and shared helpers handed to every adapter.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub locale: Locale,
    pub custom_location_name: Option<String>,
    pub timezone: String,
    pub http: HttpClient,
    pub locality: LocalityResolver,
}

impl ProviderContext {
    pub fn new(locale: Locale) -> Self {
        let http = HttpClient::new();
        let locality = LocalityResolver::new(
            ReverseGeocoder::new(http.clone()),
            GeoNames::new(http.clone()),
        );

        Self {
            locale,
            custom_location_name: None,
            timezone: "auto".to_string(),
            http,
            locality,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut ctx = Self::new(Locale::resolve(config.locale.as_deref()));
        if config.custom_location {
            ctx.custom_location_name = config.location_name.clone();
        }
        if let Some(tz) = config.timezone.as_deref().filter(|tz| !tz.is_empty()) {
            ctx.timezone = tz.to_string();
        }
        ctx
    }

    pub fn with_custom_location_name(mut self, name: impl Into<String>) -> Self {
        self.custom_location_name = Some(name.into());
        self
    }

    pub fn with_locality(mut self, locality: LocalityResolver) -> Self {
        self.locality = locality;
        self
    }

    pub(crate) fn geonames(&self) -> &GeoNames {
        self.locality.geonames()
    }

    pub(crate) async fn city_name(&self, coords: Option<Coordinates>, lang: &str) -> String {
        self.locality
            .resolve(self.custom_location_name.as_deref(), coords, lang)
            .await
    }
}

/// API keys for one provider, handed out round-robin to spread quota.
#[derive(Debug, Clone)]
pub struct ApiKeys {
    keys: Vec<String>,
    cursor: Arc<AtomicUsize>,
}

impl ApiKeys {
    pub fn new(keys: Vec<String>) -> Self {
        Self::with_cursor(keys, Arc::new(AtomicUsize::new(0)))
    }

    pub fn with_cursor(keys: Vec<String>, cursor: Arc<AtomicUsize>) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keys, cursor }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Next key in rotation, or `MissingApiKey` when none are configured.
    pub fn next_key(&self, provider: ProviderId) -> Result<&str, ProviderError> {
        if self.keys.is_empty() {
            return Err(ProviderError::MissingApiKey(provider));
        }
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        Ok(&self.keys[n % self.keys.len()])
    }
}

/// Deserialize one forecast entry, degrading to a dummy day on any schema
/// mismatch.
pub(crate) fn day_or_dummy<T, F>(value: &serde_json::Value, metric: bool, build: F) -> DayForecast
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Option<DayForecast>,
{
    match serde_json::from_value::<T>(value.clone()) {
        Ok(raw) => build(raw).unwrap_or_else(|| {
            tracing::warn!("Incomplete forecast day, using placeholder");
            DayForecast::dummy(metric)
        }),
        Err(e) => {
            tracing::warn!("Malformed forecast day ({}), using placeholder", e);
            DayForecast::dummy(metric)
        }
    }
}

/// Builds adapters from configuration, sharing key-rotation state across
/// cycles.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    key_cursor: Arc<AtomicUsize>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&self, config: &Config) -> Box<dyn WeatherProvider> {
        let id = config.provider_id();
        let ctx = ProviderContext::from_config(config);
        let keys = ApiKeys::with_cursor(config.provider_api_keys(id).to_vec(), self.key_cursor.clone());
        build_provider(id, ctx, keys)
    }
}

/// Construct the configured provider. Unknown selections fall back to
/// OpenWeatherMap.
pub fn provider_from_config(config: &Config) -> Box<dyn WeatherProvider> {
    ProviderRegistry::new().select(config)
}

pub fn build_provider(id: ProviderId, ctx: ProviderContext, keys: ApiKeys) -> Box<dyn WeatherProvider> {
    match id {
        ProviderId::OpenWeatherMap => Box::new(OpenWeatherMapProvider::new(ctx, keys)),
        ProviderId::Gismeteo => Box::new(GismeteoProvider::new(ctx)),
        ProviderId::AccuWeather => Box::new(AccuWeatherProvider::new(ctx, keys)),
        ProviderId::MetNorway => Box::new(MetNorwayProvider::new(ctx)),
        ProviderId::PirateWeather => Box::new(PirateWeatherProvider::new(ctx, keys)),
        ProviderId::WeatherChannel => Box::new(WeatherChannelProvider::new(ctx, keys)),
        ProviderId::Weatherbit => Box::new(WeatherbitProvider::new(ctx, keys)),
        ProviderId::Foreca => Box::new(ForecaProvider::new(ctx)),
        ProviderId::OpenMeteo => Box::new(OpenMeteoProvider::new(ctx)),
        ProviderId::Msn => Box::new(MsnProvider::new(ctx)),
    }
}
