//! Geocoding helpers: GeoNames place search, nearby-locality lookup and
//! Nominatim reverse geocoding, plus the city-name fallback chain built on
//! top of them.

use serde::{Deserialize, Deserializer};

use crate::{
    error::ProviderError,
    http::{HttpClient, encode},
    model::{Coordinates, UNKNOWN_CITY, WeatherLocation, country_label},
};

pub const GEONAMES_URL: &str = "http://api.geonames.org";
pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const GEONAMES_USER: &str = "omnijaws";

/// Query-string layout of a GeoNames search; different adapters send the
/// parameters in different orders and the upstream service keys quota on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStyle {
    /// `...&username=..&maxRows=20`
    MaxRows,
    /// `...&username=..&isNameRequired=true`
    NameRequired,
    /// `...&isNameRequired=true&username=..`
    NameRequiredFirst,
}

#[derive(Debug, Deserialize)]
struct GnSearchResponse {
    #[serde(default)]
    geonames: Vec<GnPlace>,
}

#[derive(Debug, Deserialize)]
struct GnPlace {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "adminName1")]
    admin_name1: String,
    #[serde(default, rename = "countryName")]
    country_name: String,
    #[serde(deserialize_with = "lenient_f64")]
    lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct GnNearbyResponse {
    address: Option<GnAddress>,
    geonames: Option<Vec<GnNearbyPlace>>,
}

#[derive(Debug, Deserialize)]
struct GnAddress {
    placename: Option<String>,
    #[serde(rename = "adminName2")]
    admin_name2: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GnNearbyPlace {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
}

/// GeoNames returns coordinates as strings in some endpoints and numbers in
/// others.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrText {
        Num(f64),
        Text(String),
    }

    match NumOrText::deserialize(deserializer)? {
        NumOrText::Num(n) => Ok(n),
        NumOrText::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone)]
pub struct GeoNames {
    http: HttpClient,
    base_url: String,
}

impl GeoNames {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: GEONAMES_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Free-text place search. `make_id` turns the coordinates of each hit
    /// into the adapter's location id format.
    pub async fn search(
        &self,
        query: &str,
        lang: &str,
        style: SearchStyle,
        make_id: impl Fn(Coordinates) -> String,
    ) -> Result<Vec<WeatherLocation>, ProviderError> {
        let q = encode(query);
        let url = match style {
            SearchStyle::MaxRows => format!(
                "{}/searchJSON?q={q}&lang={lang}&username={GEONAMES_USER}&maxRows=20",
                self.base_url
            ),
            SearchStyle::NameRequired => format!(
                "{}/searchJSON?q={q}&lang={lang}&username={GEONAMES_USER}&isNameRequired=true",
                self.base_url
            ),
            SearchStyle::NameRequiredFirst => format!(
                "{}/searchJSON?q={q}&lang={lang}&isNameRequired=true&username={GEONAMES_USER}",
                self.base_url
            ),
        };

        let body = self.http.retrieve(&url).await?;
        parse_search(&body, make_id)
    }

    /// Nearest populated place for a coordinate pair.
    pub async fn nearby_locality(&self, coords: Coordinates, lang: &str) -> Option<String> {
        let url = format!(
            "{}/extendedFindNearbyJSON?lat={:.6}&lng={:.6}&lang={lang}&username={GEONAMES_USER}",
            self.base_url, coords.latitude, coords.longitude
        );

        let body = match self.http.retrieve(&url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("GeoNames nearby lookup failed: {}", e);
                return None;
            }
        };
        parse_nearby(&body)
    }
}

fn parse_search(
    body: &str,
    make_id: impl Fn(Coordinates) -> String,
) -> Result<Vec<WeatherLocation>, ProviderError> {
    let parsed: GnSearchResponse = serde_json::from_str(body)?;

    let results: Vec<WeatherLocation> = parsed
        .geonames
        .into_iter()
        .filter(|place| !place.name.is_empty())
        .map(|place| {
            let id = make_id(Coordinates::new(place.lat, place.lng));
            let country_id = country_label(&place.country_name, &place.admin_name1, &place.name);
            WeatherLocation::new(id, place.name, country_id)
        })
        .collect();

    if results.is_empty() {
        return Err(ProviderError::NoResults);
    }
    Ok(results)
}

fn parse_nearby(body: &str) -> Option<String> {
    let parsed: GnNearbyResponse = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!("GeoNames nearby parse error: {}", e);
            return None;
        }
    };

    if let Some(address) = parsed.address {
        return address
            .placename
            .filter(|s| !s.is_empty())
            .or(address.admin_name2)
            .filter(|s| !s.is_empty());
    }

    parsed
        .geonames?
        .into_iter()
        .rev()
        .filter_map(|p| p.name)
        .find(|name| !name.is_empty())
}

/// Nominatim (OpenStreetMap) reverse geocoder. Free, no key required.
#[derive(Debug, Clone)]
pub struct ReverseGeocoder {
    http: HttpClient,
    base_url: String,
}

impl ReverseGeocoder {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: NOMINATIM_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Locality name for the coordinates, or `None` on any failure.
    pub async fn locality(&self, coords: Coordinates, lang: &str) -> Option<String> {
        let url = format!(
            "{}/reverse?lat={}&lon={}&format=json&addressdetails=1&zoom=10&accept-language={lang}",
            self.base_url, coords.latitude, coords.longitude
        );

        let body = match self.http.retrieve(&url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("Reverse geocode request failed: {}", e);
                return None;
            }
        };

        let parsed: NominatimResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("Reverse geocode parse error: {}", e);
                return None;
            }
        };

        let address = parsed.address?;
        [
            address.city,
            address.town,
            address.village,
            address.municipality,
            address.county,
        ]
        .into_iter()
        .flatten()
        .find(|name| !name.is_empty())
    }
}

/// City-name fallback chain: custom name, reverse geocoder, GeoNames
/// nearby lookup, then [`UNKNOWN_CITY`].
#[derive(Debug, Clone)]
pub struct LocalityResolver {
    reverse: ReverseGeocoder,
    geonames: GeoNames,
}

impl LocalityResolver {
    pub fn new(reverse: ReverseGeocoder, geonames: GeoNames) -> Self {
        Self { reverse, geonames }
    }

    pub fn geonames(&self) -> &GeoNames {
        &self.geonames
    }

    pub async fn resolve(
        &self,
        custom_name: Option<&str>,
        coords: Option<Coordinates>,
        lang: &str,
    ) -> String {
        if let Some(name) = custom_name.filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }

        if let Some(coords) = coords {
            if let Some(name) = self.reverse.locality(coords, lang).await {
                return name;
            }
            if let Some(name) = self.geonames.nearby_locality(coords, lang).await {
                return name;
            }
        }

        tracing::debug!("No locality name resolved, using fallback");
        UNKNOWN_CITY.to_string()
    }
}
