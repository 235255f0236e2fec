//! Device location and network reachability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio::net::TcpStream;

use crate::{
    config::{Config, DeviceLocation},
    error::LocationError,
    http::HttpClient,
    model::Coordinates,
    units::parse_coordinates,
};

/// Fixes with a worse accuracy radius are rejected.
pub const ACCURACY_THRESHOLD_M: f64 = 50_000.0;

/// How long a cycle waits for a location fix.
pub const LOCATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub const IPINFO_URL: &str = "https://ipinfo.io/json";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub coordinates: Coordinates,
    /// Accuracy radius in meters, when the source reports one.
    pub accuracy_m: Option<f64>,
    pub time: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(coordinates: Coordinates) -> Self {
        Self {
            coordinates,
            accuracy_m: None,
            time: Utc::now(),
        }
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy_m = Some(meters);
        self
    }
}

#[async_trait]
pub trait LocationSource: Send + Sync + Debug {
    async fn current_fix(&self) -> Result<LocationFix, LocationError>;
}

/// Source for a location chosen from configuration.
pub fn location_from_config(config: &Config) -> Arc<dyn LocationSource> {
    match config.device_location {
        DeviceLocation::Disabled => Arc::new(DeniedLocation),
        DeviceLocation::Ip => Arc::new(IpLocation::new(HttpClient::new())),
        DeviceLocation::Fixed {
            latitude,
            longitude,
        } => Arc::new(FixedLocation::new(Coordinates::new(latitude, longitude))),
    }
}

/// Wait for a fix from `source`, bounded by `deadline`, and reject fixes
/// that are too coarse to pick a forecast for.
pub async fn acquire_fix(
    source: &dyn LocationSource,
    deadline: Duration,
) -> Result<LocationFix, LocationError> {
    let fix = tokio::time::timeout(deadline, source.current_fix())
        .await
        .map_err(|_| LocationError::Timeout(deadline))??;

    match fix.accuracy_m {
        Some(meters) if meters > ACCURACY_THRESHOLD_M => Err(LocationError::Inaccurate(meters)),
        _ => Ok(fix),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedLocation {
    coordinates: Coordinates,
}

impl FixedLocation {
    pub fn new(coordinates: Coordinates) -> Self {
        Self { coordinates }
    }
}

#[async_trait]
impl LocationSource for FixedLocation {
    async fn current_fix(&self) -> Result<LocationFix, LocationError> {
        Ok(LocationFix::new(self.coordinates))
    }
}

/// Location access that is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeniedLocation;

#[async_trait]
impl LocationSource for DeniedLocation {
    async fn current_fix(&self) -> Result<LocationFix, LocationError> {
        Err(LocationError::PermissionDenied)
    }
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    loc: String,
}

/// Approximate location from the public IP address.
#[derive(Debug, Clone)]
pub struct IpLocation {
    http: HttpClient,
    url: String,
}

impl IpLocation {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            url: IPINFO_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl LocationSource for IpLocation {
    async fn current_fix(&self) -> Result<LocationFix, LocationError> {
        let body = self
            .http
            .retrieve(&self.url)
            .await
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;

        let info: IpInfoResponse = serde_json::from_str(&body)
            .map_err(|e| LocationError::Unavailable(format!("invalid IP location response: {e}")))?;

        let coordinates = parse_coordinates(&info.loc).ok_or_else(|| {
            LocationError::Unavailable(format!("invalid IP location '{}'", info.loc))
        })?;

        tracing::debug!(%coordinates, "Resolved location from IP address");
        Ok(LocationFix::new(coordinates))
    }
}

#[async_trait]
pub trait Connectivity: Send + Sync + Debug {
    async fn is_online(&self) -> bool;
}

/// Reachability probe: a TCP connect to a well-known host.
#[derive(Debug, Clone)]
pub struct TcpConnectivity {
    addr: String,
    timeout: Duration,
}

impl Default for TcpConnectivity {
    fn default() -> Self {
        Self::new("1.1.1.1:443")
    }
}

impl TcpConnectivity {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: Duration::from_secs(3),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Connectivity for TcpConnectivity {
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(addr = %self.addr, "Connectivity probe failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!(addr = %self.addr, "Connectivity probe timed out");
                false
            }
        }
    }
}

/// Connectivity that is assumed, for hosts without a probe target.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeOnline;

#[async_trait]
impl Connectivity for AssumeOnline {
    async fn is_online(&self) -> bool {
        true
    }
}
