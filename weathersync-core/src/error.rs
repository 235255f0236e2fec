use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::ProviderId;

/// Failure of a single adapter operation.
///
/// Adapters never let raw transport or parse errors escape; everything is
/// folded into one of these variants.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("empty response body from {url}")]
    EmptyBody { url: String },

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("no API key configured for provider '{0}'")]
    MissingApiKey(ProviderId),

    #[error("response contained no usable results")]
    NoResults,
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Parse(err.to_string())
    }
}

impl From<quick_xml::Error> for ProviderError {
    fn from(err: quick_xml::Error) -> Self {
        ProviderError::Parse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ProviderError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ProviderError::Parse(err.to_string())
    }
}

/// Why a device location could not be obtained.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location service unavailable: {0}")]
    Unavailable(String),

    #[error("no location fix within {0:?}")]
    Timeout(std::time::Duration),

    #[error("location fix too inaccurate ({0:.0} m)")]
    Inaccurate(f64),
}

/// Error reason persisted by the store and broadcast to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Location,
    Disabled,
    Update,
}

impl ErrorKind {
    /// Numeric reason code exposed on the query surface.
    pub fn code(self) -> u8 {
        match self {
            ErrorKind::Network => 0,
            ErrorKind::Location => 1,
            ErrorKind::Disabled => 2,
            ErrorKind::Update => 3,
        }
    }
}

/// Terminal failure of one update cycle.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("weather service is disabled")]
    Disabled,

    #[error("no network connectivity")]
    NoNetwork,

    #[error("no valid custom location configured")]
    NoCustomLocation,

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error("weather fetch failed after {attempts} attempt(s): {source}")]
    Fetch {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("failed to persist snapshot: {0}")]
    Store(#[source] anyhow::Error),
}

impl UpdateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpdateError::Disabled => ErrorKind::Disabled,
            UpdateError::NoNetwork => ErrorKind::Network,
            UpdateError::Location(_) => ErrorKind::Location,
            UpdateError::NoCustomLocation | UpdateError::Fetch { .. } | UpdateError::Store(_) => {
                ErrorKind::Update
            }
        }
    }
}
